/// ROC protocol definitions and data structures
///
/// This module contains the addressing types, the opcode and point type
/// vocabulary, and the records decoded from opcode responses.

use serde::{Deserialize, Serialize};
use std::fmt;
use crate::error::{RocError, RocResult};

/// Number of slots in the device alarm log ring
pub const ALARM_LOG_SIZE: i16 = 240;

/// Size of the hourly history index space (35 days of 24 records)
pub const HOURLY_INDEX_SPACE: i16 = 840;

/// Daily history records are addressed as `840 + x`
pub const DAILY_INDEX_BASE: i16 = 840;

/// History point number that selects the timestamp column of opcode 130
pub const TIMESTAMP_POINT: u8 = 254;

/// Maximum records per opcode 130 request
pub const MAX_HISTORY_RECORDS_PER_REQUEST: u8 = 60;

/// Maximum alarms per opcode 121 request
pub const MAX_ALARMS_PER_REQUEST: u8 = 10;

/// Maximum request payload length (the length field is one byte)
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Two byte ROC endpoint identity
///
/// Serialized on the wire as `[unit, group]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAddress {
    pub unit: u8,
    pub group: u8,
}

impl DeviceAddress {
    pub const fn new(unit: u8, group: u8) -> Self {
        Self { unit, group }
    }

    /// Wire representation, unit first
    pub fn to_bytes(self) -> [u8; 2] {
        [self.unit, self.group]
    }

    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self::new(bytes[0], bytes[1])
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}-{:02X}", self.unit, self.group)
    }
}

/// ROC and host addresses used for one polling session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(default = "default_roc_address")]
    pub roc_address: DeviceAddress,
    #[serde(default = "default_host_address")]
    pub host_address: DeviceAddress,
}

fn default_roc_address() -> DeviceAddress {
    DeviceAddress::new(240, 240)
}

fn default_host_address() -> DeviceAddress {
    DeviceAddress::new(3, 1)
}

impl DeviceSettings {
    pub fn new(roc_address: DeviceAddress, host_address: DeviceAddress) -> Self {
        Self { roc_address, host_address }
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self::new(default_roc_address(), default_host_address())
    }
}

/// ROC request opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RocOpcode {
    /// Sends configuration information (6)
    Opcode6 = 6,
    /// Sends current time and date (7)
    Opcode7 = 7,
    /// Sets new time and date (8)
    Opcode8 = 8,
    /// Sets operator identification (17)
    Opcode17 = 17,
    /// Sends system information (103)
    Opcode103 = 103,
    /// Sends pointers for alarm, event, and history logs (120)
    Opcode120 = 120,
    /// Sends alarms starting at an alarm pointer (121)
    Opcode121 = 121,
    /// Sends events starting at an event pointer (122)
    Opcode122 = 122,
    /// Sends archived hourly and daily data for a history point (130)
    Opcode130 = 130,
    /// Requests multiple history points for multiple time periods (136)
    Opcode136 = 136,
    /// Sends current history configuration data (165)
    Opcode165 = 165,
    /// Sets a contiguous block of parameters (166)
    Opcode166 = 166,
    /// Sends a contiguous block of parameters (167)
    Opcode167 = 167,
    /// Sends specified parameters (180)
    Opcode180 = 180,
    /// Sets specified parameters (181)
    Opcode181 = 181,
    /// Error response transmitted by the device, never a valid request (255)
    Opcode255 = 255,
}

impl RocOpcode {
    /// Convert from u8 to RocOpcode
    pub fn from_u8(value: u8) -> RocResult<Self> {
        match value {
            6 => Ok(RocOpcode::Opcode6),
            7 => Ok(RocOpcode::Opcode7),
            8 => Ok(RocOpcode::Opcode8),
            17 => Ok(RocOpcode::Opcode17),
            103 => Ok(RocOpcode::Opcode103),
            120 => Ok(RocOpcode::Opcode120),
            121 => Ok(RocOpcode::Opcode121),
            122 => Ok(RocOpcode::Opcode122),
            130 => Ok(RocOpcode::Opcode130),
            136 => Ok(RocOpcode::Opcode136),
            165 => Ok(RocOpcode::Opcode165),
            166 => Ok(RocOpcode::Opcode166),
            167 => Ok(RocOpcode::Opcode167),
            180 => Ok(RocOpcode::Opcode180),
            181 => Ok(RocOpcode::Opcode181),
            255 => Ok(RocOpcode::Opcode255),
            _ => Err(RocError::invalid_data(format!("Unknown opcode: {}", value))),
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Check if this opcode is the device error response
    pub fn is_error_response(self) -> bool {
        self == RocOpcode::Opcode255
    }

    /// Device documentation text for the opcode
    pub fn description(self) -> &'static str {
        match self {
            RocOpcode::Opcode6 => "Sends configuration information",
            RocOpcode::Opcode7 => "Sends current time and date",
            RocOpcode::Opcode8 => "Sets new time and date",
            RocOpcode::Opcode17 => "Sets operator identification",
            RocOpcode::Opcode103 => "Sends system information such as on/off times, manual/alarm status, firmware version, and current time and date",
            RocOpcode::Opcode120 => "Sends pointers for alarm, event, and history logs",
            RocOpcode::Opcode121 => "Sends specified number of alarms starting at specified alarm pointer",
            RocOpcode::Opcode122 => "Sends specified number of events starting at specified event pointer",
            RocOpcode::Opcode130 => "Sends archived hourly and daily data for specified history point starting at specified history pointer",
            RocOpcode::Opcode136 => "Requests multiple history points for multiple time periods",
            RocOpcode::Opcode165 => "Sends current history configuration data",
            RocOpcode::Opcode166 => "Sets specified contiguous block of parameters",
            RocOpcode::Opcode167 => "Sends specified contiguous block of parameters",
            RocOpcode::Opcode180 => "Sends specified parameters",
            RocOpcode::Opcode181 => "Sets specified parameters",
            RocOpcode::Opcode255 => "Transmits error messages in response to a request with invalid parameters or format",
        }
    }
}

impl fmt::Display for RocOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opcode {}", *self as u8)
    }
}

/// ROC point type categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RocPointType {
    DiscreteInputs = 1,
    DiscreteOutputs = 2,
    AnalogInputs = 3,
    AnalogOutputs = 4,
    PulseInputs = 5,
    AgaFlowParameters = 7,
    HistoryParameters = 8,
    AgaFlowValues = 10,
    RocClock = 12,
    SystemFlags = 13,
    /// System variables (ROC information)
    SystemVariables = 15,
    SoftPoints = 17,
    DatabaseSetup = 19,
    /// User defined on FB103
    GostFlowCalc = 21,
    /// User defined on FB103
    GostMassCalc = 22,
    /// User defined on FB103
    GostProperties = 30,
    /// Multi-variable sensor parameters
    MvsParameters = 40,
    AgaRunParameters = 41,
    ExtraRunParameters = 42,
    MeterFlowValues = 47,
}

impl RocPointType {
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Addressable device variable `(point, logic, param)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointRef {
    pub point: u8,
    pub logic: u8,
    pub param: u8,
}

impl PointRef {
    pub const fn new(point: u8, logic: u8, param: u8) -> Self {
        Self { point, logic, param }
    }

    pub fn to_bytes(self) -> [u8; 3] {
        [self.point, self.logic, self.param]
    }
}

impl From<(u8, u8, u8)> for PointRef {
    fn from((point, logic, param): (u8, u8, u8)) -> Self {
        Self::new(point, logic, param)
    }
}

impl fmt::Display for PointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.point, self.logic, self.param)
    }
}

/// Snapshot of the device log cursors returned by opcode 120
///
/// Always read fresh at the start of a history or alarm retrieval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPointers {
    pub alarm_log_pointer: i16,
    pub event_log_pointer: i16,
    pub station_hourly_history_index: i16,
    pub user_periodic_hourly_history_index: i16,
    pub user_periodic_hourly_history_logs_count: i16,
    pub station_daily_history_index: u8,
    pub daily_history_logs_count: u8,
    pub hourly_history_logs_days: u8,
    pub user_periodic_history_logs_days: u8,
}

/// One archived point descriptor from the history parameters point type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryParams {
    pub point_tag: (u8, u8, u8),
    pub point_path: (u8, u8, u8),
    pub archive_type: u8,
    pub avg_or_rate: u8,
}

impl HistoryParams {
    /// Size of one descriptor in an opcode 167 block
    pub const ENCODED_LEN: usize = 8;

    /// Unused slots carry a `(0, 0, 0)` tag
    pub fn is_unused(&self) -> bool {
        self.point_tag == (0, 0, 0)
    }

    pub fn archives(&self, point: PointRef) -> bool {
        self.point_path == (point.point, point.logic, point.param)
    }
}

/// Raw alarm log entry decoded from an opcode 121 response
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmRecord {
    pub alarm_type: u8,
    pub alarm_code: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub day: u8,
    pub month: u8,
    /// Two digit year
    pub year: u8,
    pub tag: String,
    pub value: f32,
}

impl AlarmRecord {
    /// Size of one record in an opcode 121 response
    pub const ENCODED_LEN: usize = 22;
}
