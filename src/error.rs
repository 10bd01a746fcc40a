//! # Voltage ROC Error Handling
//!
//! This module provides the error type shared by every layer of the library:
//! the byte stream, the frame codec, the opcode operations and the retrieval
//! engine built on top of them.
//!
//! ## Error Categories
//!
//! ### Transport Errors
//! - **I/O Errors**: socket or serial port failures
//! - **Connection Errors**: connection establishment problems
//! - **Timeout Errors**: a read or write did not complete in time
//! - **Short Reads**: the stream ended before the requested byte count arrived
//!
//! ### Framing Errors
//! - **Short Header**: fewer than 6 response head bytes arrived
//! - **Short Body**: the payload and checksum did not arrive in full
//!
//! ### Protocol Errors
//! - **Address Mismatch**: the echoed ROC or host address is not the requested one
//! - **Opcode Mismatch**: the echoed opcode is not the requested one
//! - **Device Rejected**: the device answered with the universal error opcode 255
//! - **CRC Mismatch**: the trailing checksum does not match the frame
//!
//! ### Echo Mismatch Errors
//! Opcode specific echoed fields that disagree with the request: parameter
//! count (opcode 180), history point (opcode 130), block header (opcode 167)
//! and parameter order (batch decoding).
//!
//! ### Caller Errors
//! - **Index Range**: a history index range outside the device retention window
//! - **Unknown Value Type**: a declared value type without a decoding rule
//!
//! ## Usage Examples
//!
//! ```rust
//! use voltage_roc::{RocError, RocResult};
//!
//! fn handle(result: RocResult<f32>) {
//!     match result {
//!         Ok(value) => println!("value: {}", value),
//!         Err(RocError::DeviceRejected { opcode }) => {
//!             println!("device rejected opcode {}", opcode);
//!         }
//!         Err(error) if error.is_framing_error() => {
//!             println!("line noise or timeout: {}", error);
//!         }
//!         Err(error) => println!("other error: {}", error),
//!     }
//! }
//! ```

use thiserror::Error;

use crate::protocol::{DeviceAddress, PointRef};

/// Result type alias for ROC operations
pub type RocResult<T> = Result<T, RocError>;

/// Comprehensive ROC error types
///
/// Every variant carries enough context to tell what was requested and what
/// the device actually sent back.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RocError {
    /// I/O related errors (network, serial)
    ///
    /// # Examples
    /// - TCP connection reset by peer
    /// - Serial port unplugged
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Connection errors
    ///
    /// # Examples
    /// - Connection refused by remote host
    /// - Serial port does not exist
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Timeout errors
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The stream closed before the requested number of bytes arrived
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// Fewer than the 6 response head bytes arrived
    #[error("Short response header: expected {expected} bytes, got {actual}")]
    ShortHeader { expected: usize, actual: usize },

    /// The response payload and checksum did not arrive in full
    #[error("Short response body: expected {expected} bytes, got {actual}")]
    ShortBody { expected: usize, actual: usize },

    /// Echoed ROC or host address differs from the request
    ///
    /// `role` is either `"ROC"` or `"HOST"`.
    #[error("{role} address mismatch: requested {expected}, response {actual}")]
    AddressMismatch {
        role: &'static str,
        expected: DeviceAddress,
        actual: DeviceAddress,
    },

    /// Echoed opcode differs from the request
    #[error("Opcode mismatch: requested {expected}, response {actual}")]
    OpcodeMismatch { expected: u8, actual: u8 },

    /// Device answered with opcode 255
    ///
    /// The device transmits this in response to a request with invalid
    /// parameters or format.
    #[error("Device rejected opcode {opcode} request (invalid parameters or format)")]
    DeviceRejected { opcode: u8 },

    /// CRC validation failure
    #[error("CRC validation failed: expected={expected:04X}, actual={actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },

    /// Opcode 180 echoed a different parameter count
    #[error("Parameter count mismatch: requested {expected}, response {actual}")]
    CountMismatch { expected: u8, actual: u8 },

    /// Opcode 130 echoed a different history type or point number
    #[error("History {field} mismatch: requested {expected}, response {actual}")]
    PointMismatch {
        field: &'static str,
        expected: u8,
        actual: u8,
    },

    /// Opcode 167 echoed a different block header byte
    #[error("Block {field} mismatch: requested {expected}, response {actual}")]
    BlockHeaderMismatch {
        field: &'static str,
        expected: u8,
        actual: u8,
    },

    /// Batch parameter response is out of request order
    #[error("Parameter #{index} out of order: requested {expected}, response {actual}")]
    OrderMismatch {
        index: usize,
        expected: PointRef,
        actual: PointRef,
    },

    /// History index range outside the device retention window
    #[error("{kind} history indexes out of range: from={from}, to={to}, limit={limit}")]
    IndexRange {
        kind: String,
        from: i32,
        to: i32,
        limit: i32,
    },

    /// A declared value type has no decoding rule
    #[error("Unknown value type: {name}")]
    UnknownValueType { name: String },

    /// Invalid data value
    ///
    /// # Examples
    /// - Response shorter than the layout it must contain
    /// - Request payload longer than 255 bytes
    /// - Malformed byte order string
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl RocError {
    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io { message: message.into() }
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection { message: message.into() }
    }

    /// Create a new timeout error
    ///
    /// # Arguments
    ///
    /// * `operation` - Description of the operation that timed out
    /// * `timeout_ms` - Timeout duration in milliseconds
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a short read error
    pub fn short_read(expected: usize, actual: usize) -> Self {
        Self::ShortRead { expected, actual }
    }

    /// Create a short header error
    pub fn short_header(expected: usize, actual: usize) -> Self {
        Self::ShortHeader { expected, actual }
    }

    /// Create a short body error
    pub fn short_body(expected: usize, actual: usize) -> Self {
        Self::ShortBody { expected, actual }
    }

    /// Create an address mismatch error
    ///
    /// # Arguments
    ///
    /// * `role` - `"ROC"` or `"HOST"`
    /// * `expected` - Address sent in the request
    /// * `actual` - Address echoed by the device
    pub fn address_mismatch(role: &'static str, expected: DeviceAddress, actual: DeviceAddress) -> Self {
        Self::AddressMismatch { role, expected, actual }
    }

    /// Create an opcode mismatch error
    pub fn opcode_mismatch(expected: u8, actual: u8) -> Self {
        Self::OpcodeMismatch { expected, actual }
    }

    /// Create a device rejected error for the given request opcode
    pub fn device_rejected(opcode: u8) -> Self {
        Self::DeviceRejected { opcode }
    }

    /// Create a CRC mismatch error
    ///
    /// # Arguments
    ///
    /// * `expected` - CRC computed over the received frame
    /// * `actual` - CRC carried in the frame
    pub fn crc_mismatch(expected: u16, actual: u16) -> Self {
        Self::CrcMismatch { expected, actual }
    }

    /// Create a parameter count mismatch error
    pub fn count_mismatch(expected: u8, actual: u8) -> Self {
        Self::CountMismatch { expected, actual }
    }

    /// Create a history point mismatch error
    pub fn point_mismatch(field: &'static str, expected: u8, actual: u8) -> Self {
        Self::PointMismatch { field, expected, actual }
    }

    /// Create a block header mismatch error
    pub fn block_header_mismatch(field: &'static str, expected: u8, actual: u8) -> Self {
        Self::BlockHeaderMismatch { field, expected, actual }
    }

    /// Create a parameter order mismatch error
    pub fn order_mismatch(index: usize, expected: PointRef, actual: PointRef) -> Self {
        Self::OrderMismatch { index, expected, actual }
    }

    /// Create an index range error
    ///
    /// # Arguments
    ///
    /// * `kind` - History kind (`"daily"` or `"hourly"`)
    /// * `from` - Requested start index
    /// * `to` - Requested end index
    /// * `limit` - The bound that was violated
    pub fn index_range<S: Into<String>>(kind: S, from: i32, to: i32, limit: i32) -> Self {
        Self::IndexRange {
            kind: kind.into(),
            from,
            to,
            limit,
        }
    }

    /// Create an unknown value type error
    pub fn unknown_value_type<S: Into<String>>(name: S) -> Self {
        Self::UnknownValueType { name: name.into() }
    }

    /// Create an invalid data error
    pub fn invalid_data<S: Into<String>>(message: S) -> Self {
        Self::InvalidData { message: message.into() }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Check if the error is a short header or short body read
    pub fn is_framing_error(&self) -> bool {
        matches!(self, Self::ShortHeader { .. } | Self::ShortBody { .. })
    }

    /// Check if an opcode specific echoed field disagreed with the request
    pub fn is_echo_mismatch(&self) -> bool {
        matches!(
            self,
            Self::CountMismatch { .. }
                | Self::PointMismatch { .. }
                | Self::BlockHeaderMismatch { .. }
                | Self::OrderMismatch { .. }
        )
    }

    /// Check if the error is a network/transport issue
    ///
    /// # Examples
    ///
    /// ```rust
    /// use voltage_roc::RocError;
    ///
    /// assert!(RocError::connection("refused").is_transport_error());
    /// assert!(!RocError::crc_mismatch(0x1234, 0x4321).is_transport_error());
    /// ```
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Connection { .. } | Self::Timeout { .. } | Self::ShortRead { .. }
        )
    }

    /// Check if the error is a protocol level violation
    pub fn is_protocol_error(&self) -> bool {
        self.is_framing_error()
            || self.is_echo_mismatch()
            || matches!(
                self,
                Self::AddressMismatch { .. }
                    | Self::OpcodeMismatch { .. }
                    | Self::DeviceRejected { .. }
                    | Self::CrcMismatch { .. }
            )
    }

    /// Check if the error is recoverable (can retry)
    ///
    /// Line noise, timeouts and truncated frames usually clear up on a second
    /// attempt; rejected requests and caller mistakes do not.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use voltage_roc::RocError;
    ///
    /// assert!(RocError::timeout("read response", 3000).is_recoverable());
    /// assert!(RocError::crc_mismatch(0x0001, 0x0002).is_recoverable());
    /// assert!(!RocError::device_rejected(180).is_recoverable());
    /// assert!(!RocError::unknown_value_type("int64").is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io { .. } | Self::Connection { .. } | Self::Timeout { .. } | Self::ShortRead { .. } => true,
            Self::ShortHeader { .. } | Self::ShortBody { .. } | Self::CrcMismatch { .. } => true,
            Self::AddressMismatch { .. } | Self::OpcodeMismatch { .. } => true,
            _ => false,
        }
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for RocError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

/// Convert from tokio timeout errors
///
/// The specific timeout duration is not known here; transports build
/// `RocError::Timeout` themselves when they have it.
impl From<tokio::time::error::Elapsed> for RocError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::timeout("Operation timeout", 0)
    }
}

impl From<serde_json::Error> for RocError {
    fn from(err: serde_json::Error) -> Self {
        Self::configuration(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for RocError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::configuration(format!("YAML error: {}", err))
    }
}
