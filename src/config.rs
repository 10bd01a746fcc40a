/// Poller configuration
///
/// A `RocConfig` names the device addresses, how to reach the device, the
/// retry and clock settings of the retrieval engine and the parameters to
/// poll. It is read from YAML or JSON:
///
/// ```yaml
/// device:
///   roc_address: { unit: 240, group: 240 }
///   host_address: { unit: 3, group: 1 }
/// transport:
///   type: tcp
///   address: 10.0.0.21:4000
///   timeout_ms: 3000
/// retry_attempts: 2
/// utc_offset_hours: 5
/// parameters:
///   - { name: pressure, point: 10, logic: 0, param: 3, value_type: float }
/// ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::FixedOffset;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{RocError, RocResult};
use crate::master::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_UTC_OFFSET_HOURS};
use crate::protocol::DeviceSettings;
use crate::value::ParameterSpec;

/// Largest UTC offset a device clock can be configured with
const MAX_UTC_OFFSET_HOURS: i32 = 14;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocConfig {
    #[serde(default)]
    pub device: DeviceSettings,
    pub transport: TransportConfig,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
    /// Fixed offset the device clock runs in
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    /// Hex dump every frame at info level
    #[serde(default)]
    pub packet_logging: bool,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

/// How to reach the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    Tcp {
        address: String,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    Serial {
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_retry_attempts() -> usize {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_utc_offset_hours() -> i32 {
    DEFAULT_UTC_OFFSET_HOURS
}

fn default_timeout_ms() -> u64 {
    crate::DEFAULT_TIMEOUT_MS
}

fn default_baud_rate() -> u32 {
    9600
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        match self {
            TransportConfig::Tcp { timeout_ms, .. } | TransportConfig::Serial { timeout_ms, .. } => {
                Duration::from_millis(*timeout_ms)
            }
        }
    }
}

impl RocConfig {
    pub fn from_yaml_str(text: &str) -> RocResult<Self> {
        let config: RocConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> RocResult<Self> {
        let config: RocConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; `.json` files are parsed as JSON, anything else as YAML
    pub fn from_file<P: AsRef<Path>>(path: P) -> RocResult<Self> {
        let path = path.as_ref();
        debug!("Loading config file from {:?}", path);
        let text = fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    pub fn validate(&self) -> RocResult<()> {
        if self.retry_attempts == 0 {
            return Err(RocError::configuration("retry_attempts must be at least 1"));
        }
        if self.utc_offset_hours.abs() > MAX_UTC_OFFSET_HOURS {
            return Err(RocError::configuration(format!(
                "utc_offset_hours must be within ±{}, got {}",
                MAX_UTC_OFFSET_HOURS, self.utc_offset_hours
            )));
        }
        for spec in &self.parameters {
            spec.value_size()?;
        }
        Ok(())
    }

    pub fn utc_offset(&self) -> RocResult<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            RocError::configuration(format!("invalid UTC offset: {}h", self.utc_offset_hours))
        })
    }

    pub fn timeout(&self) -> Duration {
        self.transport.timeout()
    }
}
