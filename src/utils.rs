/// Utility functions and helpers for ROC operations
///
/// This module contains request validation, formatting helpers for logs and
/// the demo binary, and logger setup for tests.

use std::time::{Duration, Instant};
use log::{debug, info, warn};
use crate::error::{RocError, RocResult};
use crate::protocol::{ALARM_LOG_SIZE, MAX_ALARMS_PER_REQUEST, MAX_HISTORY_RECORDS_PER_REQUEST};

/// Timer for measuring operation duration
pub struct OperationTimer {
    start: Instant,
    operation_name: String,
}

impl OperationTimer {
    /// Start a new timer
    pub fn start(operation_name: &str) -> Self {
        debug!("Starting operation: {}", operation_name);
        Self {
            start: Instant::now(),
            operation_name: operation_name.to_string(),
        }
    }

    /// Stop the timer and return duration
    pub fn stop(self) -> Duration {
        let duration = self.start.elapsed();
        debug!("Operation '{}' completed in {:?}", self.operation_name, duration);
        duration
    }

    /// Stop timer and log result
    pub fn stop_and_log(self, success: bool) -> Duration {
        let duration = self.start.elapsed();
        if success {
            info!("Operation '{}' succeeded in {}", self.operation_name, format::format_duration(duration));
        } else {
            warn!("Operation '{}' failed after {}", self.operation_name, format::format_duration(duration));
        }
        duration
    }
}

/// Request validation
pub mod validation {
    use super::*;

    /// Opcode 130 returns at most 60 records per call
    pub fn validate_history_count(count: u8) -> RocResult<()> {
        if count == 0 || count > MAX_HISTORY_RECORDS_PER_REQUEST {
            return Err(RocError::invalid_data(format!(
                "History record count must be 1-{}, got {}",
                MAX_HISTORY_RECORDS_PER_REQUEST, count
            )));
        }
        Ok(())
    }

    /// Opcode 121 returns at most 10 alarms per call
    pub fn validate_alarm_count(count: u8) -> RocResult<()> {
        if count == 0 || count > MAX_ALARMS_PER_REQUEST {
            return Err(RocError::invalid_data(format!(
                "Alarm count must be 1-{}, got {}",
                MAX_ALARMS_PER_REQUEST, count
            )));
        }
        Ok(())
    }

    /// Alarm log slots are addressed 0..239
    pub fn validate_alarm_pointer(pointer: i16) -> RocResult<()> {
        if !(0..ALARM_LOG_SIZE).contains(&pointer) {
            return Err(RocError::index_range("alarm", pointer as i32, pointer as i32, ALARM_LOG_SIZE as i32 - 1));
        }
        Ok(())
    }

    /// Opcode 180 carries the parameter count in one byte
    pub fn validate_parameter_count(count: usize) -> RocResult<()> {
        if count == 0 || count > u8::MAX as usize {
            return Err(RocError::invalid_data(format!(
                "Parameter count must be 1-255, got {}",
                count
            )));
        }
        Ok(())
    }
}

/// Formatting and display utilities
pub mod format {
    use super::*;

    /// Format byte array as spaced hex string
    pub fn bytes_to_hex(bytes: &[u8]) -> String {
        bytes.iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Format byte array as one upper-case hex word
    pub fn bytes_to_compact_hex(bytes: &[u8]) -> String {
        hex::encode_upper(bytes)
    }

    /// Format duration in a human-readable way
    pub fn format_duration(duration: Duration) -> String {
        let millis = duration.as_millis();
        if millis < 1000 {
            format!("{}ms", millis)
        } else if millis < 60_000 {
            format!("{:.2}s", duration.as_secs_f64())
        } else {
            let mins = millis / 60_000;
            let secs = (millis % 60_000) as f64 / 1000.0;
            format!("{}m {:.1}s", mins, secs)
        }
    }
}

/// Logging utilities
pub mod logging {
    /// Initialize simple logger for testing
    pub fn init_test_logger() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    }
}
