//! # Voltage ROC - Async ROC Opcode Protocol Library
//!
//! **Author:** Evan Liu <evan.liu@voltageenergy.com>
//! **Version:** 0.1.0
//! **License:** MIT
//!
//! An async implementation of the ROC opcode protocol used by gas-flow
//! computers, with retrieval of the device's circular history and alarm logs.
//!
//! ## Features
//!
//! - **Frame Codec**: addressed request/response framing with CRC-16 validation
//! - **Opcode Operations**: parameter, pointer, history, archive table and alarm reads
//! - **Typed Decoding**: fixed width numbers and ASCII with per-parameter byte order
//! - **History Streaming**: daily and hourly logs paged across the 840 record ring
//! - **Alarm Streaming**: new alarms since the last poll across the 240 slot ring
//! - **Best Effort Streams**: bounded retry per page, truncation instead of failure
//! - **Cancellation**: cooperative, between pages, parameters and alarms
//! - **TCP and Serial**: any byte stream through the `RocTransport` trait
//!
//! ## Supported Opcodes
//!
//! | Opcode | Function | Operation |
//! |--------|----------|-----------|
//! | 120 | Log pointers | `get_history_pointers` |
//! | 121 | Alarm records | `read_alarms`, `get_alarms` |
//! | 130 | History records | `get_history_date_times`, `get_history_values`, `get_histories` |
//! | 167 | Configurable point block | `get_history_params` |
//! | 180 | Parameters | `get_parameter`, `get_parameters` |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use voltage_roc::{DeviceSettings, HistoryKind, ParameterSpec, PointRef, RocMaster, TcpTransport, ValueType};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = TcpTransport::connect("10.0.0.21:4000", Duration::from_secs(3)).await?;
//!     let mut master = RocMaster::new(transport);
//!     let settings = DeviceSettings::default();
//!
//!     let parameters = vec![
//!         ParameterSpec::new("pressure", PointRef::new(10, 0, 3), ValueType::Float),
//!         ParameterSpec::new("temperature", PointRef::new(10, 0, 4), ValueType::Float),
//!     ];
//!
//!     // Current values
//!     for (name, value) in master.get_parameters(&settings, &parameters).await? {
//!         println!("{} = {}", name, value);
//!     }
//!
//!     // Last 24 hourly records
//!     let pointers = master.get_history_pointers(&settings).await?;
//!     let to = pointers.station_hourly_history_index;
//!     let from = (to + 840 - 24) % 840;
//!     let history = master
//!         .get_histories(&settings, HistoryKind::Hourly, &parameters, from, to, false)
//!         .await?
//!         .collect()
//!         .await;
//!     for entry in &history.items {
//!         println!("{} {} {}", entry.timestamp, entry.name, entry.value);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Application   │
//! └─────────────────┘
//!          │
//! ┌─────────────────┐    ┌─────────────────┐
//! │   RocMaster     │───►│ History / Alarm │
//! │  (retrieval)    │    │    streams      │
//! └─────────────────┘    └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │    Opcodes      │
//! │ 120/121/130/... │
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  Frame Codec    │
//! │  (head + CRC)   │
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Transport     │
//! │ (TCP / Serial)  │
//! └─────────────────┘
//! ```

/// Core error types and result handling
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod error;

/// ROC protocol vocabulary: addresses, opcodes, point references and log records
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod protocol;

/// Typed value decoding and byte order handling
pub mod value;

/// Request encoding, response validation and CRC
pub mod frame;

/// One function per supported opcode
pub mod opcodes;

/// Byte stream transports for TCP and serial links
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod transport;

/// Retrieval engine
pub mod master;

/// Stream step and outcome types
pub mod stream;

/// History log paging
pub mod history;

/// Alarm log walking and decoding
pub mod alarm;

/// Poller configuration
pub mod config;

/// Utility functions, validation and formatting
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod utils;

// Re-export main types for convenience
pub use error::{RocError, RocResult};
pub use protocol::{
    AlarmRecord, DeviceAddress, DeviceSettings, HistoryParams, HistoryPointers, PointRef, RocOpcode, RocPointType,
};
pub use value::{ByteOrder, ParameterSpec, RocValue, Value, ValueType};
pub use transport::{RocTransport, SerialTransport, StreamTransport, TcpTransport, TransportStats};
pub use master::RocMaster;
pub use stream::{StreamOutcome, StreamStep};
pub use history::{HistoryEntry, HistoryKind, HistoryStream};
pub use alarm::{AlarmResult, AlarmStream};
pub use config::{RocConfig, TransportConfig};
pub use utils::OperationTimer;

/// Default timeout for one request/response exchange (3 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!("Voltage ROC v{} - async ROC opcode protocol library by Evan Liu", VERSION)
}
