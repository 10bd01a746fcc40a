//! # ROC Transport Layer
//!
//! This module provides the duplex byte stream the frame codec runs over.
//! The ROC protocol is strictly stop-and-wait, so a transport only needs to
//! flush, write a whole frame and read an exact number of bytes back.
//!
//! ## Supported Transports
//!
//! ### TCP (`TcpTransport`)
//! - Serial-to-Ethernet gateways and Ethernet-capable controllers
//! - Per-operation timeouts and statistics
//!
//! ### Serial (`SerialTransport`)
//! - RS-232 / RS-485 links via `tokio-serial`
//! - Configurable data bits, stop bits and parity (8N1 by default)
//!
//! Any `AsyncRead + AsyncWrite` stream can be wrapped with
//! [`StreamTransport::new`], which is how the unit tests drive the codec with
//! `tokio_test` mocks.
//!
//! ## Usage Examples
//!
//! ```rust,no_run
//! use voltage_roc::transport::{RocTransport, TcpTransport};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut transport = TcpTransport::connect("192.168.1.50:4000", Duration::from_secs(3)).await?;
//!     transport.set_packet_logging(true);
//!
//!     // ... hand the transport to a RocMaster ...
//!
//!     let stats = transport.get_stats();
//!     println!("Bytes sent: {}", stats.bytes_sent);
//!     transport.close().await?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use log::info;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::timeout;

use crate::error::{RocError, RocResult};
use crate::utils::format::bytes_to_hex;

/// Log packet with direction and transport label
fn log_packet(label: &str, direction: &str, data: &[u8]) {
    info!("[ROC-{}] {} {}", label, direction, bytes_to_hex(data));
}

fn closed() -> RocError {
    RocError::connection("Transport is closed")
}

/// Byte stream abstraction used by the frame codec
///
/// Implementations must either deliver exactly the requested number of bytes
/// or fail; the codec never retries a partial read.
///
/// ## Thread Safety
///
/// Implementations must be `Send` so a master can be moved into a spawned
/// task. Concurrent use of one transport is not supported; the caller
/// serializes requests.
#[async_trait]
pub trait RocTransport: Send {
    /// Flush any pending output before a new request is written
    async fn flush(&mut self) -> RocResult<()>;

    /// Write the whole buffer
    async fn write_all(&mut self, data: &[u8]) -> RocResult<()>;

    /// Fill the whole buffer
    ///
    /// # Errors
    ///
    /// `RocError::ShortRead` carrying the number of bytes that did arrive when
    /// the stream ends early.
    ///
    /// A timeout leaves the transport closed, like a failed write.
    async fn read_exact(&mut self, buf: &mut [u8]) -> RocResult<()>;

    /// Check if the transport believes it is connected
    fn is_connected(&self) -> bool;

    /// Close the connection
    async fn close(&mut self) -> RocResult<()>;

    /// Get communication statistics
    fn get_stats(&self) -> TransportStats;
}

/// Transport layer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Transport over any tokio byte stream
pub struct StreamTransport<S> {
    stream: Option<S>,
    label: String,
    timeout: Duration,
    stats: TransportStats,
    /// Enable packet logging for debugging
    packet_logging: bool,
}

/// TCP transport
pub type TcpTransport = StreamTransport<TcpStream>;

/// Serial port transport
pub type SerialTransport = StreamTransport<tokio_serial::SerialStream>;

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already open stream
    ///
    /// `label` appears in packet logs as `[ROC-<label>]`.
    pub fn new<L: Into<String>>(stream: S, label: L, timeout: Duration) -> Self {
        Self {
            stream: Some(stream),
            label: label.into(),
            timeout,
            stats: TransportStats::default(),
            packet_logging: false,
        }
    }

    /// Enable or disable packet logging
    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.packet_logging = enabled;
    }

    /// Builder form of [`set_packet_logging`](Self::set_packet_logging)
    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

impl TcpTransport {
    /// Connect to a TCP endpoint
    pub async fn connect<A>(address: A, timeout_duration: Duration) -> RocResult<Self>
    where
        A: ToSocketAddrs + std::fmt::Display,
    {
        let stream = match timeout(timeout_duration, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(RocError::connection(format!("Failed to connect to {}: {}", address, e)))
            }
            Err(_) => {
                return Err(RocError::timeout(
                    format!("connect to {}", address),
                    timeout_duration.as_millis() as u64,
                ))
            }
        };
        stream.set_nodelay(true)?;

        Ok(Self::new(stream, "TCP", timeout_duration))
    }
}

impl SerialTransport {
    /// Open a serial port with 8 data bits, 1 stop bit and no parity
    pub fn open(port: &str, baud_rate: u32, timeout: Duration) -> RocResult<Self> {
        Self::open_with_config(
            port,
            baud_rate,
            tokio_serial::DataBits::Eight,
            tokio_serial::StopBits::One,
            tokio_serial::Parity::None,
            timeout,
        )
    }

    /// Open a serial port with full configuration
    pub fn open_with_config(
        port: &str,
        baud_rate: u32,
        data_bits: tokio_serial::DataBits,
        stop_bits: tokio_serial::StopBits,
        parity: tokio_serial::Parity,
        timeout: Duration,
    ) -> RocResult<Self> {
        let builder = tokio_serial::new(port, baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .timeout(timeout);

        let stream = tokio_serial::SerialStream::open(&builder)
            .map_err(|e| RocError::connection(format!("Failed to open serial port {}: {}", port, e)))?;

        Ok(Self::new(stream, "SERIAL", timeout))
    }
}

#[async_trait]
impl<S> RocTransport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn flush(&mut self) -> RocResult<()> {
        let limit = self.timeout;
        let timeout_ms = self.timeout_ms();
        let stream = self.stream.as_mut().ok_or_else(closed)?;

        let result = timeout(limit, stream.flush()).await;
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.stats.errors += 1;
                Err(RocError::io(format!("Failed to flush stream: {}", e)))
            }
            Err(_) => {
                self.stats.timeouts += 1;
                self.stats.errors += 1;
                Err(RocError::timeout("flush stream", timeout_ms))
            }
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> RocResult<()> {
        if self.packet_logging {
            log_packet(&self.label, "send", data);
        }

        let limit = self.timeout;
        let timeout_ms = self.timeout_ms();
        let stream = self.stream.as_mut().ok_or_else(closed)?;

        let result = timeout(limit, stream.write_all(data)).await;
        match result {
            Ok(Ok(())) => {
                self.stats.requests_sent += 1;
                self.stats.bytes_sent += data.len() as u64;
                Ok(())
            }
            Ok(Err(e)) => {
                self.stats.errors += 1;
                self.stream = None;
                Err(RocError::io(format!("Failed to send frame: {}", e)))
            }
            Err(_) => {
                self.stats.timeouts += 1;
                self.stats.errors += 1;
                self.stream = None;
                Err(RocError::timeout("send request", timeout_ms))
            }
        }
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> RocResult<()> {
        let limit = self.timeout;
        let timeout_ms = self.timeout_ms();
        let expected = buf.len();
        let stream = self.stream.as_mut().ok_or_else(closed)?;

        let mut filled = 0;
        let mut failure = None;
        while filled < expected {
            match timeout(limit, stream.read(&mut buf[filled..])).await {
                Ok(Ok(0)) => {
                    failure = Some(RocError::short_read(expected, filled));
                    break;
                }
                Ok(Ok(n)) => filled += n,
                Ok(Err(e)) => {
                    failure = Some(RocError::io(format!("Failed to read response: {}", e)));
                    break;
                }
                Err(_) => {
                    self.stats.timeouts += 1;
                    failure = Some(RocError::timeout("read response", timeout_ms));
                    break;
                }
            }
        }

        // a late reply would be read as the head of the next response
        if matches!(failure, Some(RocError::Timeout { .. })) {
            self.stream = None;
        }

        self.stats.bytes_received += filled as u64;
        if self.packet_logging && filled > 0 {
            log_packet(&self.label, "receive", &buf[..filled]);
        }

        match failure {
            Some(error) => {
                self.stats.errors += 1;
                Err(error)
            }
            None => {
                self.stats.responses_received += 1;
                Ok(())
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) -> RocResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
