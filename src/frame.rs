//! # ROC Frame Codec
//!
//! One request/response exchange, independent of opcode semantics.
//!
//! ## Frame Layout
//!
//! ```text
//! Request:  ROC unit | ROC group | HOST unit | HOST group | opcode | len | payload... | CRC lo | CRC hi
//! Response: HOST unit | HOST group | ROC unit | ROC group | opcode | len | payload... | CRC lo | CRC hi
//! ```
//!
//! The checksum is CRC-16/ARC over every byte before it, appended low byte
//! first. The device echoes the addresses with their roles swapped.
//!
//! No retry happens here; a single failure propagates to the caller.

use crc::{Crc, CRC_16_ARC};
use log::debug;

use crate::error::{RocError, RocResult};
use crate::protocol::{DeviceAddress, RocOpcode, MAX_PAYLOAD_LEN};
use crate::transport::RocTransport;

/// Response head size: host(2) + roc(2) + opcode(1) + length(1)
pub const HEAD_SIZE: usize = 6;

/// Trailing checksum size
pub const CRC_SIZE: usize = 2;

/// CRC calculator for ROC frames
const CRC_ROC: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// Calculate the frame checksum
pub fn calculate_crc(data: &[u8]) -> u16 {
    CRC_ROC.checksum(data)
}

/// Check that the last two bytes of `frame` are the CRC of the rest
pub fn verify_crc(frame: &[u8]) -> bool {
    if frame.len() < CRC_SIZE {
        return false;
    }
    let data_len = frame.len() - CRC_SIZE;
    let received = u16::from_le_bytes([frame[data_len], frame[data_len + 1]]);
    received == calculate_crc(&frame[..data_len])
}

/// Encode a request frame
pub fn encode_request(
    roc_address: DeviceAddress,
    host_address: DeviceAddress,
    opcode: RocOpcode,
    payload: &[u8],
) -> RocResult<Vec<u8>> {
    if opcode.is_error_response() {
        return Err(RocError::invalid_data("opcode 255 is not a valid request"));
    }
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(RocError::invalid_data(format!(
            "request payload too long: {} bytes (max {})",
            payload.len(),
            MAX_PAYLOAD_LEN
        )));
    }

    let mut frame = Vec::with_capacity(HEAD_SIZE + payload.len() + CRC_SIZE);
    frame.extend_from_slice(&roc_address.to_bytes());
    frame.extend_from_slice(&host_address.to_bytes());
    frame.push(opcode.to_u8());
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);

    let crc = calculate_crc(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());

    Ok(frame)
}

/// Decoded response head
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHead {
    pub host_address: DeviceAddress,
    pub roc_address: DeviceAddress,
    pub opcode: u8,
    pub data_len: u8,
}

impl ResponseHead {
    pub fn parse(head: &[u8; HEAD_SIZE]) -> Self {
        Self {
            host_address: DeviceAddress::new(head[0], head[1]),
            roc_address: DeviceAddress::new(head[2], head[3]),
            opcode: head[4],
            data_len: head[5],
        }
    }

    /// Validate the echoed addresses and opcode against the request
    pub fn validate(
        &self,
        roc_address: DeviceAddress,
        host_address: DeviceAddress,
        opcode: RocOpcode,
    ) -> RocResult<()> {
        if self.roc_address != roc_address {
            return Err(RocError::address_mismatch("ROC", roc_address, self.roc_address));
        }
        if self.host_address != host_address {
            return Err(RocError::address_mismatch("HOST", host_address, self.host_address));
        }
        if self.opcode == RocOpcode::Opcode255.to_u8() {
            return Err(RocError::device_rejected(opcode.to_u8()));
        }
        if self.opcode != opcode.to_u8() {
            return Err(RocError::opcode_mismatch(opcode.to_u8(), self.opcode));
        }
        Ok(())
    }
}

/// Perform one request/response exchange
///
/// Returns the response payload followed by its 2 checksum bytes; opcode
/// specific parsers trim the tail themselves.
///
/// # Errors
///
/// - `ShortHeader` / `ShortBody` - the stream ended early
/// - `AddressMismatch` - echoed ROC or host address differs
/// - `DeviceRejected` - the device answered with opcode 255
/// - `OpcodeMismatch` - echoed opcode differs
/// - `CrcMismatch` - checksum does not match `head ++ payload`
pub async fn exchange<T: RocTransport + ?Sized>(
    transport: &mut T,
    roc_address: DeviceAddress,
    host_address: DeviceAddress,
    opcode: RocOpcode,
    payload: &[u8],
) -> RocResult<Vec<u8>> {
    let frame = encode_request(roc_address, host_address, opcode, payload)?;
    debug!("{} -> {}: {} payload bytes", opcode, roc_address, payload.len());

    transport.flush().await?;
    transport.write_all(&frame).await?;

    let mut head = [0u8; HEAD_SIZE];
    transport.read_exact(&mut head).await.map_err(|e| match e {
        RocError::ShortRead { expected, actual } => RocError::short_header(expected, actual),
        other => other,
    })?;

    let response_head = ResponseHead::parse(&head);
    response_head.validate(roc_address, host_address, opcode)?;

    let body_len = response_head.data_len as usize + CRC_SIZE;
    let mut body = vec![0u8; body_len];
    transport.read_exact(&mut body).await.map_err(|e| match e {
        RocError::ShortRead { expected, actual } => RocError::short_body(expected, actual),
        other => other,
    })?;

    let data_len = response_head.data_len as usize;
    let received = u16::from_le_bytes([body[data_len], body[data_len + 1]]);
    let mut checked = Vec::with_capacity(HEAD_SIZE + data_len);
    checked.extend_from_slice(&head);
    checked.extend_from_slice(&body[..data_len]);
    let calculated = calculate_crc(&checked);

    if received != calculated {
        return Err(RocError::crc_mismatch(calculated, received));
    }

    Ok(body)
}
