//! # Opcode Operations
//!
//! Request builders and response validators for the five opcodes the
//! retrieval engine needs. Each function performs exactly one
//! [`exchange`](crate::frame::exchange) and never retries.
//!
//! | Opcode | Function               | Returns                                   |
//! |--------|------------------------|-------------------------------------------|
//! | 180    | [`request_opcode180`]  | echoed count byte followed by point/value entries |
//! | 120    | [`request_opcode120`]  | [`HistoryPointers`]                       |
//! | 130    | [`request_opcode130`]  | history records after the 3 byte echo     |
//! | 167    | [`request_opcode167`]  | parameter block after the 4 byte echo     |
//! | 121    | [`request_opcode121`]  | decoded [`AlarmRecord`]s                  |
//!
//! The pure decoders ([`decode_history_pointers`], [`decode_alarm_records`],
//! [`decode_history_params`]) are public so captured responses can be decoded
//! offline.

use byteorder::{ByteOrder as _, LittleEndian};
use log::debug;

use crate::error::{RocError, RocResult};
use crate::frame::{exchange, CRC_SIZE};
use crate::protocol::{
    AlarmRecord, DeviceSettings, HistoryParams, HistoryPointers, PointRef, RocOpcode, RocPointType,
};
use crate::transport::RocTransport;
use crate::utils::{format::bytes_to_compact_hex, validation};
use crate::value::decode_ascii;

/// Opcode 120 payload length
pub const HISTORY_POINTERS_LEN: usize = 23;

/// Offset of the first record in an opcode 121 payload
const ALARM_RECORDS_OFFSET: usize = 5;

async fn request<T: RocTransport + ?Sized>(
    transport: &mut T,
    settings: &DeviceSettings,
    opcode: RocOpcode,
    payload: &[u8],
) -> RocResult<Vec<u8>> {
    let mut body = exchange(
        transport,
        settings.roc_address,
        settings.host_address,
        opcode,
        payload,
    )
    .await?;
    body.truncate(body.len().saturating_sub(CRC_SIZE));
    debug!("{} response data: {}", opcode, bytes_to_compact_hex(&body));
    Ok(body)
}

fn require_len(data: &[u8], needed: usize, what: &str) -> RocResult<()> {
    if data.len() < needed {
        return Err(RocError::invalid_data(format!(
            "{} response too short: expected at least {} bytes, got {}",
            what,
            needed,
            data.len()
        )));
    }
    Ok(())
}

/// Read scattered parameters in one round trip (opcode 180)
///
/// The request is `count ++ (point, logic, param)*`. The returned data starts
/// with the echoed count; the rest is self-describing only together with the
/// request, so walking it is left to the caller.
///
/// # Errors
///
/// `CountMismatch` when the echoed count differs from `points.len()`.
pub async fn request_opcode180<T: RocTransport + ?Sized>(
    transport: &mut T,
    settings: &DeviceSettings,
    points: &[PointRef],
) -> RocResult<Vec<u8>> {
    validation::validate_parameter_count(points.len())?;

    let mut payload = Vec::with_capacity(1 + points.len() * 3);
    payload.push(points.len() as u8);
    for point in points {
        payload.extend_from_slice(&point.to_bytes());
    }

    let data = request(transport, settings, RocOpcode::Opcode180, &payload).await?;
    require_len(&data, 1, "Opcode 180")?;

    if data[0] != points.len() as u8 {
        return Err(RocError::count_mismatch(points.len() as u8, data[0]));
    }

    Ok(data)
}

/// Read the alarm, event and history log pointers (opcode 120)
pub async fn request_opcode120<T: RocTransport + ?Sized>(
    transport: &mut T,
    settings: &DeviceSettings,
) -> RocResult<HistoryPointers> {
    let data = request(transport, settings, RocOpcode::Opcode120, &[]).await?;
    decode_history_pointers(&data)
}

/// Decode an opcode 120 payload
///
/// Int16 fields sit at offsets 0, 2, 4, 6 and 8; byte fields at 12, 20, 21
/// and 22.
pub fn decode_history_pointers(data: &[u8]) -> RocResult<HistoryPointers> {
    require_len(data, HISTORY_POINTERS_LEN, "Opcode 120")?;

    Ok(HistoryPointers {
        alarm_log_pointer: LittleEndian::read_i16(&data[0..2]),
        event_log_pointer: LittleEndian::read_i16(&data[2..4]),
        station_hourly_history_index: LittleEndian::read_i16(&data[4..6]),
        user_periodic_hourly_history_index: LittleEndian::read_i16(&data[6..8]),
        user_periodic_hourly_history_logs_count: LittleEndian::read_i16(&data[8..10]),
        station_daily_history_index: data[12],
        daily_history_logs_count: data[20],
        hourly_history_logs_days: data[21],
        user_periodic_history_logs_days: data[22],
    })
}

/// Read archived history records (opcode 130)
///
/// Returns the record bytes that follow the `type, point, count` echo.
///
/// # Arguments
///
/// * `type_of_history` - history type selector echoed in byte 0
/// * `history_point` - archived point number, or [`TIMESTAMP_POINT`](crate::protocol::TIMESTAMP_POINT)
/// * `count` - records to read, at most 60
/// * `index` - starting history index (daily records are `840 + x`)
pub async fn request_opcode130<T: RocTransport + ?Sized>(
    transport: &mut T,
    settings: &DeviceSettings,
    type_of_history: u8,
    history_point: u8,
    count: u8,
    index: i16,
) -> RocResult<Vec<u8>> {
    validation::validate_history_count(count)?;

    let index_bytes = index.to_le_bytes();
    let payload = [type_of_history, history_point, count, index_bytes[0], index_bytes[1]];

    let data = request(transport, settings, RocOpcode::Opcode130, &payload).await?;
    require_len(&data, 3, "Opcode 130")?;

    if data[0] != type_of_history {
        return Err(RocError::point_mismatch("type", type_of_history, data[0]));
    }
    if data[1] != history_point {
        return Err(RocError::point_mismatch("point number", history_point, data[1]));
    }

    Ok(data[3..].to_vec())
}

/// Read a contiguous block of parameters of one logical point (opcode 167)
///
/// Returns the parameter bytes after the four byte header echo.
pub async fn request_opcode167<T: RocTransport + ?Sized>(
    transport: &mut T,
    settings: &DeviceSettings,
    point_type: RocPointType,
    logical_number: u8,
    parameters_count: u8,
    starting_index: u8,
) -> RocResult<Vec<u8>> {
    let header = [point_type.to_u8(), logical_number, parameters_count, starting_index];

    let data = request(transport, settings, RocOpcode::Opcode167, &header).await?;
    require_len(&data, header.len(), "Opcode 167")?;

    let fields = ["point type", "logical number", "parameters count", "starting index"];
    for ((&field, &expected), &actual) in fields.iter().zip(header.iter()).zip(data.iter()) {
        if expected != actual {
            return Err(RocError::block_header_mismatch(field, expected, actual));
        }
    }

    Ok(data[header.len()..].to_vec())
}

/// Decode a history parameters block into 8 byte descriptors
///
/// Unused `(0, 0, 0)` slots are kept; filtering is up to the caller.
pub fn decode_history_params(block: &[u8]) -> Vec<HistoryParams> {
    block
        .chunks_exact(HistoryParams::ENCODED_LEN)
        .map(|d| HistoryParams {
            point_tag: (d[0], d[1], d[2]),
            point_path: (d[3], d[4], d[5]),
            archive_type: d[6],
            avg_or_rate: d[7],
        })
        .collect()
}

/// Read alarm log records (opcode 121)
///
/// The device may return fewer records than requested near the end of the
/// log; the first response byte carries the actual number.
pub async fn request_opcode121<T: RocTransport + ?Sized>(
    transport: &mut T,
    settings: &DeviceSettings,
    number_of_alarms: u8,
    starting_pointer: i16,
) -> RocResult<Vec<AlarmRecord>> {
    validation::validate_alarm_count(number_of_alarms)?;

    let pointer_bytes = starting_pointer.to_le_bytes();
    let payload = [number_of_alarms, pointer_bytes[0], pointer_bytes[1]];

    let data = request(transport, settings, RocOpcode::Opcode121, &payload).await?;
    decode_alarm_records(&data)
}

/// Decode an opcode 121 payload
///
/// Layout: `count(1) ++ starting pointer(2) ++ current pointer(2)` followed by
/// `count` records of 22 bytes: type, code, seconds, minutes, hours, day,
/// month, year, 10 byte ASCII tag, f32 value.
pub fn decode_alarm_records(data: &[u8]) -> RocResult<Vec<AlarmRecord>> {
    require_len(data, 1, "Opcode 121")?;
    let count = data[0] as usize;
    require_len(data, ALARM_RECORDS_OFFSET + count * AlarmRecord::ENCODED_LEN, "Opcode 121")?;

    let records = data[ALARM_RECORDS_OFFSET..]
        .chunks_exact(AlarmRecord::ENCODED_LEN)
        .take(count)
        .map(|r| AlarmRecord {
            alarm_type: r[0],
            alarm_code: r[1],
            seconds: r[2],
            minutes: r[3],
            hours: r[4],
            day: r[5],
            month: r[6],
            year: r[7],
            tag: decode_ascii(&r[8..18]),
            value: LittleEndian::read_f32(&r[18..22]),
        })
        .collect();

    Ok(records)
}
