/// High-level ROC retrieval engine
///
/// `RocMaster` turns the opcode operations into application workflows:
///
/// - typed parameter reads (opcode 180)
/// - log pointer snapshots (opcode 120)
/// - history timestamps and values, one page at a time (opcode 130)
/// - archived point discovery (opcode 167)
/// - alarm reads (opcode 121)
/// - the two streaming workflows, [`get_histories`](RocMaster::get_histories)
///   and [`get_alarms`](RocMaster::get_alarms)
///
/// Single-shot operations propagate every error. The streams retry each page
/// read up to `retry_attempts` times and end with
/// [`StreamStep::Truncated`](crate::stream::StreamStep::Truncated) when that is
/// exhausted.
///
/// ## Usage Example
///
/// ```rust,no_run
/// use voltage_roc::{DeviceSettings, HistoryKind, RocMaster, TcpTransport};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let transport = TcpTransport::connect("10.0.0.21:4000", Duration::from_secs(3)).await?;
///     let mut master = RocMaster::new(transport);
///     let settings = DeviceSettings::default();
///
///     let pointers = master.get_history_pointers(&settings).await?;
///     println!("alarm pointer: {}", pointers.alarm_log_pointer);
///
///     let alarms = master.get_alarms(&settings, 100, false).await?.collect().await;
///     for alarm in &alarms.items {
///         println!("{} {} {}", alarm.timestamp, alarm.tag, alarm.description);
///     }
///     Ok(())
/// }
/// ```

use chrono::{DateTime, FixedOffset, Offset, Utc};
use tokio_util::sync::CancellationToken;

use crate::alarm::{decode_alarm, AlarmResult, AlarmStream};
use crate::config::RocConfig;
use crate::error::{RocError, RocResult};
use crate::history::{resolve_history_timestamp, HistoryKind, HistoryStream};
use crate::opcodes;
use crate::protocol::{
    AlarmRecord, DeviceSettings, HistoryParams, HistoryPointers, PointRef, RocPointType, TIMESTAMP_POINT,
};
use crate::transport::{RocTransport, TransportStats};
use crate::value::{decode_records, reorder, ByteOrder, ParameterSpec, RocValue, Value};

/// Default bounded retry for streaming page reads
pub const DEFAULT_RETRY_ATTEMPTS: usize = 2;

/// Default device clock offset in hours
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 5;

/// Logical numbers of the history parameters point type
const HISTORY_PARAM_BLOCKS: u8 = 3;

/// Parameters requested per history parameters block
const HISTORY_PARAMS_PER_BLOCK: u8 = 60;

/// Descriptors decoded from each history parameters block
const DESCRIPTORS_PER_BLOCK: usize = 15;

/// Offset of the first value in a single-point opcode 180 response
/// (count byte plus the echoed point triple)
const SINGLE_VALUE_OFFSET: usize = 4;

/// ROC retrieval engine over one transport
pub struct RocMaster<T: RocTransport> {
    transport: T,
    cancel: CancellationToken,
    retry_attempts: usize,
    utc_offset: FixedOffset,
}

impl<T: RocTransport> RocMaster<T> {
    /// Create a master with a fresh cancellation token, 2 retry attempts and
    /// a UTC+5 device clock
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            cancel: CancellationToken::new(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            utc_offset: FixedOffset::east_opt(DEFAULT_UTC_OFFSET_HOURS * 3600).unwrap_or_else(|| Utc.fix()),
        }
    }

    /// Create a master using retry and clock settings from a config
    pub fn from_config(transport: T, config: &RocConfig) -> RocResult<Self> {
        config.validate()?;
        let utc_offset = config.utc_offset()?;

        Ok(Self::new(transport)
            .with_retry_attempts(config.retry_attempts)
            .with_utc_offset(utc_offset))
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_retry_attempts(mut self, attempts: usize) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    /// Token observed by the streams; cancel it to end them at the next
    /// parameter, page or alarm boundary
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn retry_attempts(&self) -> usize {
        self.retry_attempts
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset
    }

    /// Current time in the device clock offset
    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.utc_offset)
    }

    /// Get a reference to the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn get_stats(&self) -> TransportStats {
        self.transport.get_stats()
    }

    pub async fn close(&mut self) -> RocResult<()> {
        self.transport.close().await
    }

    /// Read one parameter as a fixed width number
    ///
    /// The value bytes are permuted by `byte_order` first when given, then read
    /// little-endian.
    pub async fn get_parameter<V: RocValue>(
        &mut self,
        settings: &DeviceSettings,
        point: PointRef,
        byte_order: Option<&ByteOrder>,
    ) -> RocResult<V> {
        let data = opcodes::request_opcode180(&mut self.transport, settings, &[point]).await?;

        let end = SINGLE_VALUE_OFFSET + V::SIZE;
        if data.len() < end {
            return Err(RocError::invalid_data(format!(
                "parameter {} response too short: expected {} bytes, got {}",
                point,
                end,
                data.len()
            )));
        }

        let bytes = reorder(&data[SINGLE_VALUE_OFFSET..end], byte_order)?;
        Ok(V::read_le(&bytes))
    }

    /// Read many named parameters in one opcode 180 round trip
    ///
    /// Results keep the request order. Non-finite numbers are reported as
    /// [`Value::Infinite`]. When cancellation is requested the parameters
    /// decoded so far are returned.
    ///
    /// # Errors
    ///
    /// `OrderMismatch` when the i-th echoed point is not the i-th requested one.
    pub async fn get_parameters(
        &mut self,
        settings: &DeviceSettings,
        parameters: &[ParameterSpec],
    ) -> RocResult<Vec<(String, Value)>> {
        let sizes = parameters
            .iter()
            .map(ParameterSpec::value_size)
            .collect::<RocResult<Vec<_>>>()?;
        let points: Vec<PointRef> = parameters.iter().map(ParameterSpec::point_ref).collect();

        let data = opcodes::request_opcode180(&mut self.transport, settings, &points).await?;

        let mut result = Vec::with_capacity(parameters.len());
        let mut offset = 1;
        for (index, (spec, size)) in parameters.iter().zip(sizes).enumerate() {
            if self.is_cancelled() {
                return Ok(result);
            }

            let end = offset + 3 + size;
            if data.len() < end {
                return Err(RocError::invalid_data(format!(
                    "parameter '{}' missing from response: need {} bytes, got {}",
                    spec.name,
                    end,
                    data.len()
                )));
            }

            let echoed = PointRef::new(data[offset], data[offset + 1], data[offset + 2]);
            if echoed != spec.point_ref() {
                return Err(RocError::order_mismatch(index, spec.point_ref(), echoed));
            }

            let bytes = reorder(&data[offset + 3..end], spec.byte_order.as_ref())?;
            let value = spec.value_type.decode(&bytes)?.into_reported();
            result.push((spec.name.clone(), value));

            offset = end;
        }

        Ok(result)
    }

    /// Read the alarm, event and history log pointers
    pub async fn get_history_pointers(&mut self, settings: &DeviceSettings) -> RocResult<HistoryPointers> {
        opcodes::request_opcode120(&mut self.transport, settings).await
    }

    /// Read up to 60 history timestamps starting at `index`
    ///
    /// Each record is `minute, hour, day, month`. Unwritten slots (day or month
    /// 0) are skipped; a date that would lie in the future is taken from the
    /// previous year.
    pub async fn get_history_date_times(
        &mut self,
        settings: &DeviceSettings,
        type_of_history: u8,
        count: u8,
        index: i16,
    ) -> RocResult<Vec<DateTime<FixedOffset>>> {
        let data = opcodes::request_opcode130(
            &mut self.transport,
            settings,
            type_of_history,
            TIMESTAMP_POINT,
            count,
            index,
        )
        .await?;

        let records = decode_records::<u32>(&data, count as usize)?;
        let now = self.now();

        let mut timestamps = Vec::with_capacity(records.len());
        for record in records {
            let [minute, hour, day, month] = record.to_le_bytes();
            if month == 0 || day == 0 {
                continue;
            }
            let timestamp = resolve_history_timestamp(minute, hour, day, month, now).ok_or_else(|| {
                RocError::invalid_data(format!(
                    "invalid history timestamp {:02}-{:02} {:02}:{:02} at index {}",
                    month, day, hour, minute, index
                ))
            })?;
            timestamps.push(timestamp);
        }

        Ok(timestamps)
    }

    /// Read up to 60 history values of one archived point
    pub async fn get_history_values<V: RocValue>(
        &mut self,
        settings: &DeviceSettings,
        type_of_history: u8,
        history_point: u8,
        count: u8,
        index: i16,
    ) -> RocResult<Vec<V>> {
        let data = opcodes::request_opcode130(
            &mut self.transport,
            settings,
            type_of_history,
            history_point,
            count,
            index,
        )
        .await?;

        decode_records::<V>(&data, count as usize)
    }

    /// Read one history column decoded by the parameter's declared type
    ///
    /// History records are stored in device order, so `byte_order` is not applied.
    pub(crate) async fn read_history_column(
        &mut self,
        settings: &DeviceSettings,
        spec: &ParameterSpec,
        history_point: u8,
        count: u8,
        index: i16,
    ) -> RocResult<Vec<Value>> {
        let size = spec.value_size()?;
        let data = opcodes::request_opcode130(&mut self.transport, settings, 0, history_point, count, index).await?;

        let needed = size * count as usize;
        if data.len() < needed {
            return Err(RocError::invalid_data(format!(
                "history column '{}' too short: expected {} bytes, got {}",
                spec.name,
                needed,
                data.len()
            )));
        }

        data[..needed]
            .chunks_exact(size)
            .map(|chunk| Ok(spec.value_type.decode(chunk)?.into_reported()))
            .collect()
    }

    /// Read the archived point table
    ///
    /// Three opcode 167 blocks of the history parameters point type, 15
    /// descriptors each. Unused `(0, 0, 0)` slots are included.
    pub async fn get_history_params(&mut self, settings: &DeviceSettings) -> RocResult<Vec<HistoryParams>> {
        let mut params = Vec::with_capacity(HISTORY_PARAM_BLOCKS as usize * DESCRIPTORS_PER_BLOCK);

        for logical_number in 0..HISTORY_PARAM_BLOCKS {
            let block = opcodes::request_opcode167(
                &mut self.transport,
                settings,
                RocPointType::HistoryParameters,
                logical_number,
                HISTORY_PARAMS_PER_BLOCK,
                0,
            )
            .await?;

            let needed = DESCRIPTORS_PER_BLOCK * HistoryParams::ENCODED_LEN;
            if block.len() < needed {
                return Err(RocError::invalid_data(format!(
                    "history parameters block {} too short: expected {} bytes, got {}",
                    logical_number,
                    needed,
                    block.len()
                )));
            }
            params.extend(opcodes::decode_history_params(&block[..needed]));
        }

        Ok(params)
    }

    /// Read alarm records once, without retry
    pub async fn read_alarms(
        &mut self,
        settings: &DeviceSettings,
        count: u8,
        start: i16,
    ) -> RocResult<Vec<AlarmRecord>> {
        opcodes::request_opcode121(&mut self.transport, settings, count, start).await
    }

    /// Read one alarm chunk and decode every record in the device clock
    ///
    /// A record with an undecodable date fails the whole chunk.
    pub(crate) async fn read_alarm_chunk(
        &mut self,
        settings: &DeviceSettings,
        count: u8,
        start: i16,
    ) -> RocResult<Vec<AlarmResult>> {
        let records = self.read_alarms(settings, count, start).await?;
        records
            .iter()
            .map(|record| decode_alarm(record, self.utc_offset))
            .collect()
    }

    /// Stream archived history for named parameters
    ///
    /// Setup (pointer read, archived point discovery, index and value type
    /// validation) fails with an error; page reads inside the stream are
    /// retried and end the stream early on exhaustion.
    ///
    /// # Arguments
    ///
    /// * `kind` - daily (indexes 0..daily log count) or hourly (0..=839)
    /// * `from_index` / `to_index` - record range, wrapping when `to < from`
    /// * `full_read` - ignore the range length and read the whole retention
    pub async fn get_histories(
        &mut self,
        settings: &DeviceSettings,
        kind: HistoryKind,
        parameters: &[ParameterSpec],
        from_index: i16,
        to_index: i16,
        full_read: bool,
    ) -> RocResult<HistoryStream<'_, T>> {
        HistoryStream::open(self, settings, kind, parameters, from_index, to_index, full_read).await
    }

    /// Stream alarms logged since `last_point`
    ///
    /// Ends immediately when the device alarm pointer still equals
    /// `last_point`. With `full_read` the whole 240 slot ring is read.
    pub async fn get_alarms(
        &mut self,
        settings: &DeviceSettings,
        last_point: i16,
        full_read: bool,
    ) -> RocResult<AlarmStream<'_, T>> {
        AlarmStream::open(self, settings, last_point, full_read).await
    }
}
