//! Integration Tests for Voltage ROC Library
//!
//! These tests drive `RocMaster` against an in-process fake ROC device that
//! speaks the real frame format: it parses every request, checks its CRC and
//! answers opcodes 120, 121, 130, 167 and 180 from an in-memory alarm ring,
//! history log and parameter table.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, TimeZone, Timelike, Utc};
use futures::StreamExt;
use voltage_roc::frame::calculate_crc;
use voltage_roc::*;

const HOURLY_SPACE: usize = 840;
const DAILY_SLOTS: usize = 35;
const TIMESTAMP_POINT: u8 = 254;

/// Fixed value encodings of the fake history columns
#[derive(Debug, Clone, Copy)]
enum Column {
    Float,
    Int16,
}

/// Fake ROC 809 style device
struct FakeRoc {
    settings: DeviceSettings,
    offset: FixedOffset,
    base_hour: DateTime<FixedOffset>,
    base_day: DateTime<FixedOffset>,

    alarm_pointer: i16,
    alarms: Vec<[u8; 22]>,
    hourly_index: i16,
    daily_index: u8,
    hourly_days: u8,
    /// 45 `(tag, path)` slots of the archived point table
    archive_table: Vec<([u8; 3], [u8; 3])>,
    /// Encoding of each history point
    columns: Vec<Column>,
    parameters: HashMap<[u8; 3], Vec<u8>>,

    /// Requests whose opcode and payload match get a corrupted CRC
    fail_rules: Vec<(u8, Vec<u8>, usize)>,
    silent: bool,

    requests: Vec<(u8, Vec<u8>)>,
    outbox: VecDeque<u8>,
    stats: TransportStats,
}

impl FakeRoc {
    fn new() -> Self {
        let offset = FixedOffset::east_opt(5 * 3600).unwrap();
        let now = Utc::now().with_timezone(&offset);
        let base_hour = offset
            .with_ymd_and_hms(now.year(), now.month(), now.day(), now.hour(), 0, 0)
            .unwrap()
            - chrono::Duration::hours(1);
        let base_day = offset
            .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
            .unwrap();

        let alarms = (0..240u16)
            .map(|slot| {
                let mut record = [0u8; 22];
                record[0] = if slot % 2 == 0 { 0x31 } else { 0x30 };
                record[1] = 2;
                record[2] = 30;
                record[3] = 20;
                record[4] = 10;
                record[5] = 1 + (slot % 28) as u8;
                record[6] = 5;
                record[7] = 24;
                let tag = format!("PT-{:03}", slot);
                record[8..8 + tag.len()].copy_from_slice(tag.as_bytes());
                record[18..22].copy_from_slice(&(slot as f32 * 1.5).to_le_bytes());
                record
            })
            .collect();

        let mut archive_table = vec![([0u8; 3], [0u8; 3]); 45];
        archive_table[0] = ([1, 1, 1], [10, 0, 3]); // pressure
        archive_table[2] = ([2, 2, 2], [10, 0, 4]); // temperature
        archive_table[20] = ([3, 3, 3], [10, 0, 6]); // energy

        let mut parameters = HashMap::new();
        parameters.insert([10, 0, 3], 812.5f32.to_le_bytes().to_vec());
        parameters.insert([10, 0, 4], f32::NAN.to_le_bytes().to_vec());
        parameters.insert([10, 0, 7], 42.25f32.to_be_bytes().to_vec());
        parameters.insert([15, 0, 0], b"ROC809\0\0\0\0".to_vec());
        parameters.insert([12, 0, 8], 7i16.to_le_bytes().to_vec());

        Self {
            settings: DeviceSettings::default(),
            offset,
            base_hour,
            base_day,
            alarm_pointer: 10,
            alarms,
            hourly_index: 10,
            daily_index: 3,
            hourly_days: 35,
            archive_table,
            columns: vec![Column::Float, Column::Int16, Column::Float],
            parameters,
            fail_rules: Vec::new(),
            silent: false,
            requests: Vec::new(),
            outbox: VecDeque::new(),
            stats: TransportStats::default(),
        }
    }

    /// Corrupt the CRC of the next `times` responses to a matching request
    fn fail(mut self, opcode: u8, payload: &[u8], times: usize) -> Self {
        self.fail_rules.push((opcode, payload.to_vec(), times));
        self
    }

    fn requests_for(&self, opcode: u8) -> Vec<Vec<u8>> {
        self.requests
            .iter()
            .filter(|(op, _)| *op == opcode)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// History index space slot -> record time
    fn timestamp_of(&self, index: usize) -> DateTime<FixedOffset> {
        if index < HOURLY_SPACE {
            let age = (self.hourly_index as i64 - 1 - index as i64).rem_euclid(HOURLY_SPACE as i64);
            self.base_hour - chrono::Duration::hours(age)
        } else {
            let slot = index - HOURLY_SPACE;
            let age = (self.daily_index as i64 - 1 - slot as i64).rem_euclid(DAILY_SLOTS as i64);
            self.base_day - chrono::Duration::days(age)
        }
    }

    fn value_of(point: u8, index: usize) -> f32 {
        100.0 * (point as f32 + 1.0) + index as f32
    }

    /// Slot read by the `i`-th record of a request starting at `start`
    fn slot(start: i16, i: usize) -> usize {
        let start = start as usize;
        if start < HOURLY_SPACE {
            (start + i) % HOURLY_SPACE
        } else {
            HOURLY_SPACE + (start - HOURLY_SPACE + i) % DAILY_SLOTS
        }
    }

    fn handle(&mut self, opcode: u8, payload: &[u8]) -> (u8, Vec<u8>) {
        match opcode {
            120 => {
                let mut data = vec![0u8; 23];
                data[0..2].copy_from_slice(&self.alarm_pointer.to_le_bytes());
                data[2..4].copy_from_slice(&77i16.to_le_bytes());
                data[4..6].copy_from_slice(&self.hourly_index.to_le_bytes());
                data[12] = self.daily_index;
                data[20] = DAILY_SLOTS as u8;
                data[21] = self.hourly_days;
                data[22] = 35;
                (120, data)
            }
            121 => {
                let count = payload[0] as usize;
                let start = i16::from_le_bytes([payload[1], payload[2]]);
                let mut data = vec![count as u8];
                data.extend_from_slice(&start.to_le_bytes());
                data.extend_from_slice(&self.alarm_pointer.to_le_bytes());
                for i in 0..count {
                    data.extend_from_slice(&self.alarms[(start as usize + i) % 240]);
                }
                (121, data)
            }
            130 => {
                let (kind, point, count) = (payload[0], payload[1], payload[2] as usize);
                let start = i16::from_le_bytes([payload[3], payload[4]]);
                let mut data = vec![kind, point, count as u8];
                for i in 0..count {
                    let slot = Self::slot(start, i);
                    if point == TIMESTAMP_POINT {
                        let ts = self.timestamp_of(slot);
                        data.extend_from_slice(&[ts.minute() as u8, ts.hour() as u8, ts.day() as u8, ts.month() as u8]);
                    } else {
                        match self.columns[point as usize] {
                            Column::Float => data.extend_from_slice(&Self::value_of(point, slot).to_le_bytes()),
                            Column::Int16 => data.extend_from_slice(&(slot as i16).to_le_bytes()),
                        }
                    }
                }
                (130, data)
            }
            167 => {
                let logic = payload[1] as usize;
                let mut data = payload[..4].to_vec();
                for (tag, path) in &self.archive_table[logic * 15..logic * 15 + 15] {
                    data.extend_from_slice(tag);
                    data.extend_from_slice(path);
                    data.extend_from_slice(&[1, 0]);
                }
                (167, data)
            }
            180 => {
                let mut data = vec![payload[0]];
                for point in payload[1..].chunks_exact(3) {
                    let key = [point[0], point[1], point[2]];
                    let Some(value) = self.parameters.get(&key) else {
                        return (255, vec![20]);
                    };
                    data.extend_from_slice(point);
                    data.extend_from_slice(value);
                }
                (180, data)
            }
            _ => (255, vec![1]),
        }
    }
}

#[async_trait]
impl RocTransport for FakeRoc {
    async fn flush(&mut self) -> RocResult<()> {
        Ok(())
    }

    async fn write_all(&mut self, frame: &[u8]) -> RocResult<()> {
        self.stats.requests_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        self.outbox.clear();

        let crc = calculate_crc(&frame[..frame.len() - 2]);
        assert_eq!(crc.to_le_bytes(), frame[frame.len() - 2..], "request CRC");
        assert_eq!(frame[5] as usize, frame.len() - 8, "request length byte");

        let opcode = frame[4];
        let payload = frame[6..frame.len() - 2].to_vec();
        self.requests.push((opcode, payload.clone()));

        if self.silent {
            return Ok(());
        }

        let (reply_opcode, data) = self.handle(opcode, &payload);

        let roc = self.settings.roc_address.to_bytes();
        let host = self.settings.host_address.to_bytes();
        let mut reply = vec![host[0], host[1], roc[0], roc[1], reply_opcode, data.len() as u8];
        reply.extend_from_slice(&data);
        let mut crc = calculate_crc(&reply);

        for (rule_opcode, rule_payload, remaining) in self.fail_rules.iter_mut() {
            if *rule_opcode == opcode && *rule_payload == payload && *remaining > 0 {
                *remaining -= 1;
                crc ^= 0xFFFF;
            }
        }
        reply.extend_from_slice(&crc.to_le_bytes());

        self.outbox.extend(reply);
        Ok(())
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> RocResult<()> {
        let available = self.outbox.len().min(buf.len());
        for byte in buf.iter_mut().take(available) {
            *byte = self.outbox.pop_front().unwrap();
        }
        self.stats.bytes_received += available as u64;
        if available < buf.len() {
            return Err(RocError::short_read(buf.len(), available));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn close(&mut self) -> RocResult<()> {
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

fn settings() -> DeviceSettings {
    DeviceSettings::default()
}

fn history_parameters() -> Vec<ParameterSpec> {
    vec![
        ParameterSpec::new("pressure", PointRef::new(10, 0, 3), ValueType::Float),
        ParameterSpec::new("flow", PointRef::new(10, 0, 5), ValueType::Float),
        ParameterSpec::new("temperature", PointRef::new(10, 0, 4), ValueType::Int16),
    ]
}

fn history_request(point: u8, count: u8, index: i16) -> Vec<u8> {
    let index = index.to_le_bytes();
    vec![0, point, count, index[0], index[1]]
}

#[tokio::test]
async fn test_pointers_and_archive_table() {
    let mut master = RocMaster::new(FakeRoc::new());

    let pointers = master.get_history_pointers(&settings()).await.unwrap();
    assert_eq!(pointers.alarm_log_pointer, 10);
    assert_eq!(pointers.event_log_pointer, 77);
    assert_eq!(pointers.daily_history_logs_count, 35);

    let params = master.get_history_params(&settings()).await.unwrap();
    assert_eq!(params.len(), 45);
    let used: Vec<_> = params.iter().filter(|p| !p.is_unused()).collect();
    assert_eq!(used.len(), 3);
    assert!(used[1].archives(PointRef::new(10, 0, 4)));

    let blocks = master.transport().requests_for(167);
    assert_eq!(blocks, vec![vec![8, 0, 60, 0], vec![8, 1, 60, 0], vec![8, 2, 60, 0]]);
}

#[tokio::test]
async fn test_parameters_against_device() {
    let mut master = RocMaster::new(FakeRoc::new());
    let specs = vec![
        ParameterSpec::new("pressure", PointRef::new(10, 0, 3), ValueType::Float),
        ParameterSpec::new("temperature", PointRef::new(10, 0, 4), ValueType::Float),
        ParameterSpec::new("density", PointRef::new(10, 0, 7), ValueType::Float)
            .with_byte_order("3210".parse().unwrap()),
        ParameterSpec::new("station", PointRef::new(15, 0, 0), ValueType::Ascii).with_length(10),
        ParameterSpec::new("mode", PointRef::new(12, 0, 8), ValueType::Int16),
    ];

    let values = master.get_parameters(&settings(), &specs).await.unwrap();
    let names: Vec<_> = values.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["pressure", "temperature", "density", "station", "mode"]);
    assert_eq!(values[0].1, Value::Float(812.5));
    assert_eq!(values[1].1, Value::Infinite);
    assert_eq!(values[2].1, Value::Float(42.25));
    assert_eq!(values[3].1, Value::Ascii("ROC809".to_string()));
    assert_eq!(values[4].1, Value::Int16(7));

    let single: f32 = master
        .get_parameter(&settings(), PointRef::new(10, 0, 3), None)
        .await
        .unwrap();
    assert_eq!(single, 812.5);
}

#[tokio::test]
async fn test_unknown_parameter_rejected_by_device() {
    let mut master = RocMaster::new(FakeRoc::new());
    let specs = vec![ParameterSpec::new("missing", PointRef::new(99, 0, 0), ValueType::Float)];

    let err = master.get_parameters(&settings(), &specs).await.unwrap_err();
    assert_eq!(err, RocError::device_rejected(180));
}

#[tokio::test]
async fn test_silent_device_is_short_header() {
    let mut fake = FakeRoc::new();
    fake.silent = true;
    let mut master = RocMaster::new(fake);

    let err = master.get_history_pointers(&settings()).await.unwrap_err();
    assert_eq!(err, RocError::short_header(6, 0));
    assert!(err.is_framing_error());
}

#[tokio::test]
async fn test_history_timestamps_single_page() {
    let fake = FakeRoc::new();
    let expected: Vec<_> = (100..105).map(|slot| fake.timestamp_of(slot)).collect();
    let mut master = RocMaster::new(fake);

    let timestamps = master
        .get_history_date_times(&settings(), 0, 5, 100)
        .await
        .unwrap();
    assert_eq!(timestamps, expected);

    let values: Vec<f32> = master.get_history_values(&settings(), 0, 0, 5, 100).await.unwrap();
    assert_eq!(values, vec![200.0, 201.0, 202.0, 203.0, 204.0]);
}

#[tokio::test]
async fn test_hourly_history_wraps_index_space() {
    let fake = FakeRoc::new();
    let expected_times: Vec<_> = (830..840).chain(0..10).map(|slot| fake.timestamp_of(slot)).collect();
    let mut master = RocMaster::new(fake);

    let outcome = master
        .get_histories(&settings(), HistoryKind::Hourly, &history_parameters(), 830, 10, false)
        .await
        .unwrap()
        .collect()
        .await;

    assert!(!outcome.truncated);
    assert_eq!(outcome.len(), 40);

    let pressure: Vec<_> = outcome.items.iter().filter(|e| e.name == "pressure").collect();
    let temperature: Vec<_> = outcome.items.iter().filter(|e| e.name == "temperature").collect();
    assert_eq!(pressure.len(), 20);
    assert_eq!(temperature.len(), 20);
    assert!(outcome.items.iter().all(|e| e.name != "flow"));

    assert_eq!(pressure[0].value, Value::Float(930.0));
    assert_eq!(pressure[10].value, Value::Float(100.0));
    assert_eq!(temperature[0].value, Value::Int16(830));
    assert_eq!(temperature[19].value, Value::Int16(9));

    let times: Vec<_> = pressure.iter().map(|e| e.timestamp).collect();
    assert_eq!(times, expected_times);
    assert!(times.windows(2).all(|w| w[0] < w[1]));

    // one page: timestamps then one column per archived parameter
    let reads = master.transport().requests_for(130);
    assert_eq!(
        reads,
        vec![
            history_request(TIMESTAMP_POINT, 20, 830),
            history_request(0, 20, 830),
            history_request(1, 20, 830),
        ]
    );
}

#[tokio::test]
async fn test_hourly_history_pages_of_sixty() {
    let mut master = RocMaster::new(FakeRoc::new());
    let parameters = vec![ParameterSpec::new("energy", PointRef::new(10, 0, 6), ValueType::Float)];

    let outcome = master
        .get_histories(&settings(), HistoryKind::Hourly, &parameters, 0, 130, false)
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(outcome.len(), 130);
    assert_eq!(outcome.items[129].value, Value::Float(300.0 + 129.0));

    let timestamp_reads: Vec<_> = master
        .transport()
        .requests_for(130)
        .into_iter()
        .filter(|payload| payload[1] == TIMESTAMP_POINT)
        .collect();
    assert_eq!(
        timestamp_reads,
        vec![
            history_request(TIMESTAMP_POINT, 60, 0),
            history_request(TIMESTAMP_POINT, 60, 60),
            history_request(TIMESTAMP_POINT, 10, 120),
        ]
    );
}

#[tokio::test]
async fn test_full_hourly_read_is_capped() {
    let mut fake = FakeRoc::new();
    fake.hourly_days = 50;
    let mut master = RocMaster::new(fake);
    let parameters = vec![ParameterSpec::new("pressure", PointRef::new(10, 0, 3), ValueType::Float)];

    let stream = master
        .get_histories(&settings(), HistoryKind::Hourly, &parameters, 10, 10, true)
        .await
        .unwrap();
    assert_eq!(stream.total_records(), 840);

    let outcome = stream.collect().await;
    assert_eq!(outcome.len(), 840);
    assert_eq!(master.transport().requests_for(130).len(), 28);
}

#[tokio::test]
async fn test_empty_hourly_span() {
    let mut master = RocMaster::new(FakeRoc::new());

    let outcome = master
        .get_histories(&settings(), HistoryKind::Hourly, &history_parameters(), 10, 10, false)
        .await
        .unwrap()
        .collect()
        .await;
    assert!(outcome.is_empty());
    assert!(!outcome.truncated);
    assert!(master.transport().requests_for(130).is_empty());
}

#[tokio::test]
async fn test_daily_history_uses_daily_index_space() {
    let fake = FakeRoc::new();
    let expected_times: Vec<_> = (30..35).chain(0..2).map(|slot| fake.timestamp_of(840 + slot)).collect();
    let mut master = RocMaster::new(fake);

    let outcome = master
        .get_histories(&settings(), HistoryKind::Daily, &history_parameters(), 30, 2, false)
        .await
        .unwrap()
        .collect()
        .await;

    assert!(!outcome.truncated);
    assert_eq!(outcome.len(), 14);

    let pressure: Vec<_> = outcome.items.iter().filter(|e| e.name == "pressure").collect();
    assert_eq!(pressure.len(), 7);
    assert_eq!(pressure[0].value, Value::Float(100.0 + 870.0));
    assert_eq!(pressure[5].value, Value::Float(100.0 + 840.0));
    let times: Vec<_> = pressure.iter().map(|e| e.timestamp).collect();
    assert_eq!(times, expected_times);

    // timestamps are read once, right before the first archived column
    let reads = master.transport().requests_for(130);
    assert_eq!(
        reads,
        vec![
            history_request(TIMESTAMP_POINT, 7, 870),
            history_request(0, 7, 870),
            history_request(1, 7, 870),
        ]
    );
}

#[tokio::test]
async fn test_history_index_validation() {
    let mut master = RocMaster::new(FakeRoc::new());
    let parameters = history_parameters();

    let hourly = master
        .get_histories(&settings(), HistoryKind::Hourly, &parameters, 0, 840, false)
        .await;
    assert!(matches!(hourly, Err(RocError::IndexRange { .. })));

    let daily = master
        .get_histories(&settings(), HistoryKind::Daily, &parameters, 0, 35, false)
        .await;
    assert!(matches!(daily, Err(RocError::IndexRange { .. })));

    let negative = master
        .get_histories(&settings(), HistoryKind::Daily, &parameters, -1, 3, false)
        .await;
    assert!(matches!(negative, Err(RocError::IndexRange { .. })));
}

#[tokio::test]
async fn test_history_rejects_non_history_types() {
    let mut master = RocMaster::new(FakeRoc::new());
    let parameters = vec![ParameterSpec::new("total", PointRef::new(10, 0, 3), ValueType::Double)];

    let result = master
        .get_histories(&settings(), HistoryKind::Hourly, &parameters, 0, 10, false)
        .await;
    assert!(matches!(result, Err(RocError::UnknownValueType { .. })));
    assert!(master.transport().requests.is_empty());
}

#[tokio::test]
async fn test_history_truncated_after_retries() {
    voltage_roc::utils::logging::init_test_logger();
    let fake = FakeRoc::new().fail(130, &history_request(0, 60, 60), usize::MAX);
    let mut master = RocMaster::new(fake);
    let parameters = vec![ParameterSpec::new("pressure", PointRef::new(10, 0, 3), ValueType::Float)];

    let outcome = master
        .get_histories(&settings(), HistoryKind::Hourly, &parameters, 0, 130, false)
        .await
        .unwrap()
        .collect()
        .await;

    assert!(outcome.truncated);
    assert_eq!(outcome.len(), 60);

    let failing = master
        .transport()
        .requests_for(130)
        .into_iter()
        .filter(|payload| *payload == history_request(0, 60, 60))
        .count();
    assert_eq!(failing, 2);
}

#[tokio::test]
async fn test_history_retry_recovers() {
    let fake = FakeRoc::new().fail(130, &history_request(TIMESTAMP_POINT, 60, 60), 1);
    let mut master = RocMaster::new(fake);
    let parameters = vec![ParameterSpec::new("pressure", PointRef::new(10, 0, 3), ValueType::Float)];

    let outcome = master
        .get_histories(&settings(), HistoryKind::Hourly, &parameters, 0, 130, false)
        .await
        .unwrap()
        .collect()
        .await;

    assert!(!outcome.truncated);
    assert_eq!(outcome.len(), 130);
}

#[tokio::test]
async fn test_history_cancellation() {
    let mut master = RocMaster::new(FakeRoc::new());
    let token = master.cancellation_token();
    let parameters = vec![ParameterSpec::new("pressure", PointRef::new(10, 0, 3), ValueType::Float)];

    let mut stream = master
        .get_histories(&settings(), HistoryKind::Hourly, &parameters, 0, 130, false)
        .await
        .unwrap();

    assert!(stream.next().await.is_item());
    token.cancel();

    // the page already read is still delivered, nothing more is requested
    let mut rest = 0;
    loop {
        match stream.next().await {
            StreamStep::Item(_) => rest += 1,
            StreamStep::Done => break,
            StreamStep::Truncated => panic!("cancellation is not truncation"),
        }
    }
    assert_eq!(rest, 59);
    assert_eq!(master.transport().requests_for(130).len(), 2);
}

#[tokio::test]
async fn test_history_into_stream() {
    let mut master = RocMaster::new(FakeRoc::new());
    let parameters = vec![ParameterSpec::new("temperature", PointRef::new(10, 0, 4), ValueType::Int16)];

    let entries: Vec<HistoryEntry> = master
        .get_histories(&settings(), HistoryKind::Hourly, &parameters, 100, 105, false)
        .await
        .unwrap()
        .into_stream()
        .collect()
        .await;

    let values: Vec<_> = entries.iter().map(|e| e.value.clone()).collect();
    assert_eq!(values, (100..105).map(Value::Int16).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_history_ignores_parameter_byte_order() {
    let mut master = RocMaster::new(FakeRoc::new());
    let parameters = vec![ParameterSpec::new("pressure", PointRef::new(10, 0, 3), ValueType::Float)
        .with_byte_order("3210".parse().unwrap())];

    let outcome = master
        .get_histories(&settings(), HistoryKind::Hourly, &parameters, 100, 102, false)
        .await
        .unwrap()
        .collect()
        .await;

    assert!(!outcome.truncated);
    let values: Vec<_> = outcome.items.iter().map(|e| e.value.clone()).collect();
    assert_eq!(values, vec![Value::Float(200.0), Value::Float(201.0)]);
}

#[tokio::test]
async fn test_alarm_wrap_across_ring_boundary() {
    let mut master = RocMaster::new(FakeRoc::new());

    let outcome = master.get_alarms(&settings(), 235, false).await.unwrap().collect().await;
    assert!(!outcome.truncated);
    assert_eq!(outcome.len(), 15);

    let tags: Vec<_> = outcome.items.iter().map(|a| a.tag.as_str()).collect();
    let expected: Vec<String> = (0..10).chain(235..240).map(|slot| format!("PT-{:03}", slot)).collect();
    assert_eq!(tags, expected);

    let first = &outcome.items[0];
    assert_eq!(first.description, "PT Sensor High Alarm");
    assert_eq!(first.set_or_clear, "Alarm Set");
    assert_eq!(outcome.items[1].set_or_clear, "Alarm Clear");
    assert_eq!(first.timestamp.year(), 2024);
    assert_eq!(first.timestamp.offset().local_minus_utc(), 5 * 3600);
    assert_eq!(outcome.items[14].value, 239.0 * 1.5);

    let reads = master.transport().requests_for(121);
    assert_eq!(reads, vec![vec![10, 0, 0], vec![5, 235, 0]]);
}

#[tokio::test]
async fn test_no_new_alarms() {
    let mut master = RocMaster::new(FakeRoc::new());

    let outcome = master.get_alarms(&settings(), 10, false).await.unwrap().collect().await;
    assert!(outcome.is_empty());
    assert!(!outcome.truncated);
    assert!(master.transport().requests_for(121).is_empty());
}

#[tokio::test]
async fn test_alarm_full_read_covers_ring() {
    let mut master = RocMaster::new(FakeRoc::new());

    let outcome = master.get_alarms(&settings(), 100, true).await.unwrap().collect().await;
    assert_eq!(outcome.len(), 240);
    assert_eq!(master.transport().requests_for(121).len(), 24);
}

#[tokio::test]
async fn test_alarm_stream_truncated() {
    voltage_roc::utils::logging::init_test_logger();
    let fake = FakeRoc::new().fail(121, &[5, 235, 0], usize::MAX);
    let mut master = RocMaster::new(fake).with_retry_attempts(3);

    let outcome = master.get_alarms(&settings(), 235, false).await.unwrap().collect().await;
    assert!(outcome.truncated);
    assert_eq!(outcome.len(), 10);
    assert_eq!(master.transport().requests_for(121).len(), 4);
}

#[tokio::test]
async fn test_alarm_with_invalid_date_truncates() {
    voltage_roc::utils::logging::init_test_logger();
    let mut fake = FakeRoc::new();
    // 31 February
    fake.alarms[5][5] = 31;
    fake.alarms[5][6] = 2;
    let mut master = RocMaster::new(fake);

    let outcome = master.get_alarms(&settings(), 235, false).await.unwrap().collect().await;
    assert!(outcome.truncated);
    assert!(outcome.is_empty());

    // the chunk holding the bad record is retried, the older chunk is never read
    assert_eq!(master.transport().requests_for(121), vec![vec![10, 0, 0], vec![10, 0, 0]]);
}

#[tokio::test]
async fn test_alarm_pointer_validation() {
    let mut master = RocMaster::new(FakeRoc::new());
    let result = master.get_alarms(&settings(), 240, false).await;
    assert!(matches!(result, Err(RocError::IndexRange { .. })));
}

#[tokio::test]
async fn test_alarm_cancellation() {
    let mut master = RocMaster::new(FakeRoc::new());
    let token = master.cancellation_token();

    let mut alarms = master.get_alarms(&settings(), 235, false).await.unwrap();
    assert!(alarms.next().await.is_item());
    token.cancel();
    assert_eq!(alarms.next().await, StreamStep::Done);
}

#[tokio::test]
async fn test_master_from_config() {
    let config = RocConfig::from_yaml_str(
        "transport: { type: tcp, address: 127.0.0.1:4000 }\nretry_attempts: 1\nutc_offset_hours: 3\n",
    )
    .unwrap();
    let fake = FakeRoc::new().fail(121, &[10, 0, 0], 1);
    let mut master = RocMaster::from_config(fake, &config).unwrap();
    assert_eq!(master.retry_attempts(), 1);
    assert_eq!(master.utc_offset().local_minus_utc(), 3 * 3600);

    // a single failure is enough to truncate with one attempt
    let outcome = master.get_alarms(&settings(), 235, false).await.unwrap().collect().await;
    assert!(outcome.truncated);
    assert!(outcome.is_empty());
    assert_eq!(master.get_stats().requests_sent, 2);
}
