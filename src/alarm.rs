//! # Alarm Log Retrieval
//!
//! The device keeps alarms in a ring of 240 slots. The alarm log pointer from
//! opcode 120 names the slot the next alarm will be written to, so the new
//! alarms since a previous poll are the slots between the caller's last seen
//! pointer and the current one, possibly crossing the 239/0 boundary.
//!
//! [`AlarmStream`] walks that span backwards from the current pointer in
//! chunks of at most 10 records (the opcode 121 ceiling):
//!
//! ```text
//!  last = 235                       current = 10
//!      |                                 |
//!  ... 235 236 237 238 239 | 0 1 2 ... 9 | 10 ...
//!      \___ chunk 2 (5) ___/ \_ chunk 1 (10) _/
//! ```
//!
//! With `full_read` the walk goes once around the whole ring.
//!
//! ## Decoding
//!
//! The alarm type byte carries the point category in its high nibble and
//! set/clear in its low nibble. The alarm code byte is read against the
//! category, since categories reuse the same code numbers for different
//! conditions.

use std::collections::VecDeque;

use chrono::{DateTime, FixedOffset, TimeZone};
use futures::stream::{self, Stream};
use log::{debug, error};
use serde::Serialize;

use crate::error::{RocError, RocResult};
use crate::master::RocMaster;
use crate::protocol::{AlarmRecord, DeviceSettings, ALARM_LOG_SIZE, MAX_ALARMS_PER_REQUEST};
use crate::stream::{with_retry, StreamOutcome, StreamStep};
use crate::transport::RocTransport;
use crate::utils::validation;

/// Caller-facing decoded alarm
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmResult {
    pub timestamp: DateTime<FixedOffset>,
    pub tag: String,
    /// `"Alarm Set"` or `"Alarm Clear"`
    pub set_or_clear: String,
    pub value: f32,
    /// Point category and condition, e.g. `"PT Sensor High Alarm"`
    pub description: String,
}

/// Split the alarm type byte into (category, set/clear) nibbles
pub fn alarm_type_nibbles(alarm_type: u8) -> (u8, u8) {
    (alarm_type >> 4, alarm_type & 0x0F)
}

/// Category and set/clear text of an alarm type byte
pub fn alarm_type_text(alarm_type: u8) -> (String, String) {
    let (high, low) = alarm_type_nibbles(alarm_type);

    let category = match high {
        1 => "DP Sensor".to_string(),
        2 => "SP Sensor".to_string(),
        3 => "PT Sensor".to_string(),
        5 => "I/O point (AIs, DIs, PIs, and AOs)".to_string(),
        6 => "Meter run".to_string(),
        7 => "User Text".to_string(),
        8 => "User Value".to_string(),
        9 => "Integral Sensor".to_string(),
        _ => format!("Unknown code: {}", high),
    };

    let set_or_clear = match low {
        0 => "Alarm Clear".to_string(),
        1 => "Alarm Set".to_string(),
        _ => format!("Unknown code: {}", low),
    };

    (category, set_or_clear)
}

/// Condition text of an alarm code, read against the type's category
pub fn alarm_code_text(alarm_type: u8, alarm_code: u8) -> String {
    let (high, _) = alarm_type_nibbles(alarm_type);

    let known = match high {
        1 | 2 | 3 | 5 => match alarm_code {
            0 => Some("Low Alarm"),
            1 => Some("Lo Lo Alarm"),
            2 => Some("High Alarm"),
            3 => Some("Hi Hi Alarm"),
            4 => Some("Rate Alarm"),
            5 => Some("Status Change"),
            6 => Some("Point Fail"),
            7 => Some("Override Mode"),
            _ => None,
        },
        6 => match alarm_code {
            0 => Some("Low Alarm"),
            2 => Some("High Alarm"),
            6 => Some("No Flow Alarm"),
            7 => Some("Manual Mode"),
            _ => None,
        },
        9 => match alarm_code {
            4 => Some("Input Freeze Mode (Calibration in progress)"),
            6 => Some("Sensor Communications Fail Alarm"),
            7 => Some("Scanning disabled"),
            _ => None,
        },
        _ => return format!("Unknown alarm type: {}", high),
    };

    match known {
        Some(text) => text.to_string(),
        None => format!("Unknown alarm code: {}", alarm_code),
    }
}

/// Decode a raw record into an [`AlarmResult`]
///
/// The stored two digit year is taken as `2000 + year`; the record time is in
/// the device's fixed UTC offset.
pub fn decode_alarm(record: &AlarmRecord, offset: FixedOffset) -> RocResult<AlarmResult> {
    let timestamp = offset
        .with_ymd_and_hms(
            2000 + record.year as i32,
            record.month as u32,
            record.day as u32,
            record.hours as u32,
            record.minutes as u32,
            record.seconds as u32,
        )
        .single()
        .ok_or_else(|| {
            RocError::invalid_data(format!(
                "invalid alarm timestamp 20{:02}-{:02}-{:02} {:02}:{:02}:{:02}",
                record.year, record.month, record.day, record.hours, record.minutes, record.seconds
            ))
        })?;

    let (category, set_or_clear) = alarm_type_text(record.alarm_type);
    let condition = alarm_code_text(record.alarm_type, record.alarm_code);

    Ok(AlarmResult {
        timestamp,
        tag: record.tag.clone(),
        set_or_clear,
        value: record.value,
        description: format!("{} {}", category, condition),
    })
}

/// Pointer arithmetic of the backward ring walk
///
/// Kept apart from I/O so the chunk sequence can be checked on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmWalk {
    read_pointer: i16,
    last_point: i16,
    end_point: i16,
    full_read: bool,
    first: bool,
    finished: bool,
}

impl AlarmWalk {
    /// Start a walk from `current` back to `last_point`
    ///
    /// Returns `None` when there is nothing new (`current == last_point`).
    pub fn new(current: i16, last_point: i16, full_read: bool) -> Option<Self> {
        if current == last_point {
            return None;
        }
        Some(Self {
            read_pointer: current,
            last_point,
            end_point: if full_read { current } else { last_point },
            full_read,
            first: true,
            finished: false,
        })
    }

    /// Next `(count, starting pointer)` request, or `None` once the walk
    /// reached its end point
    pub fn next_chunk(&mut self) -> Option<(u8, i16)> {
        if self.finished {
            return None;
        }

        let mut count = MAX_ALARMS_PER_REQUEST as i16;
        if !self.full_read {
            let fix = if self.first && self.read_pointer < self.last_point {
                self.last_point - ALARM_LOG_SIZE
            } else {
                self.last_point
            };

            count = if self.read_pointer - fix < MAX_ALARMS_PER_REQUEST as i16 {
                self.read_pointer - self.last_point
            } else {
                MAX_ALARMS_PER_REQUEST as i16
            };
            if count < 0 {
                count += ALARM_LOG_SIZE;
            }
        }

        self.read_pointer -= count;
        if self.read_pointer < 0 {
            self.read_pointer += ALARM_LOG_SIZE;
            self.first = false;
        }

        if self.read_pointer == self.end_point {
            self.finished = true;
        }

        Some((count as u8, self.read_pointer))
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Alarm log stream returned by [`RocMaster::get_alarms`]
///
/// Each chunk read is retried up to the master's retry budget; when that is
/// exhausted the stream ends with [`StreamStep::Truncated`].
pub struct AlarmStream<'a, T: RocTransport> {
    master: &'a mut RocMaster<T>,
    settings: DeviceSettings,
    walk: Option<AlarmWalk>,
    pending: VecDeque<AlarmResult>,
    finished: Option<StreamStep<AlarmResult>>,
}

impl<'a, T: RocTransport> AlarmStream<'a, T> {
    /// Read the current alarm pointer and set up the walk
    pub(crate) async fn open(
        master: &'a mut RocMaster<T>,
        settings: &DeviceSettings,
        last_point: i16,
        full_read: bool,
    ) -> RocResult<AlarmStream<'a, T>> {
        validation::validate_alarm_pointer(last_point)?;

        let pointers = master.get_history_pointers(settings).await?;
        let current = pointers.alarm_log_pointer;
        validation::validate_alarm_pointer(current)?;

        let walk = AlarmWalk::new(current, last_point, full_read);
        match &walk {
            Some(_) => debug!("Alarm walk from {} back to {} (full: {})", current, last_point, full_read),
            None => debug!("No new alarms, pointer still at {}", current),
        }

        Ok(Self {
            master,
            settings: *settings,
            walk,
            pending: VecDeque::new(),
            finished: None,
        })
    }

    /// Pull the next alarm
    pub async fn next(&mut self) -> StreamStep<AlarmResult> {
        loop {
            if let Some(step) = &self.finished {
                return step.clone();
            }

            if let Some(alarm) = self.pending.pop_front() {
                if self.master.is_cancelled() {
                    self.finished = Some(StreamStep::Done);
                    continue;
                }
                return StreamStep::Item(alarm);
            }

            self.advance().await;
        }
    }

    async fn advance(&mut self) {
        if self.master.is_cancelled() {
            self.finished = Some(StreamStep::Done);
            return;
        }

        let chunk = self.walk.as_mut().and_then(AlarmWalk::next_chunk);
        let Some((count, start)) = chunk else {
            self.finished = Some(StreamStep::Done);
            return;
        };

        let attempts = self.master.retry_attempts();
        let settings = self.settings;
        let alarms = with_retry!(
            attempts,
            format!("alarm read ({} @ {})", count, start),
            self.master.read_alarm_chunk(&settings, count, start)
        );

        let Some(alarms) = alarms else {
            error!("Alarm stream truncated: chunk ({} @ {}) failed {} times", count, start, attempts);
            self.finished = Some(StreamStep::Truncated);
            return;
        };

        self.pending.extend(alarms);
    }

    /// Drain the stream
    pub async fn collect(mut self) -> StreamOutcome<AlarmResult> {
        let mut outcome = StreamOutcome::default();
        loop {
            match self.next().await {
                StreamStep::Item(alarm) => outcome.items.push(alarm),
                StreamStep::Done => return outcome,
                StreamStep::Truncated => {
                    outcome.truncated = true;
                    return outcome;
                }
            }
        }
    }

    /// Adapt into a `futures::Stream`; the truncation flag is dropped
    pub fn into_stream(self) -> impl Stream<Item = AlarmResult> + 'a
    where
        T: 'a,
    {
        stream::unfold(self, |mut alarms| async move {
            alarms.next().await.into_item().map(|alarm| (alarm, alarms))
        })
    }
}
