//! # History Log Retrieval
//!
//! The device archives up to 45 points. Each archived point is a column in two
//! circular logs that share one index space:
//!
//! - hourly records at indexes `0..=839`
//! - daily records at `840 + 0..daily_history_logs_count`
//!
//! A column is addressed by its position in the archived point table once the
//! unused slots are removed, so the table is read before any value.
//!
//! [`HistoryStream`] reads a range of records in pages of at most 60. Every
//! page reads its timestamps once and then one value column per requested
//! parameter, pairing the two by position.
//!
//! ```text
//!  hourly, from 830 to 10
//!
//!  ... 830 831 ... 839 | 0 1 ... 9 | 10
//!      \___________ 20 records ___/
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, TimeZone};
use futures::stream::{self, Stream};
use log::{debug, error};
use serde::Serialize;

use crate::error::{RocError, RocResult};
use crate::master::RocMaster;
use crate::protocol::{
    DeviceSettings, HistoryParams, DAILY_INDEX_BASE, HOURLY_INDEX_SPACE, MAX_HISTORY_RECORDS_PER_REQUEST,
};
use crate::stream::{with_retry, StreamOutcome, StreamStep};
use crate::transport::RocTransport;
use crate::value::{ParameterSpec, Value};

/// Type of history byte sent with every opcode 130 request
const TYPE_OF_HISTORY: u8 = 0;

/// Which circular log to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Daily,
    Hourly,
}

impl FromStr for HistoryKind {
    type Err = RocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(HistoryKind::Daily),
            "hourly" => Ok(HistoryKind::Hourly),
            other => Err(RocError::invalid_data(format!("unknown history kind '{}'", other))),
        }
    }
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryKind::Daily => f.write_str("daily"),
            HistoryKind::Hourly => f.write_str("hourly"),
        }
    }
}

/// Records between `from` and `to` in a ring of `space` slots
pub fn wrapped_distance(from: i16, to: i16, space: i16) -> i16 {
    if to < from {
        to + space - from
    } else {
        to - from
    }
}

/// Place a year-less history timestamp in time
///
/// The device stores minute, hour, day and month only. The record is taken
/// from the current year unless that date does not exist or lies after `now`,
/// in which case the previous year is used.
pub fn resolve_history_timestamp(
    minute: u8,
    hour: u8,
    day: u8,
    month: u8,
    now: DateTime<FixedOffset>,
) -> Option<DateTime<FixedOffset>> {
    let at = |year: i32| {
        now.offset()
            .with_ymd_and_hms(year, month as u32, day as u32, hour as u32, minute as u32, 0)
            .single()
    };

    match at(now.year()) {
        Some(timestamp) if timestamp <= now => Some(timestamp),
        _ => at(now.year() - 1),
    }
}

/// One archived value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<FixedOffset>,
    pub name: String,
    pub value: Value,
}

/// Requested parameter and its history point, if archived
#[derive(Debug, Clone)]
struct Column {
    spec: ParameterSpec,
    history_point: Option<u8>,
}

/// Page currently being read
#[derive(Debug)]
struct Page {
    count: u8,
    index: i16,
    timestamps: Option<Vec<DateTime<FixedOffset>>>,
    next_column: usize,
}

/// History log stream returned by [`RocMaster::get_histories`]
///
/// Pull with [`next`](HistoryStream::next), drain with
/// [`collect`](HistoryStream::collect) or adapt with
/// [`into_stream`](HistoryStream::into_stream). Cancellation is observed
/// before every page and every parameter.
pub struct HistoryStream<'a, T: RocTransport> {
    master: &'a mut RocMaster<T>,
    settings: DeviceSettings,
    kind: HistoryKind,
    columns: Vec<Column>,
    index: i16,
    total: usize,
    consumed: usize,
    page: Option<Page>,
    pending: VecDeque<HistoryEntry>,
    finished: Option<StreamStep<HistoryEntry>>,
}

impl<'a, T: RocTransport> HistoryStream<'a, T> {
    /// Read the archived point table and log pointers, validate the range and
    /// plan the pages
    pub(crate) async fn open(
        master: &'a mut RocMaster<T>,
        settings: &DeviceSettings,
        kind: HistoryKind,
        parameters: &[ParameterSpec],
        from_index: i16,
        to_index: i16,
        full_read: bool,
    ) -> RocResult<HistoryStream<'a, T>> {
        for spec in parameters {
            if !spec.value_type.is_history_type() {
                return Err(RocError::unknown_value_type(format!(
                    "{} (history parameter '{}')",
                    spec.value_type, spec.name
                )));
            }
        }

        let archived: Vec<HistoryParams> = master
            .get_history_params(settings)
            .await?
            .into_iter()
            .filter(|params| !params.is_unused())
            .collect();
        let pointers = master.get_history_pointers(settings).await?;

        let total = match kind {
            HistoryKind::Daily => {
                let logs = pointers.daily_history_logs_count as i16;
                if from_index < 0 || to_index >= logs {
                    return Err(RocError::index_range("daily", from_index as i32, to_index as i32, logs as i32 - 1));
                }
                let count = if full_read {
                    logs
                } else {
                    wrapped_distance(from_index, to_index, logs)
                };
                if count > MAX_HISTORY_RECORDS_PER_REQUEST as i16 {
                    return Err(RocError::index_range(
                        "daily",
                        from_index as i32,
                        to_index as i32,
                        MAX_HISTORY_RECORDS_PER_REQUEST as i32,
                    ));
                }
                count
            }
            HistoryKind::Hourly => {
                if from_index < 0 || to_index > HOURLY_INDEX_SPACE - 1 {
                    return Err(RocError::index_range(
                        "hourly",
                        from_index as i32,
                        to_index as i32,
                        HOURLY_INDEX_SPACE as i32 - 1,
                    ));
                }
                let count = if full_read {
                    pointers.hourly_history_logs_days as i16 * 24
                } else {
                    wrapped_distance(from_index, to_index, HOURLY_INDEX_SPACE)
                };
                count.min(HOURLY_INDEX_SPACE)
            }
        };

        let columns = parameters
            .iter()
            .map(|spec| Column {
                spec: spec.clone(),
                history_point: archived
                    .iter()
                    .position(|params| params.archives(spec.point_ref()))
                    .map(|position| position as u8),
            })
            .collect();

        debug!(
            "{} history: {} records from index {} ({} archived points on device)",
            kind,
            total,
            from_index,
            archived.len()
        );

        Ok(Self {
            master,
            settings: *settings,
            kind,
            columns,
            index: from_index,
            total: total.max(0) as usize,
            consumed: 0,
            page: None,
            pending: VecDeque::new(),
            finished: None,
        })
    }

    pub fn kind(&self) -> HistoryKind {
        self.kind
    }

    /// Records per column this stream will read
    pub fn total_records(&self) -> usize {
        self.total
    }

    /// Pull the next history entry
    pub async fn next(&mut self) -> StreamStep<HistoryEntry> {
        loop {
            if let Some(step) = &self.finished {
                return step.clone();
            }
            if let Some(entry) = self.pending.pop_front() {
                return StreamStep::Item(entry);
            }
            self.advance().await;
        }
    }

    /// Do one unit of work: open a page, read one column or close a page
    async fn advance(&mut self) {
        if self.master.is_cancelled() {
            debug!("{} history cancelled after {} records", self.kind, self.consumed);
            self.finished = Some(StreamStep::Done);
            return;
        }

        if self.page.is_none() {
            self.open_page().await;
            return;
        }
        let Some(page) = self.page.as_mut() else {
            return;
        };

        if page.next_column >= self.columns.len() {
            let count = page.count;
            self.page = None;
            self.consumed += count as usize;
            self.index += count as i16;
            if self.index >= HOURLY_INDEX_SPACE {
                self.index -= HOURLY_INDEX_SPACE;
            }
            return;
        }

        let column = self.columns[page.next_column].clone();
        page.next_column += 1;
        let (count, index, have_timestamps) = (page.count, page.index, page.timestamps.is_some());

        let Some(history_point) = column.history_point else {
            error!(
                "Parameter '{}' {} is not archived, skipping",
                column.spec.name,
                column.spec.point_ref()
            );
            return;
        };

        if !have_timestamps {
            let Some(timestamps) = self.read_timestamps(count, index).await else {
                return;
            };
            if let Some(page) = self.page.as_mut() {
                page.timestamps = Some(timestamps);
            }
        }

        let attempts = self.master.retry_attempts();
        let settings = self.settings;
        let values = with_retry!(
            attempts,
            format!("{} history '{}' ({} @ {})", self.kind, column.spec.name, count, index),
            self.master
                .read_history_column(&settings, &column.spec, history_point, count, index)
        );
        let Some(values) = values else {
            self.truncate(format!("column '{}' ({} @ {})", column.spec.name, count, index), attempts);
            return;
        };

        let timestamps = self.page.as_ref().and_then(|page| page.timestamps.as_deref()).unwrap_or(&[]);
        let entries = timestamps.iter().zip(values).map(|(timestamp, value)| HistoryEntry {
            timestamp: *timestamp,
            name: column.spec.name.clone(),
            value,
        });
        self.pending.extend(entries);
    }

    /// Start the next page, or finish when every record was read
    async fn open_page(&mut self) {
        if self.consumed >= self.total {
            self.finished = Some(StreamStep::Done);
            return;
        }

        let remaining = self.total - self.consumed;
        let count = remaining.min(MAX_HISTORY_RECORDS_PER_REQUEST as usize) as u8;
        let index = match self.kind {
            HistoryKind::Daily => self.index + DAILY_INDEX_BASE,
            HistoryKind::Hourly => self.index,
        };

        // daily pages read timestamps only once an archived column needs them
        let timestamps = match self.kind {
            HistoryKind::Daily => None,
            HistoryKind::Hourly => match self.read_timestamps(count, index).await {
                Some(timestamps) => Some(timestamps),
                None => return,
            },
        };

        self.page = Some(Page {
            count,
            index,
            timestamps,
            next_column: 0,
        });
    }

    async fn read_timestamps(&mut self, count: u8, index: i16) -> Option<Vec<DateTime<FixedOffset>>> {
        let attempts = self.master.retry_attempts();
        let settings = self.settings;
        let timestamps = with_retry!(
            attempts,
            format!("{} history timestamps ({} @ {})", self.kind, count, index),
            self.master.get_history_date_times(&settings, TYPE_OF_HISTORY, count, index)
        );

        if timestamps.is_none() {
            self.truncate(format!("timestamps ({} @ {})", count, index), attempts);
        }
        timestamps
    }

    fn truncate(&mut self, what: String, attempts: usize) {
        error!(
            "{} history truncated: {} failed {} times, {} of {} records read",
            self.kind, what, attempts, self.consumed, self.total
        );
        self.finished = Some(StreamStep::Truncated);
    }

    /// Drain the stream
    pub async fn collect(mut self) -> StreamOutcome<HistoryEntry> {
        let mut outcome = StreamOutcome::default();
        loop {
            match self.next().await {
                StreamStep::Item(entry) => outcome.items.push(entry),
                StreamStep::Done => return outcome,
                StreamStep::Truncated => {
                    outcome.truncated = true;
                    return outcome;
                }
            }
        }
    }

    /// Adapt into a `futures::Stream`; the truncation flag is dropped
    pub fn into_stream(self) -> impl Stream<Item = HistoryEntry> + 'a
    where
        T: 'a,
    {
        stream::unfold(self, |mut history| async move {
            history.next().await.into_item().map(|entry| (entry, history))
        })
    }
}
