//! Step and outcome types shared by the history and alarm streams.
//!
//! A streaming retrieval ends in one of two ways: cleanly, when every
//! requested record was produced or the caller cancelled, or truncated, when a
//! page read kept failing after the bounded retry. Both end the stream without
//! an error value; [`StreamStep`] keeps the two apart so callers can tell a
//! short stream from a complete one.

use serde::Serialize;

/// One pull from a retrieval stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamStep<T> {
    /// Next decoded item
    Item(T),
    /// Stream ended cleanly (exhausted or cancelled)
    Done,
    /// Stream ended early after retries were exhausted
    Truncated,
}

impl<T> StreamStep<T> {
    pub fn is_item(&self) -> bool {
        matches!(self, StreamStep::Item(_))
    }

    pub fn into_item(self) -> Option<T> {
        match self {
            StreamStep::Item(item) => Some(item),
            _ => None,
        }
    }
}

/// Everything a stream produced, plus how it ended
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamOutcome<T> {
    pub items: Vec<T>,
    pub truncated: bool,
}

impl<T> StreamOutcome<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for StreamOutcome<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            truncated: false,
        }
    }
}

/// Await `$op` up to `$attempts` times, yielding `Some(value)` on the first
/// success and `None` once every attempt failed.
///
/// `$op` is re-evaluated on each attempt, so it must build a fresh future.
macro_rules! with_retry {
    ($attempts:expr, $what:expr, $op:expr) => {{
        let attempts: usize = $attempts;
        let mut outcome = None;
        for attempt in 1..=attempts {
            match $op.await {
                Ok(value) => {
                    outcome = Some(value);
                    break;
                }
                Err(error) => {
                    log::warn!("{} failed (attempt {}/{}): {}", $what, attempt, attempts, error);
                }
            }
        }
        outcome
    }};
}

pub(crate) use with_retry;
