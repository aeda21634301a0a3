use std::sync::Mutex;
use std::time::Instant;

use chrono::{Local, NaiveDate, Utc};

/// Epoch values above this are treated as milliseconds.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Server time estimate anchored on the most recent sync.
///
/// `now_ms()` is the remote timestamp captured at the last sync plus the
/// monotonic time elapsed since then, so it never jumps backwards between
/// syncs even when the local wall clock does. Before the first sync it falls
/// back to local wall-clock time.
#[derive(Debug, Default)]
pub struct ServerClock {
    anchor: Mutex<Option<(i64, Instant)>>,
}

impl ServerClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sync(&self, remote_ms: i64) {
        if remote_ms <= 0 {
            return;
        }
        let mut anchor = match self.anchor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *anchor = Some((remote_ms, Instant::now()));
    }

    pub fn is_synced(&self) -> bool {
        self.anchor_value().is_some()
    }

    pub fn now_ms(&self) -> i64 {
        match self.anchor_value() {
            Some((remote_ms, captured_at)) => {
                let elapsed = i64::try_from(captured_at.elapsed().as_millis()).unwrap_or(i64::MAX);
                remote_ms.saturating_add(elapsed)
            }
            None => Utc::now().timestamp_millis(),
        }
    }

    pub fn now_sec(&self) -> i64 {
        self.now_ms() / 1000
    }

    /// Local calendar date used for daily quota rollover.
    pub fn local_date(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn anchor_value(&self) -> Option<(i64, Instant)> {
        match self.anchor.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Normalises a server timestamp to whole seconds. Non-positive values mean
/// "not set" and map to 0.
pub fn to_time_sec(value: i64) -> i64 {
    if value <= 0 {
        0
    } else if value > MILLIS_THRESHOLD {
        value / 1000
    } else {
        value
    }
}
