//! Segment result type and the internal time range currency

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A contiguous interval classified as one activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub start: DateTime<Utc>,
    /// Absent while the segment is ongoing
    pub end: Option<DateTime<Utc>>,
    pub duration_seconds: i32,
    pub is_ongoing: bool,
    pub started_before_range: bool,
}

fn whole_seconds(d: Duration) -> i32 {
    i32::try_from(d.num_seconds()).unwrap_or(i32::MAX)
}

impl Segment {
    /// Finished segment; `None` unless `end > start`
    pub fn closed(start: DateTime<Utc>, end: DateTime<Utc>, started_before_range: bool) -> Option<Self> {
        (end > start).then(|| Self {
            start,
            end: Some(end),
            duration_seconds: whole_seconds(end - start),
            is_ongoing: false,
            started_before_range,
        })
    }

    /// Segment still in progress at the end of the query window
    pub fn ongoing(start: DateTime<Utc>, query_to: DateTime<Utc>, started_before_range: bool) -> Self {
        Self {
            start,
            end: None,
            duration_seconds: whole_seconds(query_to - start),
            is_ongoing: true,
            started_before_range,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_seconds as i64)
    }
}

/// Half-open style interval used by detectors before results are built
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}
