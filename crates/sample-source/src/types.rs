//! Sample Value Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single numeric reading of one signal (RPM, fuel %, SoC %, odometer)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl LevelSample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Fixed-size bucket summarizing signal arrival counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Number of signal rows that arrived in the window
    pub signal_count: u64,
    /// Number of distinct signal names that arrived in the window
    pub distinct_signal_count: u64,
}

/// One transition of a boolean-like signal.
///
/// `prev_state` is `-1.0` when nothing is known about the state before
/// this transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    pub timestamp: DateTime<Utc>,
    pub new_state: f64,
    pub prev_state: f64,
}

impl StateChange {
    /// Prior state value used when no earlier reading exists
    pub const UNKNOWN_STATE: f64 = -1.0;

    pub fn is_on(&self) -> bool {
        self.new_state == 1.0
    }

    pub fn is_off(&self) -> bool {
        self.new_state == 0.0
    }

    pub fn prev_unknown(&self) -> bool {
        self.prev_state == Self::UNKNOWN_STATE
    }
}

/// Restricts windows to those whose values of one signal stay inside
/// `(min_exclusive, max_inclusive]`. Only rows of `signal` are counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueFilter {
    pub signal: String,
    pub min_exclusive: f64,
    pub max_inclusive: f64,
}

/// Parameters of a windowed count query
#[derive(Debug, Clone, PartialEq)]
pub struct WindowQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub window_seconds: i64,
    /// Windows with fewer rows are omitted
    pub min_signal_count: u64,
    /// Windows with fewer distinct signals are omitted
    pub min_distinct: Option<u64>,
    pub value_filter: Option<ValueFilter>,
}

impl WindowQuery {
    /// Query for every non-empty window of `window_seconds` in `[from, to)`
    pub fn all(from: DateTime<Utc>, to: DateTime<Utc>, window_seconds: i64) -> Self {
        Self {
            from,
            to,
            window_seconds,
            min_signal_count: 1,
            min_distinct: None,
            value_filter: None,
        }
    }

    pub fn with_min_signal_count(mut self, min_signal_count: u64) -> Self {
        self.min_signal_count = min_signal_count;
        self
    }

    pub fn with_min_distinct(mut self, min_distinct: u64) -> Self {
        self.min_distinct = Some(min_distinct);
        self
    }

    pub fn with_value_filter(mut self, filter: ValueFilter) -> Self {
        self.value_filter = Some(filter);
        self
    }
}

/// Raw signal row as stored for a vehicle token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRecord {
    pub token_id: u32,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl SignalRecord {
    pub fn new(token_id: u32, name: &str, timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            token_id,
            name: name.to_string(),
            timestamp,
            value,
        }
    }
}
