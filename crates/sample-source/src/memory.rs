//! In-Memory Sample Source
//!
//! Keeps raw signal rows in process and derives windows and state changes
//! from them the same way the external store does.

use crate::source::SampleSource;
use crate::types::{LevelSample, SignalRecord, StateChange, Window, WindowQuery};
use crate::SourceError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Per-window accumulator
#[derive(Default)]
struct Bucket<'a> {
    count: u64,
    names: BTreeSet<&'a str>,
    min: f64,
    max: f64,
}

/// Sample source backed by an in-memory record log
pub struct MemorySource {
    records: Mutex<Vec<SignalRecord>>,
}

impl MemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        info!("Creating in-memory sample source");
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// Create a source holding the given records
    pub fn with_records(records: Vec<SignalRecord>) -> Self {
        info!("Creating in-memory sample source with {} records", records.len());
        Self {
            records: Mutex::new(records),
        }
    }

    /// Load a JSON array of signal records
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path).await?;
        let records: Vec<SignalRecord> = serde_json::from_slice(&raw)?;
        info!("Loaded {} signal records from {}", records.len(), path.display());
        Ok(Self::with_records(records))
    }

    /// Append a single record
    pub fn insert(&self, record: SignalRecord) -> Result<(), SourceError> {
        self.lock()?.push(record);
        Ok(())
    }

    /// Append many records
    pub fn insert_many(
        &self,
        records: impl IntoIterator<Item = SignalRecord>,
    ) -> Result<(), SourceError> {
        self.lock()?.extend(records);
        Ok(())
    }

    /// Total number of stored records
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<SignalRecord>>, SourceError> {
        self.records
            .lock()
            .map_err(|e| SourceError::QueryFailed(format!("Lock error: {}", e)))
    }

    /// Rows of one token and signal, sorted by timestamp
    fn signal_rows(&self, token_id: u32, signal: &str) -> Result<Vec<(DateTime<Utc>, f64)>, SourceError> {
        let records = self.lock()?;
        let mut rows: Vec<_> = records
            .iter()
            .filter(|r| r.token_id == token_id && r.name == signal)
            .map(|r| (r.timestamp, r.value))
            .collect();
        rows.sort_by_key(|(ts, _)| *ts);
        Ok(rows)
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

fn bucket_start(ts: DateTime<Utc>, window_seconds: i64) -> i64 {
    ts.timestamp().div_euclid(window_seconds) * window_seconds
}

#[async_trait]
impl SampleSource for MemorySource {
    async fn level_samples(
        &self,
        token_id: u32,
        signal: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LevelSample>, SourceError> {
        let samples: Vec<_> = self
            .signal_rows(token_id, signal)?
            .into_iter()
            .filter(|(ts, _)| *ts >= from && *ts <= to)
            .map(|(ts, value)| LevelSample::new(ts, value))
            .collect();
        debug!("{} samples of {} for token {}", samples.len(), signal, token_id);
        Ok(samples)
    }

    async fn windowed_counts(
        &self,
        token_id: u32,
        query: &WindowQuery,
    ) -> Result<Vec<Window>, SourceError> {
        if query.window_seconds <= 0 {
            return Err(SourceError::InvalidQuery(format!(
                "window size must be positive, got {}",
                query.window_seconds
            )));
        }

        let records = self.lock()?;
        let mut buckets: BTreeMap<i64, Bucket<'_>> = BTreeMap::new();

        for record in records.iter() {
            if record.token_id != token_id
                || record.timestamp < query.from
                || record.timestamp >= query.to
            {
                continue;
            }
            if let Some(filter) = &query.value_filter {
                if record.name != filter.signal {
                    continue;
                }
            }

            let bucket = buckets
                .entry(bucket_start(record.timestamp, query.window_seconds))
                .or_insert_with(|| Bucket {
                    min: f64::MAX,
                    max: f64::MIN,
                    ..Default::default()
                });
            bucket.count += 1;
            bucket.names.insert(record.name.as_str());
            bucket.min = bucket.min.min(record.value);
            bucket.max = bucket.max.max(record.value);
        }

        let windows: Vec<Window> = buckets
            .into_iter()
            .filter(|(_, b)| b.count >= query.min_signal_count)
            .filter(|(_, b)| query.min_distinct.map_or(true, |d| b.names.len() as u64 >= d))
            .filter(|(_, b)| {
                query
                    .value_filter
                    .as_ref()
                    .map_or(true, |f| b.min > f.min_exclusive && b.max <= f.max_inclusive)
            })
            .filter_map(|(start, b)| {
                let window_start = DateTime::from_timestamp(start, 0)?;
                Some(Window {
                    window_start,
                    window_end: window_start + Duration::seconds(query.window_seconds),
                    signal_count: b.count,
                    distinct_signal_count: b.names.len() as u64,
                })
            })
            .collect();

        debug!("{} windows for token {}", windows.len(), token_id);
        Ok(windows)
    }

    async fn state_changes(
        &self,
        token_id: u32,
        signal: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StateChange>, SourceError> {
        let mut changes = Vec::new();
        let mut prev_state = StateChange::UNKNOWN_STATE;

        for (ts, value) in self.signal_rows(token_id, signal)? {
            if ts > to {
                break;
            }
            if value != prev_state && ts >= from {
                changes.push(StateChange {
                    timestamp: ts,
                    new_state: value,
                    prev_state,
                });
            }
            prev_state = value;
        }

        debug!("{} state changes of {} for token {}", changes.len(), signal, token_id);
        Ok(changes)
    }
}
