//! Shared fixtures for detector tests

use crate::segment::Segment;
use chrono::{DateTime, Duration, Utc};
use sample_source::{MemorySource, SignalRecord};
use std::sync::Arc;

/// Minute-aligned base instant (2023-11-14T22:13:00Z)
pub const BASE: i64 = 1_699_999_980;

pub const TOKEN: u32 = 42;

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(BASE + secs, 0).unwrap()
}

pub fn minutes(m: i64) -> i64 {
    m * 60
}

/// Records of one signal from `(offset seconds, value)` pairs
pub fn series(signal: &str, points: impl IntoIterator<Item = (i64, f64)>) -> Vec<SignalRecord> {
    points
        .into_iter()
        .map(|(secs, value)| SignalRecord::new(TOKEN, signal, at(secs), value))
        .collect()
}

pub fn source(records: Vec<SignalRecord>) -> Arc<MemorySource> {
    Arc::new(MemorySource::with_records(records))
}

/// Assert ordering, non-overlap, and duration consistency
pub fn assert_well_formed(segments: &[Segment], to: DateTime<Utc>) {
    for segment in segments {
        match segment.end {
            Some(end) => {
                assert!(!segment.is_ongoing);
                assert!(end > segment.start);
                assert_eq!(segment.duration_seconds as i64, (end - segment.start).num_seconds());
            }
            None => {
                assert!(segment.is_ongoing);
                assert_eq!(segment.duration_seconds as i64, (to - segment.start).num_seconds());
            }
        }
    }
    for pair in segments.windows(2) {
        assert!(pair[0].start < pair[1].start);
        let end = pair[0].end.expect("only the last segment may be ongoing");
        assert!(end <= pair[1].start);
    }
}

pub fn secs(d: i64) -> Duration {
    Duration::seconds(d)
}

/// Source whose every read fails
pub struct FailingSource;

#[async_trait::async_trait]
impl sample_source::SampleSource for FailingSource {
    async fn level_samples(
        &self,
        _token_id: u32,
        _signal: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<sample_source::LevelSample>, sample_source::SourceError> {
        Err(sample_source::SourceError::QueryFailed("connection refused".into()))
    }

    async fn windowed_counts(
        &self,
        _token_id: u32,
        _query: &sample_source::WindowQuery,
    ) -> Result<Vec<sample_source::Window>, sample_source::SourceError> {
        Err(sample_source::SourceError::QueryFailed("connection refused".into()))
    }

    async fn state_changes(
        &self,
        _token_id: u32,
        _signal: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<sample_source::StateChange>, sample_source::SourceError> {
        Err(sample_source::SourceError::QueryFailed("connection refused".into()))
    }
}
