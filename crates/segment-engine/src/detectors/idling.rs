//! Idle detection on engine speed

use super::frequency::{merge_window_runs, WINDOW_SECONDS};
use super::{SegmentDetector, ENGINE_SPEED_SIGNAL};
use crate::clock::Clock;
use crate::config::SegmentConfig;
use crate::segment::{Segment, TimeRange};
use crate::utils::{align_down, clip_ranges_ongoing, filter_min_duration, is_trailing_ongoing};
use crate::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sample_source::{LevelSample, SampleSource, ValueFilter, WindowQuery};
use std::sync::Arc;
use tracing::debug;

const DEFAULT_MAX_IDLE_RPM: f64 = 1000.0;
const DEFAULT_MAX_GAP_SECONDS: i64 = 300;
const DEFAULT_MIN_SEGMENT_SECONDS: i64 = 240;
/// RPM samples arrive a few times per minute, so a low bar per window
const DEFAULT_STATIC_SIGNAL_COUNT: u64 = 3;

/// Engine running but below the idle ceiling. Zero means the engine is off.
pub fn is_idle_rpm(rpm: f64, max_idle_rpm: f64) -> bool {
    rpm > 0.0 && rpm <= max_idle_rpm
}

/// Runs of consecutive idle samples, split by non-idle samples and by gaps
/// wider than `max_gap`
fn idle_runs(samples: &[LevelSample], max_idle_rpm: f64, max_gap: Duration) -> Vec<TimeRange> {
    let mut runs = Vec::new();
    let mut current: Option<TimeRange> = None;

    for sample in samples {
        if !is_idle_rpm(sample.value, max_idle_rpm) {
            runs.extend(current.take());
            continue;
        }

        let extends = current.is_some_and(|r| sample.timestamp - r.end <= max_gap);
        if extends {
            if let Some(run) = current.as_mut() {
                run.end = sample.timestamp;
            }
        } else {
            runs.extend(current.replace(TimeRange::new(sample.timestamp, sample.timestamp)));
        }
    }

    runs.extend(current);
    runs
}

/// Idling from exact engine-speed samples
pub struct IdlingDetector {
    source: Arc<dyn SampleSource>,
    clock: Arc<dyn Clock>,
}

impl IdlingDetector {
    pub fn new(source: Arc<dyn SampleSource>, clock: Arc<dyn Clock>) -> Self {
        Self { source, clock }
    }
}

#[async_trait]
impl SegmentDetector for IdlingDetector {
    async fn detect_segments(
        &self,
        token_id: u32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        config: &SegmentConfig,
    ) -> Result<Vec<Segment>, EngineError> {
        let max_idle_rpm = config.max_idle_rpm_or(DEFAULT_MAX_IDLE_RPM);
        let max_gap = config.max_gap(DEFAULT_MAX_GAP_SECONDS);
        let min_duration = config.min_segment_duration(DEFAULT_MIN_SEGMENT_SECONDS);

        let samples = self
            .source
            .level_samples(token_id, ENGINE_SPEED_SIGNAL, from - max_gap, to)
            .await
            .map_err(EngineError::samples)?;

        let mut runs = filter_min_duration(idle_runs(&samples, max_idle_rpm, max_gap), min_duration);
        runs.retain(|r| r.end > from);

        let still_idle = samples
            .last()
            .is_some_and(|s| is_idle_rpm(s.value, max_idle_rpm));
        let last_ongoing = still_idle
            && runs
                .last()
                .is_some_and(|r| is_trailing_ongoing(r.end, to, self.clock.now(), max_gap));

        let mut segments = clip_ranges_ongoing(&runs, from, to, last_ongoing);
        segments.retain(|s| s.duration() >= min_duration);

        debug!("idling: {} samples, {} segments", samples.len(), segments.len());
        Ok(segments)
    }
}

/// Idling from windowed engine-speed aggregates
pub struct StaticRpmDetector {
    source: Arc<dyn SampleSource>,
    clock: Arc<dyn Clock>,
}

impl StaticRpmDetector {
    pub fn new(source: Arc<dyn SampleSource>, clock: Arc<dyn Clock>) -> Self {
        Self { source, clock }
    }
}

#[async_trait]
impl SegmentDetector for StaticRpmDetector {
    async fn detect_segments(
        &self,
        token_id: u32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        config: &SegmentConfig,
    ) -> Result<Vec<Segment>, EngineError> {
        let max_gap = config.max_gap(DEFAULT_MAX_GAP_SECONDS);
        let min_duration = config.min_segment_duration(DEFAULT_MIN_SEGMENT_SECONDS);

        let query = WindowQuery::all(align_down(from, WINDOW_SECONDS), to, WINDOW_SECONDS)
            .with_min_signal_count(config.signal_count_threshold_or(DEFAULT_STATIC_SIGNAL_COUNT))
            .with_value_filter(ValueFilter {
                signal: ENGINE_SPEED_SIGNAL.to_string(),
                min_exclusive: 0.0,
                max_inclusive: config.max_idle_rpm_or(DEFAULT_MAX_IDLE_RPM),
            });
        let windows = self
            .source
            .windowed_counts(token_id, &query)
            .await
            .map_err(EngineError::windows)?;

        let active = windows
            .iter()
            .map(|w| TimeRange::new(w.window_start, w.window_end))
            .collect();
        let runs = merge_window_runs(active, from, to, self.clock.now(), max_gap, min_duration);
        let mut segments = clip_ranges_ongoing(&runs.runs, from, to, runs.last_ongoing);
        segments.retain(|s| s.duration() >= min_duration);

        debug!("static rpm: {} idle windows, {} segments", windows.len(), segments.len());
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::testutil::{assert_well_formed, at, minutes, series, source, TOKEN};
    use sample_source::SignalRecord;

    /// Constant RPM every 10 seconds in `[start, end)`
    fn rpm(start: i64, end: i64, value: f64) -> Vec<SignalRecord> {
        series(ENGINE_SPEED_SIGNAL, (start..end).step_by(10).map(|t| (t, value)))
    }

    fn idling(records: Vec<SignalRecord>, now: i64) -> IdlingDetector {
        IdlingDetector::new(source(records), Arc::new(FixedClock(at(now))))
    }

    fn static_rpm(records: Vec<SignalRecord>, now: i64) -> StaticRpmDetector {
        StaticRpmDetector::new(source(records), Arc::new(FixedClock(at(now))))
    }

    #[test]
    fn test_idle_rpm_boundary() {
        assert!(is_idle_rpm(1000.0, 1000.0));
        assert!(!is_idle_rpm(1001.0, 1000.0));
        assert!(!is_idle_rpm(0.0, 1000.0));
        assert!(is_idle_rpm(0.5, 1000.0));
    }

    #[tokio::test]
    async fn test_fifteen_minutes_of_idle() {
        let to = at(minutes(20));
        let segments = idling(rpm(0, minutes(15), 800.0), 100_000)
            .detect_segments(TOKEN, at(0), to, &SegmentConfig::default())
            .await
            .unwrap();

        assert_eq!(segments.len(), 1);
        assert!(segments[0].duration_seconds >= 240);
        assert!(!segments[0].is_ongoing);
        assert_well_formed(&segments, to);
    }

    #[tokio::test]
    async fn test_rpm_at_ceiling_is_idle() {
        let segments = idling(rpm(0, minutes(10), 1000.0), 100_000)
            .detect_segments(TOKEN, at(0), at(minutes(20)), &SegmentConfig::default())
            .await
            .unwrap();
        assert_eq!(segments.len(), 1);

        let segments = idling(rpm(0, minutes(10), 1001.0), 100_000)
            .detect_segments(TOKEN, at(0), at(minutes(20)), &SegmentConfig::default())
            .await
            .unwrap();
        assert!(segments.is_empty());
    }

    #[tokio::test]
    async fn test_zero_rpm_never_idle() {
        let segments = idling(rpm(0, minutes(15), 0.0), 100_000)
            .detect_segments(TOKEN, at(0), at(minutes(20)), &SegmentConfig::default())
            .await
            .unwrap();
        assert!(segments.is_empty());
    }

    #[tokio::test]
    async fn test_gap_splits_run() {
        let mut records = rpm(0, 300, 800.0);
        records.extend(rpm(700, 1000, 800.0));
        let segments = idling(records, 100_000)
            .detect_segments(TOKEN, at(0), at(minutes(20)), &SegmentConfig::default())
            .await
            .unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].end, Some(at(290)));
        assert_eq!(segments[1].start, at(700));
    }

    #[tokio::test]
    async fn test_driving_splits_run() {
        let mut records = rpm(0, 410, 800.0);
        records.extend(rpm(410, 420, 2500.0));
        records.extend(rpm(420, 800, 800.0));
        let segments = idling(records, 100_000)
            .detect_segments(TOKEN, at(0), at(minutes(20)), &SegmentConfig::default())
            .await
            .unwrap();

        assert_eq!(segments.len(), 2);
        assert_well_formed(&segments, at(minutes(20)));
    }

    #[tokio::test]
    async fn test_idle_ongoing_near_now() {
        let segments = idling(rpm(0, 900, 800.0), 900)
            .detect_segments(TOKEN, at(0), at(900), &SegmentConfig::default())
            .await
            .unwrap();

        assert_eq!(segments.len(), 1);
        assert!(segments[0].is_ongoing);
        assert_eq!(segments[0].duration_seconds, 900);
    }

    #[tokio::test]
    async fn test_idle_clipped_to_range() {
        let segments = idling(rpm(0, minutes(15), 800.0), 100_000)
            .detect_segments(TOKEN, at(120), at(minutes(10)), &SegmentConfig::default())
            .await
            .unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, at(120));
        assert!(segments[0].started_before_range);
        assert_eq!(segments[0].end, Some(at(minutes(10))));
    }

    #[tokio::test]
    async fn test_static_rpm_windows() {
        let to = at(minutes(20));
        let segments = static_rpm(rpm(0, minutes(15), 800.0), 100_000)
            .detect_segments(TOKEN, at(0), to, &SegmentConfig::default())
            .await
            .unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].duration_seconds as i64, minutes(15));
        assert_well_formed(&segments, to);
    }

    #[tokio::test]
    async fn test_static_rpm_zero_and_ceiling() {
        let mut records = rpm(0, minutes(5), 1000.0);
        records.extend(rpm(minutes(5), minutes(15), 0.0));
        let segments = static_rpm(records, 100_000)
            .detect_segments(TOKEN, at(0), at(minutes(20)), &SegmentConfig::default())
            .await
            .unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].end, Some(at(minutes(5))));
    }
}
