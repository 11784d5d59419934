//! Window-count detectors: hard threshold and CUSUM change point

use super::SegmentDetector;
use crate::clock::Clock;
use crate::config::SegmentConfig;
use crate::segment::{Segment, TimeRange};
use crate::utils::{align_down, filter_min_duration, is_trailing_ongoing, merge_ranges, ranges_into_segments};
use crate::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sample_source::{SampleSource, Window, WindowQuery};
use std::sync::Arc;
use tracing::debug;

pub(crate) const WINDOW_SECONDS: i64 = 60;
const DEFAULT_SIGNAL_COUNT_THRESHOLD: u64 = 12;
/// Also the default gap tolerance between active windows
const DEFAULT_MIN_IDLE_SECONDS: i64 = 600;
const DEFAULT_MIN_SEGMENT_SECONDS: i64 = 240;

const CUSUM_BASELINE: f64 = 1.0;
const CUSUM_DRIFT: f64 = 0.5;
const CUSUM_THRESHOLD: f64 = 5.0;

/// Gap tolerance: `max_gap_seconds`, falling back to `min_idle_seconds`
fn window_max_gap(config: &SegmentConfig) -> Duration {
    config.max_gap(config.min_idle_seconds.unwrap_or(DEFAULT_MIN_IDLE_SECONDS))
}

fn window_range(window: &Window) -> TimeRange {
    TimeRange::new(window.window_start, window.window_end)
}

/// Merged runs of active windows and whether the final one is still in
/// progress
pub(crate) struct WindowRuns {
    pub runs: Vec<TimeRange>,
    pub last_ongoing: bool,
}

/// Merge active window ranges, drop short runs and runs that ended before
/// `from`, and decide whether the trailing run is ongoing
pub(crate) fn merge_window_runs(
    active: Vec<TimeRange>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    now: DateTime<Utc>,
    max_gap: Duration,
    min_duration: Duration,
) -> WindowRuns {
    let mut runs = filter_min_duration(merge_ranges(active, max_gap), min_duration);
    runs.retain(|r| r.end > from);
    let last_ongoing = runs
        .last()
        .is_some_and(|r| is_trailing_ongoing(r.end, to, now, max_gap));
    WindowRuns { runs, last_ongoing }
}

fn runs_into_segments(
    runs: WindowRuns,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    min_duration: Duration,
) -> Vec<Segment> {
    let mut segments = ranges_into_segments(&runs.runs, from, to, runs.last_ongoing);
    segments.retain(|s| s.duration() >= min_duration);
    segments
}

/// One-sided CUSUM over per-window counts.
///
/// `S[t] = max(0, S[t-1] + count[t] - baseline - drift)`; a window is active
/// while `S[t]` exceeds the threshold, so activity trails off as `S` decays.
pub fn apply_cusum(counts: &[u64]) -> Vec<bool> {
    let mut sum = 0.0_f64;
    counts
        .iter()
        .map(|&count| {
            sum = (sum + count as f64 - CUSUM_BASELINE - CUSUM_DRIFT).max(0.0);
            sum > CUSUM_THRESHOLD
        })
        .collect()
}

/// Expand sparse windows into one count per window slot in `[start, to)`
fn dense_counts(windows: &[Window], start: DateTime<Utc>, to: DateTime<Utc>) -> Vec<(DateTime<Utc>, u64)> {
    let step = Duration::seconds(WINDOW_SECONDS);
    let mut dense = Vec::new();
    let mut sparse = windows.iter().peekable();
    let mut slot = start;

    while slot < to {
        while sparse.next_if(|w| w.window_start < slot).is_some() {}
        let count = sparse
            .next_if(|w| w.window_start == slot)
            .map_or(0, |w| w.signal_count);
        dense.push((slot, count));
        slot += step;
    }

    dense
}

/// Trips from windows whose signal count meets a fixed threshold
pub struct FrequencyDetector {
    source: Arc<dyn SampleSource>,
    clock: Arc<dyn Clock>,
}

impl FrequencyDetector {
    pub fn new(source: Arc<dyn SampleSource>, clock: Arc<dyn Clock>) -> Self {
        Self { source, clock }
    }
}

#[async_trait]
impl SegmentDetector for FrequencyDetector {
    async fn detect_segments(
        &self,
        token_id: u32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        config: &SegmentConfig,
    ) -> Result<Vec<Segment>, EngineError> {
        let threshold = config.signal_count_threshold_or(DEFAULT_SIGNAL_COUNT_THRESHOLD);
        let query = WindowQuery::all(align_down(from, WINDOW_SECONDS), to, WINDOW_SECONDS)
            .with_min_signal_count(threshold);
        let windows = self
            .source
            .windowed_counts(token_id, &query)
            .await
            .map_err(EngineError::windows)?;

        let max_gap = window_max_gap(config);
        let min_duration = config.min_segment_duration(DEFAULT_MIN_SEGMENT_SECONDS);
        let active = windows.iter().map(window_range).collect();
        let runs = merge_window_runs(active, from, to, self.clock.now(), max_gap, min_duration);
        let segments = runs_into_segments(runs, from, to, min_duration);

        debug!("frequency: {} active windows, {} segments", windows.len(), segments.len());
        Ok(segments)
    }
}

/// Trips from CUSUM change points over window counts
pub struct ChangePointDetector {
    source: Arc<dyn SampleSource>,
    clock: Arc<dyn Clock>,
}

impl ChangePointDetector {
    pub fn new(source: Arc<dyn SampleSource>, clock: Arc<dyn Clock>) -> Self {
        Self { source, clock }
    }
}

#[async_trait]
impl SegmentDetector for ChangePointDetector {
    async fn detect_segments(
        &self,
        token_id: u32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        config: &SegmentConfig,
    ) -> Result<Vec<Segment>, EngineError> {
        let max_gap = window_max_gap(config);
        let min_duration = config.min_segment_duration(DEFAULT_MIN_SEGMENT_SECONDS);

        // look back so activity already running at `from` keeps its start
        let lookback = align_down(from - max_gap, WINDOW_SECONDS);
        let query = WindowQuery::all(lookback, to, WINDOW_SECONDS);
        let windows = self
            .source
            .windowed_counts(token_id, &query)
            .await
            .map_err(EngineError::windows)?;

        let dense = dense_counts(&windows, lookback, to);
        let counts: Vec<u64> = dense.iter().map(|(_, count)| *count).collect();
        let step = Duration::seconds(WINDOW_SECONDS);
        let active: Vec<TimeRange> = dense
            .iter()
            .zip(apply_cusum(&counts))
            .filter(|(_, active)| *active)
            .map(|((slot, _), _)| TimeRange::new(*slot, *slot + step))
            .collect();

        let active_windows = active.len();
        let runs = merge_window_runs(active, from, to, self.clock.now(), max_gap, min_duration);
        let segments = runs_into_segments(runs, from, to, min_duration);

        debug!(
            "change point: {} windows, {} active, {} segments",
            counts.len(),
            active_windows,
            segments.len()
        );
        Ok(segments)
    }
}
