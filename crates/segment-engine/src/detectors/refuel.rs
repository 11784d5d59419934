//! Refuel detection from fuel level troughs and peaks

use super::{SegmentDetector, FUEL_LEVEL_SIGNAL};
use crate::config::SegmentConfig;
use crate::segment::{Segment, TimeRange};
use crate::utils::{align_down, clip_ranges, merge_ranges, sample_at_or_before};
use crate::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sample_source::{LevelSample, SampleSource};
use std::sync::Arc;
use tracing::debug;

const SCAN_WINDOW_MINUTES: i64 = 5;
const SCAN_STEP_SECONDS: i64 = 60;
const DEFAULT_MIN_INCREASE_PERCENT: f64 = 30.0;
const DEFAULT_MIN_SEGMENT_SECONDS: i64 = 60;
/// Percentage points between trough and peak
const MIN_ABSOLUTE_RISE: f64 = 20.0;
/// Relative rise is meaningless from an empty tank
const MIN_START_LEVEL: f64 = 1e-6;
const PEAK_SEARCH_MINUTES: i64 = 30;
/// A drop this far below the peak means the level is settling after the fill
const SETTLE_DROP: f64 = 1.0;
/// Extra data read on both sides for the trough and peak walks
const READ_MARGIN_MINUTES: i64 = 35;

/// Refuels from fuel level jumps
pub struct RefuelDetector {
    source: Arc<dyn SampleSource>,
}

impl RefuelDetector {
    pub fn new(source: Arc<dyn SampleSource>) -> Self {
        Self { source }
    }
}

/// Last low point before the rise: advance while the level does not climb
/// inside the window, then step back over any lower earlier sample
fn find_trough(samples: &[LevelSample], start: usize, window_end: DateTime<Utc>) -> usize {
    let mut t = start;
    while t + 1 < samples.len()
        && samples[t + 1].timestamp <= window_end
        && samples[t + 1].value <= samples[t].value
    {
        t += 1;
    }
    while t > 0 && samples[t - 1].value < samples[t].value {
        t -= 1;
    }
    t
}

/// First sample of the running maximum after the trough, searching up to
/// `search_until` and stopping once the level settles back down
fn find_peak(samples: &[LevelSample], trough: usize, search_until: DateTime<Utc>) -> usize {
    let mut peak = trough;
    for (k, sample) in samples.iter().enumerate().skip(trough + 1) {
        if sample.timestamp > search_until {
            break;
        }
        if sample.value > samples[peak].value {
            peak = k;
        } else if sample.value < samples[peak].value - SETTLE_DROP {
            break;
        }
    }
    peak
}

/// Trough-to-peak range of a refuel that starts inside
/// `[window_start, window_end]`, if any
fn refuel_in_window(
    samples: &[LevelSample],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    min_increase_percent: f64,
    min_duration: Duration,
) -> Option<TimeRange> {
    let first = sample_at_or_before(samples, window_start)?;
    let last = sample_at_or_before(samples, window_end)?;
    let start_level = samples[first].value;
    if start_level < MIN_START_LEVEL {
        return None;
    }

    let increase = (samples[last].value - start_level) / start_level * 100.0;
    if increase <= min_increase_percent {
        return None;
    }

    let trough = find_trough(samples, first, window_end);
    let peak = find_peak(samples, trough, window_end + Duration::minutes(PEAK_SEARCH_MINUTES));
    let rise = samples[peak].value - samples[trough].value;
    let range = TimeRange::new(samples[trough].timestamp, samples[peak].timestamp);

    (rise >= MIN_ABSOLUTE_RISE && range.duration() >= min_duration).then_some(range)
}

/// Slide a five-minute window one minute at a time across
/// `[from - 5m, to + 5m]` and collect every refuel it exposes
fn find_refuels(
    samples: &[LevelSample],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    min_increase_percent: f64,
    min_duration: Duration,
) -> Vec<TimeRange> {
    let window = Duration::minutes(SCAN_WINDOW_MINUTES);
    let step = Duration::seconds(SCAN_STEP_SECONDS);
    let scan_end = to + window;
    let mut start = align_down(from - window, SCAN_STEP_SECONDS);
    let mut found = Vec::new();

    while start < scan_end {
        found.extend(refuel_in_window(samples, start, start + window, min_increase_percent, min_duration));
        start += step;
    }

    found
}

#[async_trait]
impl SegmentDetector for RefuelDetector {
    async fn detect_segments(
        &self,
        token_id: u32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        config: &SegmentConfig,
    ) -> Result<Vec<Segment>, EngineError> {
        let margin = Duration::minutes(READ_MARGIN_MINUTES);
        let samples = self
            .source
            .level_samples(token_id, FUEL_LEVEL_SIGNAL, from - margin, to + margin)
            .await
            .map_err(EngineError::samples)?;

        if samples.len() < 2 {
            return Ok(Vec::new());
        }

        let min_duration = config.min_segment_duration(DEFAULT_MIN_SEGMENT_SECONDS);
        let candidates = find_refuels(
            &samples,
            from,
            to,
            config.min_increase_percent_or(DEFAULT_MIN_INCREASE_PERCENT),
            min_duration,
        );
        let candidate_count = candidates.len();

        let merged = merge_ranges(candidates, Duration::zero());
        let mut segments = clip_ranges(&merged, from, to);
        segments.retain(|s| s.duration() >= min_duration);

        debug!(
            "refuel: {} samples, {} candidate windows, {} segments",
            samples.len(),
            candidate_count,
            segments.len()
        );
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{assert_well_formed, at, minutes, series, source, FailingSource, TOKEN};

    fn detector(points: impl IntoIterator<Item = (i64, f64)>) -> RefuelDetector {
        RefuelDetector::new(source(series(FUEL_LEVEL_SIGNAL, points)))
    }

    /// Fuel level sampled once a minute over `[0, 60]` minutes
    fn per_minute(level: impl Fn(i64) -> f64) -> Vec<(i64, f64)> {
        (0..=60).map(|m| (minutes(m), level(m))).collect()
    }

    #[tokio::test]
    async fn test_jump_from_twenty_to_eighty() {
        let to = at(minutes(61));
        let segments = detector(per_minute(|m| if m < 30 { 20.0 } else { 80.0 }))
            .detect_segments(TOKEN, at(0), to, &SegmentConfig::default())
            .await
            .unwrap();

        assert_eq!(segments.len(), 1);
        assert_well_formed(&segments, to);
        assert_eq!(segments[0].start, at(minutes(29)));
        assert_eq!(segments[0].end, Some(at(minutes(30))));
        assert!(!segments[0].is_ongoing);
    }

    #[tokio::test]
    async fn test_gradual_fill_spans_trough_to_peak() {
        // consumption down to 15.5%, then a four-minute fill to 75.5%
        let level = |m: i64| match m {
            0..=29 => 30.0 - m as f64 * 0.5,
            30..=33 => 15.5 + (m - 29) as f64 * 15.0,
            _ => 75.5,
        };
        let segments = detector(per_minute(level))
            .detect_segments(TOKEN, at(0), at(minutes(61)), &SegmentConfig::default())
            .await
            .unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, at(minutes(29)));
        assert_eq!(segments[0].end, Some(at(minutes(33))));
    }

    #[tokio::test]
    async fn test_peak_stops_at_settling_drop() {
        let level = |m: i64| match m {
            0..=29 => 20.0,
            30 => 70.0,
            31 => 82.0,
            _ => 78.0,
        };
        let segments = detector(per_minute(level))
            .detect_segments(TOKEN, at(0), at(minutes(61)), &SegmentConfig::default())
            .await
            .unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].end, Some(at(minutes(31))));
    }

    #[tokio::test]
    async fn test_small_absolute_rise_rejected() {
        // 150% relative but only 15 points
        let segments = detector(per_minute(|m| if m < 30 { 10.0 } else { 25.0 }))
            .detect_segments(TOKEN, at(0), at(minutes(61)), &SegmentConfig::default())
            .await
            .unwrap();

        assert!(segments.is_empty());
    }

    #[tokio::test]
    async fn test_small_relative_rise_rejected() {
        let segments = detector(per_minute(|m| if m < 30 { 70.0 } else { 90.0 }))
            .detect_segments(TOKEN, at(0), at(minutes(61)), &SegmentConfig::default())
            .await
            .unwrap();
        assert!(segments.is_empty());

        let config = SegmentConfig {
            min_increase_percent: Some(20.0),
            ..Default::default()
        };
        let segments = detector(per_minute(|m| if m < 30 { 70.0 } else { 90.0 }))
            .detect_segments(TOKEN, at(0), at(minutes(61)), &config)
            .await
            .unwrap();
        assert_eq!(segments.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_tank_start_ignored() {
        let segments = detector(per_minute(|m| if m < 30 { 0.0 } else { 60.0 }))
            .detect_segments(TOKEN, at(0), at(minutes(61)), &SegmentConfig::default())
            .await
            .unwrap();

        assert!(segments.is_empty());
    }

    #[tokio::test]
    async fn test_two_refuels() {
        let level = |m: i64| match m {
            0..=14 => 20.0,
            15..=39 => 80.0,
            40..=44 => 40.0,
            _ => 95.0,
        };
        let to = at(minutes(61));
        let segments = detector(per_minute(level))
            .detect_segments(TOKEN, at(0), to, &SegmentConfig::default())
            .await
            .unwrap();

        assert_eq!(segments.len(), 2);
        assert_well_formed(&segments, to);
        assert_eq!(segments[0].start, at(minutes(14)));
        assert_eq!(segments[1].end, Some(at(minutes(45))));
    }

    #[tokio::test]
    async fn test_sparse_data() {
        let segments = detector(vec![(0, 20.0)])
            .detect_segments(TOKEN, at(0), at(minutes(61)), &SegmentConfig::default())
            .await
            .unwrap();
        assert!(segments.is_empty());
    }

    #[tokio::test]
    async fn test_sample_errors_wrapped() {
        let err = RefuelDetector::new(Arc::new(FailingSource))
            .detect_segments(TOKEN, at(0), at(600), &SegmentConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("failed to query samples"));
    }
}
