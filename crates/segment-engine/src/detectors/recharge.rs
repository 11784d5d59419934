//! Recharge detection from smoothed state of charge

use super::{SegmentDetector, ODOMETER_SIGNAL, STATE_OF_CHARGE_SIGNAL};
use crate::config::SegmentConfig;
use crate::segment::{Segment, TimeRange};
use crate::utils::{clip_ranges, level_first_last_in_range, merge_ranges_with, rolling_average, sample_at_or_before};
use crate::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sample_source::{LevelSample, SampleSource};
use std::sync::Arc;
use tracing::debug;

const SMOOTHING_WINDOW: usize = 11;
/// Below this many samples a trend is not trusted
const MIN_SAMPLES: usize = SMOOTHING_WINDOW + 2;
const DEFAULT_MIN_INCREASE_PERCENT: f64 = 1.0;
const DEFAULT_MIN_SEGMENT_SECONDS: i64 = 60;
/// Odometer noise tolerated inside one charge, in km
const ODOMETER_EPSILON_KM: f64 = 0.5;
const MAX_MERGE_GAP_HOURS: i64 = 2;
const LOOKBACK_HOURS: i64 = 2;

/// Recharges from state-of-charge rises while the vehicle is parked
pub struct RechargeDetector {
    source: Arc<dyn SampleSource>,
}

impl RechargeDetector {
    pub fn new(source: Arc<dyn SampleSource>) -> Self {
        Self { source }
    }
}

/// Index pairs `(trough, peak)` of every rise in `values`
fn rising_runs(values: &[f64]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut i = 0;

    while i + 1 < values.len() {
        while i + 1 < values.len() && values[i + 1] <= values[i] {
            i += 1;
        }
        let trough = i;
        while i + 1 < values.len() && values[i + 1] > values[i] {
            i += 1;
        }
        if i > trough {
            runs.push((trough, i));
        }
    }

    runs
}

/// Narrow `[trough, peak]` to the last raw minimum and the first raw
/// maximum inside it, undoing the lag smoothing adds at both ends
fn snap_to_raw_extremes(samples: &[LevelSample], trough: usize, peak: usize) -> (usize, usize) {
    let mut low = trough;
    for k in trough..=peak {
        if samples[k].value <= samples[low].value {
            low = k;
        }
    }
    let mut high = low;
    for k in low..=peak {
        if samples[k].value > samples[high].value {
            high = k;
        }
    }
    (low, high)
}

/// Odometer did not move beyond noise during `range`
fn parked_during(odometer: &[LevelSample], range: &TimeRange) -> bool {
    level_first_last_in_range(odometer, range.start, range.end)
        .map_or(true, |(first, last)| last - first <= ODOMETER_EPSILON_KM)
}

/// Same odometer reading on both sides of a reporting gap
fn same_odometer(odometer: &[LevelSample], before: DateTime<Utc>, after: DateTime<Utc>) -> bool {
    match (
        sample_at_or_before(odometer, before),
        sample_at_or_before(odometer, after),
    ) {
        (Some(a), Some(b)) => odometer[a].value == odometer[b].value,
        _ => false,
    }
}

fn find_recharges(
    soc: &[LevelSample],
    odometer: &[LevelSample],
    min_increase: f64,
    min_duration: Duration,
) -> Vec<TimeRange> {
    let raw: Vec<f64> = soc.iter().map(|s| s.value).collect();
    let smoothed = rolling_average(&raw, SMOOTHING_WINDOW);

    rising_runs(&smoothed)
        .into_iter()
        .filter(|&(t, p)| {
            smoothed[p] - smoothed[t] >= min_increase
                && soc[p].timestamp - soc[t].timestamp >= min_duration
                && soc[p].value > soc[t].value
        })
        .map(|(t, p)| {
            let (low, high) = snap_to_raw_extremes(soc, t, p);
            TimeRange::new(soc[low].timestamp, soc[high].timestamp)
        })
        .filter(|range| range.duration() >= min_duration && parked_during(odometer, range))
        .collect()
}

#[async_trait]
impl SegmentDetector for RechargeDetector {
    async fn detect_segments(
        &self,
        token_id: u32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        config: &SegmentConfig,
    ) -> Result<Vec<Segment>, EngineError> {
        let read_from = from - Duration::hours(LOOKBACK_HOURS);
        let soc = self
            .source
            .level_samples(token_id, STATE_OF_CHARGE_SIGNAL, read_from, to)
            .await
            .map_err(EngineError::samples)?;

        if soc.len() < MIN_SAMPLES {
            debug!("recharge: {} samples, not enough to smooth", soc.len());
            return Ok(Vec::new());
        }

        let odometer = self
            .source
            .level_samples(token_id, ODOMETER_SIGNAL, read_from, to)
            .await
            .map_err(EngineError::samples)?;

        let min_duration = config.min_segment_duration(DEFAULT_MIN_SEGMENT_SECONDS);
        let candidates = find_recharges(
            &soc,
            &odometer,
            config.min_increase_percent_or(DEFAULT_MIN_INCREASE_PERCENT),
            min_duration,
        );
        let candidate_count = candidates.len();

        let merged = merge_ranges_with(candidates, Duration::hours(MAX_MERGE_GAP_HOURS), |a, b| {
            same_odometer(&odometer, a.end, b.start)
        });
        let mut segments = clip_ranges(&merged, from, to);
        segments.retain(|s| s.duration() >= min_duration);

        debug!(
            "recharge: {} samples, {} candidates, {} segments",
            soc.len(),
            candidate_count,
            segments.len()
        );
        Ok(segments)
    }
}
