//! Per-request detection tunables

use crate::EngineError;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Allowed range of `min_idle_seconds`
pub const MIN_IDLE_SECONDS_RANGE: (f64, f64) = (60.0, 3600.0);
/// Allowed range of `min_segment_duration_seconds`
pub const MIN_SEGMENT_DURATION_RANGE: (f64, f64) = (1.0, 3600.0);
/// Allowed range of `signal_count_threshold`
pub const SIGNAL_COUNT_THRESHOLD_RANGE: (f64, f64) = (3.0, 100.0);
/// Allowed range of `max_gap_seconds`
pub const MAX_GAP_SECONDS_RANGE: (f64, f64) = (1.0, 7200.0);
/// Allowed range of `max_idle_rpm`
pub const MAX_IDLE_RPM_RANGE: (f64, f64) = (100.0, 5000.0);
/// Allowed range of `min_increase_percent`; zero itself is rejected
pub const MIN_INCREASE_PERCENT_RANGE: (f64, f64) = (0.0, 100.0);

/// Optional detection tunables.
///
/// Every field is optional; absent fields fall back to the default of the
/// detector that reads them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentConfig {
    /// Ignition off periods shorter than this do not end a trip
    pub min_idle_seconds: Option<i64>,
    /// Segments shorter than this are dropped
    pub min_segment_duration_seconds: Option<i64>,
    /// Minimum arrivals per window to count as active
    pub signal_count_threshold: Option<u64>,
    /// Largest tolerated gap inside one segment
    pub max_gap_seconds: Option<i64>,
    /// Upper bound of the idle RPM band, inclusive
    pub max_idle_rpm: Option<f64>,
    /// Minimum level increase for refuel and recharge candidates
    pub min_increase_percent: Option<f64>,
}

/// Inclusive range check; NaN is never in range
fn validate_range(field: &'static str, value: f64, range: (f64, f64)) -> Result<(), EngineError> {
    if !(range.0..=range.1).contains(&value) {
        Err(EngineError::OutOfRange {
            field,
            value,
            min: range.0,
            max: range.1,
        })
    } else {
        Ok(())
    }
}

impl SegmentConfig {
    /// Check every present field against its allowed range
    pub fn validate(&self) -> Result<(), EngineError> {
        if let Some(v) = self.min_idle_seconds {
            validate_range("minIdleSeconds", v as f64, MIN_IDLE_SECONDS_RANGE)?;
        }
        if let Some(v) = self.min_segment_duration_seconds {
            validate_range("minSegmentDurationSeconds", v as f64, MIN_SEGMENT_DURATION_RANGE)?;
        }
        if let Some(v) = self.signal_count_threshold {
            validate_range("signalCountThreshold", v as f64, SIGNAL_COUNT_THRESHOLD_RANGE)?;
        }
        if let Some(v) = self.max_gap_seconds {
            validate_range("maxGapSeconds", v as f64, MAX_GAP_SECONDS_RANGE)?;
        }
        if let Some(v) = self.max_idle_rpm {
            validate_range("maxIdleRpm", v, MAX_IDLE_RPM_RANGE)?;
        }
        if let Some(v) = self.min_increase_percent {
            validate_range("minIncreasePercent", v, MIN_INCREASE_PERCENT_RANGE)?;
            if v <= 0.0 {
                return Err(EngineError::OutOfRange {
                    field: "minIncreasePercent",
                    value: v,
                    min: MIN_INCREASE_PERCENT_RANGE.0,
                    max: MIN_INCREASE_PERCENT_RANGE.1,
                });
            }
        }
        Ok(())
    }

    pub fn min_idle(&self, default_seconds: i64) -> Duration {
        Duration::seconds(self.min_idle_seconds.unwrap_or(default_seconds))
    }

    pub fn min_segment_duration(&self, default_seconds: i64) -> Duration {
        Duration::seconds(self.min_segment_duration_seconds.unwrap_or(default_seconds))
    }

    pub fn max_gap(&self, default_seconds: i64) -> Duration {
        Duration::seconds(self.max_gap_seconds.unwrap_or(default_seconds))
    }

    pub fn signal_count_threshold_or(&self, default: u64) -> u64 {
        self.signal_count_threshold.unwrap_or(default)
    }

    pub fn max_idle_rpm_or(&self, default: f64) -> f64 {
        self.max_idle_rpm.unwrap_or(default)
    }

    pub fn min_increase_percent_or(&self, default: f64) -> f64 {
        self.min_increase_percent.unwrap_or(default)
    }
}
