//! Segment detectors
//!
//! One detector per mechanism, all behind [`SegmentDetector`]. Each reads
//! from the sample source once or twice, then reduces its findings to time
//! ranges that the shared utilities merge, clip, and turn into segments.

mod frequency;
mod idling;
mod ignition;
mod recharge;
mod refuel;

pub use frequency::{apply_cusum, ChangePointDetector, FrequencyDetector};
pub use idling::{IdlingDetector, StaticRpmDetector};
pub use ignition::IgnitionDetector;
pub use recharge::RechargeDetector;
pub use refuel::RefuelDetector;

use crate::config::SegmentConfig;
use crate::segment::Segment;
use crate::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Ignition on/off, 1 or 0
pub const IGNITION_SIGNAL: &str = "isIgnitionOn";
/// Engine speed in RPM
pub const ENGINE_SPEED_SIGNAL: &str = "powertrainCombustionEngineSpeed";
/// Fuel level in percent
pub const FUEL_LEVEL_SIGNAL: &str = "powertrainFuelSystemRelativeLevel";
/// Traction battery state of charge in percent
pub const STATE_OF_CHARGE_SIGNAL: &str = "powertrainTractionBatteryStateOfChargeCurrent";
/// Odometer in km
pub const ODOMETER_SIGNAL: &str = "powertrainTransmissionTravelledDistance";

/// Common contract of every detection mechanism
#[async_trait]
pub trait SegmentDetector: Send + Sync {
    /// Segments for `token_id` in `[from, to]`, sorted by start and
    /// non-overlapping. Inputs are assumed validated.
    async fn detect_segments(
        &self,
        token_id: u32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        config: &SegmentConfig,
    ) -> Result<Vec<Segment>, EngineError>;
}
