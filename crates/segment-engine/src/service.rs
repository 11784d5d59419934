//! Segment detection entry point
//!
//! Validates a request, hands it to the detector for the chosen
//! mechanism, and reports the outcome to the observer.

use crate::clock::Clock;
use crate::config::SegmentConfig;
use crate::detectors::{
    ChangePointDetector, FrequencyDetector, IdlingDetector, IgnitionDetector, RechargeDetector,
    RefuelDetector, SegmentDetector, StaticRpmDetector,
};
use crate::mechanism::Mechanism;
use crate::observer::{DetectionObserver, NoopObserver};
use crate::segment::Segment;
use crate::EngineError;
use chrono::{DateTime, Duration, Utc};
use sample_source::SampleSource;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Longest accepted query range
pub const MAX_RANGE_DAYS: i64 = 30;

/// Widest lookback or read margin any detector applies around the range
const READ_MARGIN_HOURS: i64 = 25;

/// Dispatches detection requests to the detector for each mechanism
pub struct SegmentService {
    ignition: IgnitionDetector,
    frequency: FrequencyDetector,
    change_point: ChangePointDetector,
    idling: IdlingDetector,
    static_rpm: StaticRpmDetector,
    refuel: RefuelDetector,
    recharge: RechargeDetector,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn DetectionObserver>,
}

impl SegmentService {
    pub fn new(source: Arc<dyn SampleSource>, clock: Arc<dyn Clock>) -> Self {
        Self::with_observer(source, clock, Arc::new(NoopObserver))
    }

    pub fn with_observer(
        source: Arc<dyn SampleSource>,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn DetectionObserver>,
    ) -> Self {
        info!("Creating segment service with {} mechanisms", Mechanism::ALL.len());
        Self {
            ignition: IgnitionDetector::new(source.clone()),
            frequency: FrequencyDetector::new(source.clone(), clock.clone()),
            change_point: ChangePointDetector::new(source.clone(), clock.clone()),
            idling: IdlingDetector::new(source.clone(), clock.clone()),
            static_rpm: StaticRpmDetector::new(source.clone(), clock.clone()),
            refuel: RefuelDetector::new(source.clone()),
            recharge: RechargeDetector::new(source),
            clock,
            observer,
        }
    }

    fn detector(&self, mechanism: Mechanism) -> &dyn SegmentDetector {
        match mechanism {
            Mechanism::Ignition => &self.ignition,
            Mechanism::Frequency => &self.frequency,
            Mechanism::ChangePoint => &self.change_point,
            Mechanism::Idling => &self.idling,
            Mechanism::StaticRpm => &self.static_rpm,
            Mechanism::Refuel => &self.refuel,
            Mechanism::Recharge => &self.recharge,
        }
    }

    /// Reject a request before any source read
    pub fn validate_request(
        &self,
        token_id: u32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        config: &SegmentConfig,
    ) -> Result<(), EngineError> {
        if token_id == 0 {
            return Err(EngineError::InvalidTokenId(token_id));
        }
        if from >= to {
            return Err(EngineError::InvalidRange(format!(
                "from ({}) must be before to ({})",
                from.to_rfc3339(),
                to.to_rfc3339()
            )));
        }
        let margin = Duration::hours(READ_MARGIN_HOURS);
        if from.checked_sub_signed(margin).is_none() || to.checked_add_signed(margin).is_none() {
            return Err(EngineError::InvalidRange(
                "time range is outside the supported calendar".to_string(),
            ));
        }
        if to.signed_duration_since(from) > Duration::days(MAX_RANGE_DAYS) {
            return Err(EngineError::RangeTooLarge {
                max_days: MAX_RANGE_DAYS,
            });
        }
        if to > self.clock.now() {
            return Err(EngineError::RangeInFuture);
        }
        config.validate()
    }

    /// Segments of `mechanism` for `token_id` within `[from, to]`.
    ///
    /// `None` config means all defaults. An empty result is not an error.
    #[tracing::instrument(skip_all, fields(token_id = token_id, mechanism = %mechanism))]
    pub async fn get_segments(
        &self,
        token_id: u32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        mechanism: Mechanism,
        config: Option<SegmentConfig>,
    ) -> Result<Vec<Segment>, EngineError> {
        let config = config.unwrap_or_default();
        if let Err(e) = self.validate_request(token_id, from, to, &config) {
            warn!("Rejected detection request: {}", e);
            return Err(e);
        }

        let started = Instant::now();
        let result = self
            .detector(mechanism)
            .detect_segments(token_id, from, to, &config)
            .await;
        let elapsed = started.elapsed();

        match &result {
            Ok(segments) => {
                debug!("{} segments in {:?}", segments.len(), elapsed);
                self.observer
                    .detection_completed(mechanism, elapsed, segments.len());
            }
            Err(e) => {
                warn!("Detection failed: {}", e);
                self.observer.detection_failed(mechanism, elapsed);
            }
        }

        result
    }

    /// [`Self::get_segments`] with the mechanism given by name
    pub async fn get_segments_by_name(
        &self,
        token_id: u32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        mechanism: &str,
        config: Option<SegmentConfig>,
    ) -> Result<Vec<Segment>, EngineError> {
        let mechanism = mechanism.parse::<Mechanism>()?;
        self.get_segments(token_id, from, to, mechanism, config).await
    }
}
