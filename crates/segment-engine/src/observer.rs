//! Detection instrumentation hooks

use crate::mechanism::Mechanism;
use std::time::Duration;

/// Receives one report per detection call.
///
/// Passed into [`crate::SegmentService`] so that the engine itself holds no
/// process-wide metrics state.
pub trait DetectionObserver: Send + Sync {
    fn detection_completed(&self, mechanism: Mechanism, elapsed: Duration, segments: usize);

    fn detection_failed(&self, mechanism: Mechanism, elapsed: Duration);
}

/// Observer that discards every report
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl DetectionObserver for NoopObserver {
    fn detection_completed(&self, _mechanism: Mechanism, _elapsed: Duration, _segments: usize) {}

    fn detection_failed(&self, _mechanism: Mechanism, _elapsed: Duration) {}
}
