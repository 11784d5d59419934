//! Segment Detection Engine
//!
//! Converts irregularly sampled vehicle signals into discrete activity
//! segments:
//! - Trips from ignition state changes, signal frequency, or CUSUM change points
//! - Idling periods from engine speed
//! - Refuels from fuel level
//! - Recharges from state of charge cross-checked against the odometer

pub mod clock;
pub mod config;
pub mod detectors;
pub mod mechanism;
pub mod observer;
pub mod segment;
pub mod service;
pub mod utils;

#[cfg(test)]
mod testutil;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::SegmentConfig;
pub use detectors::SegmentDetector;
pub use mechanism::Mechanism;
pub use observer::{DetectionObserver, NoopObserver};
pub use segment::Segment;
pub use service::SegmentService;

use sample_source::SourceError;
use thiserror::Error;

/// Segment detection errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid token id: {0}")]
    InvalidTokenId(u32),

    #[error("invalid time range: {0}")]
    InvalidRange(String),

    #[error("date range cannot exceed {max_days} days")]
    RangeTooLarge { max_days: i64 },

    #[error("time range ends in the future")]
    RangeInFuture,

    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("unknown detection mechanism: {0}")]
    UnknownMechanism(String),

    #[error("failed to query {what}: {source}")]
    Source {
        what: &'static str,
        #[source]
        source: SourceError,
    },
}

impl EngineError {
    /// Whether the error was caused by caller input rather than the source
    pub fn is_validation(&self) -> bool {
        !matches!(self, EngineError::Source { .. })
    }

    pub(crate) fn samples(source: SourceError) -> Self {
        EngineError::Source { what: "samples", source }
    }

    pub(crate) fn windows(source: SourceError) -> Self {
        EngineError::Source { what: "windows", source }
    }

    pub(crate) fn state_changes(source: SourceError) -> Self {
        EngineError::Source {
            what: "state changes",
            source,
        }
    }
}
