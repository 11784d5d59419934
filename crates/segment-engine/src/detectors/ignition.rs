//! Ignition state machine with debouncing

use super::{SegmentDetector, IGNITION_SIGNAL};
use crate::config::SegmentConfig;
use crate::segment::Segment;
use crate::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sample_source::{SampleSource, StateChange};
use std::sync::Arc;
use tracing::debug;

/// Off periods shorter than this are blips, not trip boundaries
const DEFAULT_MIN_IDLE_SECONDS: i64 = 600;
const DEFAULT_MIN_SEGMENT_SECONDS: i64 = 150;
/// How far before `from` to look for the ON that opened a trip
const LOOKBACK_HOURS: i64 = 24;

/// Trips from ignition on/off transitions
pub struct IgnitionDetector {
    source: Arc<dyn SampleSource>,
}

impl IgnitionDetector {
    pub fn new(source: Arc<dyn SampleSource>) -> Self {
        Self { source }
    }
}

/// Drop every OFF that is followed by an ON within `min_idle`. The last
/// OFF of the stream is always kept.
fn debounce(events: &[StateChange], min_idle: Duration) -> Vec<StateChange> {
    let mut keep = vec![true; events.len()];
    let mut next_on: Option<DateTime<Utc>> = None;

    for (i, event) in events.iter().enumerate().rev() {
        if event.is_on() {
            next_on = Some(event.timestamp);
        } else if event.is_off() {
            if let Some(on_at) = next_on {
                keep[i] = on_at - event.timestamp >= min_idle;
            }
        }
    }

    events
        .iter()
        .zip(keep)
        .filter_map(|(event, keep)| keep.then_some(*event))
        .collect()
}

fn build_segments(
    events: &[StateChange],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    min_duration: Duration,
) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut open: Option<DateTime<Utc>> = None;

    for event in events {
        if event.is_on() {
            // an ON from an unknown prior state is not a real start boundary
            if open.is_none() && !event.prev_unknown() && event.prev_state != 1.0 {
                open = Some(event.timestamp);
            }
        } else if event.is_off() {
            let Some(start) = open.take() else { continue };
            if event.timestamp <= from || event.timestamp - start < min_duration {
                continue;
            }
            segments.extend(Segment::closed(start, event.timestamp, start < from));
        }
    }

    if let Some(start) = open {
        if to - start >= min_duration {
            segments.push(Segment::ongoing(start, to, start < from));
        }
    }

    segments
}

#[async_trait]
impl SegmentDetector for IgnitionDetector {
    async fn detect_segments(
        &self,
        token_id: u32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        config: &SegmentConfig,
    ) -> Result<Vec<Segment>, EngineError> {
        let events = self
            .source
            .state_changes(token_id, IGNITION_SIGNAL, from - Duration::hours(LOOKBACK_HOURS), to)
            .await
            .map_err(EngineError::state_changes)?;

        if events.is_empty() {
            return Ok(Vec::new());
        }

        let filtered = debounce(&events, config.min_idle(DEFAULT_MIN_IDLE_SECONDS));
        let segments = build_segments(
            &filtered,
            from,
            to,
            config.min_segment_duration(DEFAULT_MIN_SEGMENT_SECONDS),
        );

        debug!(
            "ignition: {} transitions, {} after debounce, {} segments",
            events.len(),
            filtered.len(),
            segments.len()
        );
        Ok(segments)
    }
}
