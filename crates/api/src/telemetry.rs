//! Logging and Prometheus metrics

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use segment_engine::{DetectionObserver, Mechanism};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const DETECTION_DURATION: &str = "segment_detection_duration_seconds";
pub const DETECTION_SEGMENTS: &str = "segment_detection_segments";
pub const DETECTION_ERRORS: &str = "segment_detection_errors_total";

/// Install the global tracing subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!(e))
}

/// Install the global Prometheus recorder and describe the detection metrics
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_histogram!(
        DETECTION_DURATION,
        metrics::Unit::Seconds,
        "Time spent in one detection call"
    );
    metrics::describe_counter!(DETECTION_SEGMENTS, "Segments returned by detection calls");
    metrics::describe_counter!(DETECTION_ERRORS, "Detection calls that failed at the source");

    Ok(handle)
}

/// Forwards detection reports to the `metrics` facade, labelled by mechanism
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsObserver;

impl DetectionObserver for MetricsObserver {
    fn detection_completed(&self, mechanism: Mechanism, elapsed: Duration, segments: usize) {
        metrics::histogram!(DETECTION_DURATION, "mechanism" => mechanism.as_str())
            .record(elapsed.as_secs_f64());
        metrics::counter!(DETECTION_SEGMENTS, "mechanism" => mechanism.as_str())
            .increment(segments as u64);
    }

    fn detection_failed(&self, mechanism: Mechanism, elapsed: Duration) {
        metrics::histogram!(DETECTION_DURATION, "mechanism" => mechanism.as_str())
            .record(elapsed.as_secs_f64());
        metrics::counter!(DETECTION_ERRORS, "mechanism" => mechanism.as_str()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_records_into_local_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            MetricsObserver.detection_completed(Mechanism::Idling, Duration::from_millis(20), 3);
            MetricsObserver.detection_failed(Mechanism::Refuel, Duration::from_millis(5));
        });

        let rendered = handle.render();
        assert!(rendered.contains("segment_detection_segments{mechanism=\"idling\"} 3"));
        assert!(rendered.contains("segment_detection_errors_total{mechanism=\"refuel\"} 1"));
        assert!(rendered.contains(DETECTION_DURATION));
    }
}
