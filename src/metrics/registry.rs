use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Histogram bucket boundaries for dispatch latency (seconds).
const LATENCY_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
];

/// The process-wide recorder handle. `metrics::set_global_recorder` can
/// only succeed once per process; the embedding menu-bar app constructs a
/// fresh `Proxy` (and therefore a fresh `Metrics`) every time the user
/// toggles the feature off and back on (§6 `Events.on_mode_changed`), so
/// installation itself must be idempotent — only the first call actually
/// installs, later calls just hand back the cached handle.
static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thin handle around the global metrics recorder, installed once per
/// process. After the first `Metrics::install()` call the `metrics` crate
/// macros (`counter!`, `gauge!`, `histogram!`) can be used anywhere in the
/// crate; `PrometheusHandle` is retained only to render a text-exposition
/// snapshot for an embedder that wants to scrape it.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    pub fn install() -> Self {
        let handle = RECORDER
            .get_or_init(|| {
                PrometheusBuilder::new()
                    .set_buckets_for_metric(
                        metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
                        LATENCY_BUCKETS,
                    )
                    .expect("valid matcher")
                    .install_recorder()
                    .expect("failed to install metrics recorder")
            })
            .clone();

        describe_counter!(
            "switchboard_connections_total",
            Unit::Count,
            "Total downstream connections accepted"
        );
        describe_gauge!(
            "switchboard_connections_active",
            Unit::Count,
            "Number of active downstream connections"
        );
        describe_counter!(
            "switchboard_requests_total",
            Unit::Count,
            "Total requests processed, labeled by final client-facing status"
        );
        describe_histogram!(
            "switchboard_request_duration_seconds",
            Unit::Seconds,
            "End-to-end request duration as observed by the client"
        );
        describe_histogram!(
            "switchboard_upstream_attempt_duration_seconds",
            Unit::Seconds,
            "Duration of a single upstream dispatch attempt"
        );
        describe_counter!(
            "switchboard_upstream_attempts_total",
            Unit::Count,
            "Total upstream dispatch attempts, labeled by upstream and outcome"
        );
        describe_gauge!(
            "switchboard_upstream_penalty",
            Unit::Count,
            "Current health penalty for an upstream"
        );

        Self { handle }
    }

    /// Renders all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
