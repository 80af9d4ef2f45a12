//! Invocation metrics

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{linear_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::time::Duration;

/// Receives invocation observations, keyed by function name
pub trait MetricsSink: Send + Sync {
    /// One completed invocation and how long it took
    fn observe_invocation(&self, function: &str, duration: Duration);

    /// One failed invocation
    fn observe_failure(&self, function: &str, kind: &'static str);
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct FunctionLabel {
    function: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct FailureLabel {
    function: String,
    kind: String,
}

fn duration_histogram() -> Histogram {
    Histogram::new(linear_buckets(10.0, 100.0, 10))
}

/// Prometheus-backed metrics sink
#[derive(Debug, Clone)]
pub struct InvocationMetrics {
    invocations: Family<FunctionLabel, Counter>,
    duration_ms: Family<FunctionLabel, Histogram, fn() -> Histogram>,
    failures: Family<FailureLabel, Counter>,
}

impl InvocationMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let invocations = Family::<FunctionLabel, Counter>::default();
        registry.register(
            "function_invocations",
            "Number of function invocations",
            invocations.clone(),
        );
        let duration_ms =
            Family::<FunctionLabel, Histogram, fn() -> Histogram>::new_with_constructor(
                duration_histogram,
            );
        registry.register(
            "function_invocation_duration_milliseconds",
            "Invocation latency in milliseconds",
            duration_ms.clone(),
        );
        let failures = Family::<FailureLabel, Counter>::default();
        registry.register(
            "function_invocation_failures",
            "Number of failed function invocations",
            failures.clone(),
        );

        Self {
            invocations,
            duration_ms,
            failures,
        }
    }
}

impl MetricsSink for InvocationMetrics {
    fn observe_invocation(&self, function: &str, duration: Duration) {
        let label = FunctionLabel {
            function: function.to_string(),
        };
        self.invocations.get_or_create(&label).inc();
        self.duration_ms
            .get_or_create(&label)
            .observe(duration.as_secs_f64() * 1000.0);
    }

    fn observe_failure(&self, function: &str, kind: &'static str) {
        self.failures
            .get_or_create(&FailureLabel {
                function: function.to_string(),
                kind: kind.to_string(),
            })
            .inc();
    }
}

/// Render the registry in the text exposition format
pub fn encode(registry: &Registry) -> Result<String, std::fmt::Error> {
    let mut buf = String::new();
    prometheus_client::encoding::text::encode(&mut buf, registry)?;
    Ok(buf)
}
