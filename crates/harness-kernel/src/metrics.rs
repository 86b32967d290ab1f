use std::time::Duration;

use once_cell::sync::{Lazy, OnceCell};
use prometheus::core::Collector;
use prometheus::{
    histogram_opts, Encoder, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use tracing::{debug, error};

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
static REGISTER_ONCE: OnceCell<()> = OnceCell::new();
static RUN_OUTCOMES: OnceCell<IntCounterVec> = OnceCell::new();
static RUN_DURATION: OnceCell<HistogramVec> = OnceCell::new();
static AGENT_STEPS: OnceCell<IntCounterVec> = OnceCell::new();
static STOP_REQUESTS: OnceCell<IntCounter> = OnceCell::new();
static SNAPSHOTS: OnceCell<IntCounterVec> = OnceCell::new();

pub fn register_metrics() {
    REGISTER_ONCE.get_or_init(|| {
        let registry = global_registry();
        register_run_metrics(registry);
        register_stream_metrics(registry);
    });
}

pub fn global_registry() -> &'static Registry {
    &GLOBAL_REGISTRY
}

fn install<C>(registry: &Registry, cell: &OnceCell<C>, metric: prometheus::Result<C>, name: &str)
where
    C: Collector + Clone + 'static,
{
    let metric = match metric {
        Ok(metric) => metric,
        Err(err) => {
            error!(?err, metric = name, "failed to create metric");
            return;
        }
    };
    if let Err(err) = registry.register(Box::new(metric.clone())) {
        error!(?err, metric = name, "failed to register metric");
    }
    let _ = cell.set(metric);
}

fn register_run_metrics(registry: &Registry) {
    install(
        registry,
        &RUN_OUTCOMES,
        IntCounterVec::new(
            Opts::new("harness_runs_total", "Agent runs grouped by terminal status"),
            &["status"],
        ),
        "harness_runs_total",
    );
    install(
        registry,
        &RUN_DURATION,
        HistogramVec::new(
            histogram_opts!(
                "harness_run_duration_seconds",
                "Wall-clock duration of agent runs",
                vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]
            ),
            &["status"],
        ),
        "harness_run_duration_seconds",
    );
    install(
        registry,
        &AGENT_STEPS,
        IntCounterVec::new(
            Opts::new("harness_agent_steps_total", "Agent steps by outcome"),
            &["result"],
        ),
        "harness_agent_steps_total",
    );
    install(
        registry,
        &STOP_REQUESTS,
        IntCounter::new("harness_stop_requests_total", "Stop requests received"),
        "harness_stop_requests_total",
    );
}

fn register_stream_metrics(registry: &Registry) {
    install(
        registry,
        &SNAPSHOTS,
        IntCounterVec::new(
            Opts::new(
                "harness_stream_snapshots_total",
                "UI snapshots emitted by the stream coordinator per phase",
            ),
            &["phase"],
        ),
        "harness_stream_snapshots_total",
    );
}

pub fn record_run_outcome(status: &str, elapsed: Duration) {
    register_metrics();
    if let Some(counter) = RUN_OUTCOMES.get() {
        counter.with_label_values(&[status]).inc();
    }
    if let Some(histogram) = RUN_DURATION.get() {
        histogram
            .with_label_values(&[status])
            .observe(elapsed.as_secs_f64());
    }
    debug!(target = "runs", %status, elapsed_ms = elapsed.as_millis() as u64, "run finished");
}

pub fn record_agent_step(result: &str) {
    register_metrics();
    if let Some(counter) = AGENT_STEPS.get() {
        counter.with_label_values(&[result]).inc();
    }
}

pub fn record_stop_request() {
    register_metrics();
    if let Some(counter) = STOP_REQUESTS.get() {
        counter.inc();
    }
}

pub fn record_snapshot(phase: &str) {
    register_metrics();
    if let Some(counter) = SNAPSHOTS.get() {
        counter.with_label_values(&[phase]).inc();
    }
}

/// Prometheus text exposition of the global registry.
pub fn render() -> Result<(String, String), prometheus::Error> {
    register_metrics();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&global_registry().gather(), &mut buffer)?;
    let body = String::from_utf8(buffer)
        .map_err(|err| prometheus::Error::Msg(format!("metrics are not utf8: {err}")))?;
    Ok((encoder.format_type().to_string(), body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposition_contains_run_counters() {
        record_run_outcome("completed", Duration::from_millis(1500));
        record_stop_request();
        let (content_type, body) = render().unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("harness_runs_total{status=\"completed\"}"));
        assert!(body.contains("harness_stop_requests_total"));
    }
}
