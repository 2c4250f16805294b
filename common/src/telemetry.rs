// Telemetry module for structured logging, metrics, and tracing

use crate::models::TriggerKind;
use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const SERVICE_NAME: &str = "session-notify";

/// Initialize structured logging with JSON formatting
///
/// `RUST_LOG` takes precedence over `log_level`. When `tracing_endpoint` is set,
/// spans are also exported over OTLP.
pub fn init_logging(log_level: &str, tracing_endpoint: Option<&str>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_filter(env_filter);

    let registry = tracing_subscriber::registry().with(json_layer);

    if let Some(endpoint) = tracing_endpoint {
        let tracer = init_tracer(endpoint)?;
        registry
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        registry
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(
        log_level = log_level,
        tracing_endpoint = tracing_endpoint,
        "Structured logging initialized"
    );

    Ok(())
}

/// Initialize an OpenTelemetry tracer exporting to an OTLP collector
fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());
    let tracer = tracer_provider.tracer(SERVICE_NAME);

    tracing::info!(endpoint = endpoint, "OpenTelemetry tracer initialized");
    Ok(tracer)
}

/// Flush remaining spans on shutdown
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Register metric descriptions with whichever recorder is installed
pub fn describe_metrics() {
    describe_counter!(
        "notification_triggers_armed_total",
        "Number of notification triggers armed"
    );
    describe_counter!(
        "notification_delivered_total",
        "Number of push notifications accepted by the push service"
    );
    describe_counter!(
        "notification_delivery_failed_total",
        "Number of push notifications the push service did not accept"
    );
    describe_counter!(
        "notification_history_append_failed_total",
        "Number of delivered notifications missing from the history log"
    );
    describe_gauge!(
        "notification_triggers_pending",
        "Triggers currently armed and waiting to fire"
    );
}

#[inline]
pub fn record_trigger_armed(kind: TriggerKind) {
    counter!("notification_triggers_armed_total", "kind" => kind.as_str()).increment(1);
}

#[inline]
pub fn record_delivery_success(kind: &str) {
    counter!("notification_delivered_total", "kind" => kind.to_string()).increment(1);
}

#[inline]
pub fn record_delivery_failure(kind: &str, reason: &str) {
    counter!(
        "notification_delivery_failed_total",
        "kind" => kind.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_history_failure() {
    counter!("notification_history_append_failed_total").increment(1);
}

#[inline]
pub fn update_pending_triggers(count: usize) {
    gauge!("notification_triggers_pending").set(count as f64);
}
