use opentelemetry::{
    KeyValue,
    global,
    metrics::Counter,
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use sentry::ClientInitGuard;
use sentry_tracing::EventFilter;
use tracing_subscriber::{
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::{
    OtelConfig,
    SentryConfig,
};

const METER_NAME: &str = "shardroute";

pub fn init_tracing_and_sentry(sentry_config: SentryConfig) -> Option<ClientInitGuard> {
    let guard = if sentry_config.dsn.is_empty() {
        None
    } else {
        Some(sentry::init((
            sentry_config.dsn,
            sentry::ClientOptions {
                release: Some(env!("CARGO_PKG_VERSION").into()),
                traces_sample_rate: sentry_config.sample_rate,
                ..Default::default()
            },
        )))
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    let sentry_layer = sentry_tracing::layer().event_filter(|md| match md.level() {
        &tracing::Level::ERROR => EventFilter::Event,
        _ => EventFilter::Ignore,
    });

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(fmt_layer)
        .with(sentry_layer)
        .init();

    guard
}

pub fn init_otel_metrics(otel_config: OtelConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if otel_config.endpoint.is_empty() {
        tracing::info!("No OTEL endpoint configured, skipping metrics initialization");
        return Ok(());
    }

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_http()
        .with_endpoint(&otel_config.endpoint)
        .build()?;

    let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .with_resource(
            Resource::builder()
                .with_attributes(vec![KeyValue::new("service.name", "shardroute")])
                .build(),
        )
        .build();

    global::set_meter_provider(provider);
    tracing::info!(
        "OpenTelemetry metrics initialized with OTLP exporter endpoint: {}",
        otel_config.endpoint
    );
    Ok(())
}

/// Counters recorded by the routing tree. Without an installed meter
/// provider these are no-ops.
#[derive(Clone)]
pub struct TreeMetrics {
    resolve_counter: Counter<u64>,
    mutation_counter: Counter<u64>,
}

impl TreeMetrics {
    pub fn new() -> Self {
        let meter = global::meter(METER_NAME);
        Self {
            resolve_counter: meter.u64_counter("shardroute_resolve_total").build(),
            mutation_counter: meter.u64_counter("shardroute_path_mutations_total").build(),
        }
    }

    /// `outcome` is `hit` or `miss`.
    pub fn record_resolve(&self, outcome: &'static str) {
        self.resolve_counter.add(1, &[KeyValue::new("outcome", outcome)]);
    }

    pub fn record_mutation(&self, op: &'static str) {
        self.mutation_counter.add(1, &[KeyValue::new("op", op)]);
    }
}

impl Default for TreeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
