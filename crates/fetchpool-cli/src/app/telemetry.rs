//! # Telemetry Features
//!
//! Console logging is always on. OpenTelemetry export is opt-in.
//!
//! ## Feature matrix
//!
//! - `tracing`: Enables pool log events and OpenTelemetry span export.
//! - `metrics`: Enables OpenTelemetry pool metrics (gauges and counters).
//! - `stdout`: Enables the stdout exporter.
//!
//! ## Feature constraints
//!
//! - `stdout` requires at least one of: `tracing` or `metrics`.
//!
//! ## Metrics behavior
//!
//! - The pool publishes a snapshot after every transition. Gauges record the
//!   latest idle/busy split; counters accumulate the difference between two
//!   consecutive snapshots.
//!
//! ## Example usage
//!
//! ```bash
//! RUST_LOG=debug cargo run --bin fetchpool --features tracing,metrics,stdout
//! ```

// Disallow using `stdout` without `tracing` or `metrics`
#[cfg(all(feature = "stdout", not(any(feature = "tracing", feature = "metrics"))))]
compile_error!(
    "The 'stdout' feature requires at least one of 'tracing' or 'metrics' to be enabled."
);

use fetchpool::PoolStats;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// Metrics-specific imports
#[cfg(feature = "metrics")]
use fetchpool::DispatchMode;
#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Gauge, Meter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

// Either
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_semantic_conventions as semvcns;

// Tracing-specific imports
#[cfg(feature = "tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::trace as sdktrace;

pub struct TelemetryProviders {
    #[cfg(feature = "tracing")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down every exporter. Errors are reported on stderr
    /// since the subscriber may already be gone.
    pub fn shutdown(&self) {
        #[cfg(feature = "tracing")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "tracing")]
    let tracer_provider = init_tracer();

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics();

    #[cfg(any(feature = "metrics", feature = "tracing"))]
    let scope = InstrumentationScope::builder("fetchpool")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    // Always log to the console via `tracing_subscriber::fmt`. This is
    // unrelated to the `opentelemetry_stdout` exporter.
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339()),
        );

    #[cfg(feature = "tracing")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(&meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "tracing")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("fetchpool")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> sdkmetrics::SdkMeterProvider {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::MetricExporter;
        let exporter = MetricExporter::default();
        let reader = sdkmetrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    };

    builder.build()
}

#[cfg(feature = "tracing")]
fn init_tracer() -> sdktrace::SdkTracerProvider {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::SpanExporter;
        let exporter = SpanExporter::default();
        let batch = sdktrace::BatchSpanProcessor::builder(exporter)
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(std::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();
        builder.with_span_processor(batch)
    };

    builder.build()
}

// Metric handles - only compiled when metrics feature is enabled
#[cfg(feature = "metrics")]
static WORKERS_IDLE: OnceLock<Gauge<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static WORKERS_BUSY: OnceLock<Gauge<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static SATURATED: OnceLock<Gauge<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static JOBS_DISPATCHED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static JOBS_COMPLETED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static STALLS: OnceLock<Counter<u64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: &Meter) {
    let _ = WORKERS_IDLE.set(
        meter
            .u64_gauge("workers_idle")
            .with_description("Workers waiting for a job")
            .build(),
    );

    let _ = WORKERS_BUSY.set(
        meter
            .u64_gauge("workers_busy")
            .with_description("Workers serving a job, including retries")
            .build(),
    );

    let _ = SATURATED.set(
        meter
            .u64_gauge("saturated")
            .with_description("1 while the master has stopped accepting submissions")
            .build(),
    );

    let _ = JOBS_DISPATCHED.set(
        meter
            .u64_counter("jobs_dispatched")
            .with_description("Jobs forwarded to a worker")
            .build(),
    );

    let _ = JOBS_COMPLETED.set(
        meter
            .u64_counter("jobs_completed")
            .with_description("Completion notices received from workers")
            .build(),
    );

    let _ = STALLS.set(
        meter
            .u64_counter("stalls")
            .with_description("Transitions into the saturated state")
            .build(),
    );
}

/// Records the transition from `prev` to `next`. Compiles to a no-op when
/// metrics are disabled.
#[cfg(feature = "metrics")]
pub fn record_pool_stats(prev: &PoolStats, next: &PoolStats) {
    fn gauge(handle: &OnceLock<Gauge<u64>>, value: u64) {
        if let Some(gauge) = handle.get() {
            gauge.record(value, &[]);
        }
    }
    fn counter(handle: &OnceLock<Counter<u64>>, delta: u64) {
        if let (Some(counter), true) = (handle.get(), delta > 0) {
            counter.add(delta, &[]);
        }
    }

    gauge(&WORKERS_IDLE, next.idle as u64);
    gauge(&WORKERS_BUSY, next.busy as u64);
    gauge(&SATURATED, u64::from(next.mode == DispatchMode::Saturated));
    counter(&JOBS_DISPATCHED, next.dispatched.saturating_sub(prev.dispatched));
    counter(&JOBS_COMPLETED, next.completed.saturating_sub(prev.completed));
    counter(&STALLS, next.stalls.saturating_sub(prev.stalls));
}

#[cfg(not(feature = "metrics"))]
pub fn record_pool_stats(_prev: &PoolStats, _next: &PoolStats) {}
