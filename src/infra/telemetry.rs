use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Events go to stderr; stdout is reserved for command output.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "stampede_cache_lookup_total",
            Unit::Count,
            "Cache lookups by strategy and result (hit, null_hit, miss, fresh, stale, corrupt)."
        );
        describe_counter!(
            "stampede_cache_loader_calls_total",
            Unit::Count,
            "Total number of loader invocations by strategy."
        );
        describe_counter!(
            "stampede_cache_rebuild_lock_busy_total",
            Unit::Count,
            "Stale reads that found another rebuild already holding the lock."
        );
        describe_counter!(
            "stampede_rebuild_submitted_total",
            Unit::Count,
            "Total number of rebuild jobs accepted by the worker pool."
        );
        describe_counter!(
            "stampede_rebuild_rejected_total",
            Unit::Count,
            "Total number of rebuild jobs rejected because the queue was full or closed."
        );
        describe_counter!(
            "stampede_rebuild_completed_total",
            Unit::Count,
            "Total number of rebuild jobs that finished successfully."
        );
        describe_counter!(
            "stampede_rebuild_failed_total",
            Unit::Count,
            "Total number of rebuild jobs that returned an error or panicked."
        );
        describe_gauge!(
            "stampede_rebuild_queue_len",
            Unit::Count,
            "Current number of rebuild jobs waiting for a worker."
        );
        describe_histogram!(
            "stampede_rebuild_ms",
            Unit::Milliseconds,
            "Rebuild job latency in milliseconds."
        );
    });
}
