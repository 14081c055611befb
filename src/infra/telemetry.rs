use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
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
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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
            "vetrina_cache_local_hit_total",
            Unit::Count,
            "Total number of in-process cache hits."
        );
        describe_counter!(
            "vetrina_cache_local_miss_total",
            Unit::Count,
            "Total number of in-process cache misses."
        );
        describe_counter!(
            "vetrina_cache_remote_hit_total",
            Unit::Count,
            "Total number of remote cache hits."
        );
        describe_counter!(
            "vetrina_cache_remote_miss_total",
            Unit::Count,
            "Total number of remote cache misses."
        );
        describe_counter!(
            "vetrina_cache_remote_failure_total",
            Unit::Count,
            "Total number of failed remote cache operations."
        );
        describe_counter!(
            "vetrina_cache_remote_degraded_total",
            Unit::Count,
            "Total number of transitions into degraded remote mode."
        );
        describe_counter!(
            "vetrina_cache_remote_recovered_total",
            Unit::Count,
            "Total number of recoveries from degraded remote mode."
        );
        describe_histogram!(
            "vetrina_cache_consume_ms",
            Unit::Milliseconds,
            "Cache consumption latency in milliseconds."
        );
        describe_histogram!(
            "vetrina_cache_warm_ms",
            Unit::Milliseconds,
            "Cache warm phase latency in milliseconds."
        );
    });
}
