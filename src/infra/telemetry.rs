use std::sync::Once;

use metrics::{Unit, describe_counter};
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
            "kovert_catalog_cache_hit_total",
            Unit::Count,
            "Total number of catalog reads served from the fresh snapshot."
        );
        describe_counter!(
            "kovert_catalog_cache_miss_total",
            Unit::Count,
            "Total number of catalog reads that found the snapshot absent or stale."
        );
        describe_counter!(
            "kovert_catalog_refresh_total",
            Unit::Count,
            "Total number of catalog refresh flights started."
        );
        describe_counter!(
            "kovert_catalog_stale_served_total",
            Unit::Count,
            "Total number of reads served the previous snapshot after a failed refresh."
        );
        describe_counter!(
            "kovert_page_cache_hit_total",
            Unit::Count,
            "Total number of page responses served from the response cache."
        );
        describe_counter!(
            "kovert_page_cache_miss_total",
            Unit::Count,
            "Total number of page requests that executed the handler."
        );
        describe_counter!(
            "kovert_page_revalidation_total",
            Unit::Count,
            "Total number of page revalidation signals issued."
        );
        describe_counter!(
            "kovert_page_revalidation_failed_total",
            Unit::Count,
            "Total number of page revalidation signals that failed."
        );
    });
}
