use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;

/// Initialize structured logging.
/// `RUST_LOG` wins over the configured level when set.
pub fn init_telemetry(observability: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&observability.log_level))?;

    if observability.json_logs {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .with(filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .with(filter)
            .try_init()?;
    }

    tracing::debug!("soda-workflow telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking the requests of one workflow call
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Create a span with common workflow attributes
pub fn create_workflow_span(operation: &str, dataset_id: &str, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "soda_workflow",
        operation = operation,
        dataset.id = dataset_id,
        correlation.id = correlation_id,
    )
}
