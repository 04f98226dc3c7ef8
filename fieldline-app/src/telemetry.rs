//! Tracing subscriber initialization.

use fieldline_core::{FieldlineError, FieldlineResult, TelemetryConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG`, when set, takes precedence over `config.filter`. Call once
/// at startup; a second call fails because a global subscriber is already
/// installed.
pub fn init_tracing(config: &TelemetryConfig) -> FieldlineResult<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| FieldlineError::Telemetry {
            reason: format!("Invalid log filter {:?}: {}", config.filter, e),
        })?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| FieldlineError::Telemetry {
        reason: format!("Failed to init subscriber: {}", e),
    })?;

    tracing::info!(filter = %config.filter, json = config.json, "Telemetry initialized");
    Ok(())
}
