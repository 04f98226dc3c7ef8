//! Fieldline App - Service Wiring
//!
//! Builds the validation scheduler and the cross-context bus once at
//! startup and hands them to the rest of the application through
//! [`AppServices`]. Nothing in the workspace holds global instances.

pub mod telemetry;

use fieldline_core::constants::{KIND_CLIENT_ASSIGNMENT, KIND_PERMISSIONS};
use fieldline_core::{BusConfig, BusEvent, BusEventType, SchedulerConfig, TelemetryConfig};
use fieldline_events::{CrossTabBus, LocalSignalHub, Subscription};
use fieldline_scheduler::ValidationScheduler;
use std::sync::Arc;
use tracing::{debug, info};

pub use telemetry::init_tracing;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for every Fieldline service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub bus: BusConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Read every section from `FIELDLINE_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            scheduler: SchedulerConfig::from_env(),
            bus: BusConfig::from_env(),
            telemetry: TelemetryConfig::from_env(),
        }
    }

    /// Short scheduler windows and debug logging.
    pub fn development() -> Self {
        Self {
            scheduler: SchedulerConfig::development(),
            telemetry: TelemetryConfig {
                filter: "fieldline=debug,info".to_string(),
                ..TelemetryConfig::default()
            },
            ..Self::default()
        }
    }
}

/// Validation kind whose cached result an event makes stale, if any.
pub fn invalidated_kind(event: &BusEvent) -> Option<&'static str> {
    match BusEventType::from(event.event_type.as_str()) {
        BusEventType::PermissionsUpdated => Some(KIND_PERMISSIONS),
        BusEventType::ClientMappingUpdated => Some(KIND_CLIENT_ASSIGNMENT),
        _ => None,
    }
}

// ============================================================================
// SERVICES
// ============================================================================

/// The scheduler and bus for one application context.
///
/// Permission and client-mapping events, from this context or any other,
/// clear the matching validation record so the next request re-runs it.
pub struct AppServices {
    config: AppConfig,
    scheduler: ValidationScheduler,
    hub: Arc<LocalSignalHub>,
    bus: CrossTabBus,
    _invalidation: Subscription,
}

impl AppServices {
    /// Build services on a fresh in-process hub.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: AppConfig) -> Self {
        let hub = Arc::new(LocalSignalHub::from_config(&config.bus));
        Self::with_hub(config, hub)
    }

    /// Build services attached to an existing hub, sharing it with other
    /// contexts.
    pub fn with_hub(config: AppConfig, hub: Arc<LocalSignalHub>) -> Self {
        let scheduler = ValidationScheduler::new(config.scheduler.clone());
        let bus = CrossTabBus::attach(hub.clone(), &config.bus);

        let invalidated = scheduler.clone();
        let invalidation = bus.subscribe(move |event| {
            if let Some(kind) = invalidated_kind(event) {
                debug!(kind, event_type = %event.event_type, "Invalidating validation record");
                invalidated.clear_cache(Some(kind));
            }
        });

        info!(context_id = %bus.context_id(), "Fieldline services started");

        Self {
            config,
            scheduler,
            hub,
            bus,
            _invalidation: invalidation,
        }
    }

    /// Build services from `FIELDLINE_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(AppConfig::from_env())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &ValidationScheduler {
        &self.scheduler
    }

    pub fn bus(&self) -> &CrossTabBus {
        &self.bus
    }

    pub fn hub(&self) -> Arc<LocalSignalHub> {
        Arc::clone(&self.hub)
    }

    /// Attach another context to the same hub.
    pub fn attach_context(&self) -> CrossTabBus {
        CrossTabBus::attach(self.hub.clone(), &self.config.bus)
    }

    /// Forget every validation record and zero the scheduler counters.
    pub fn reset(&self) {
        self.scheduler.reset();
        info!(context_id = %self.bus.context_id(), "Fieldline services reset");
    }

    /// Stop receiving events from other contexts.
    pub fn shutdown(&self) {
        self.bus.close();
        info!(context_id = %self.bus.context_id(), "Fieldline services stopped");
    }
}

impl std::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppServices")
            .field("config", &self.config)
            .field("scheduler", &self.scheduler)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldline_core::{event_data, OperationError, ValidationOptions};
    use serde_json::{json, Map, Value};
    use std::time::Duration;

    fn user_data() -> Map<String, Value> {
        event_data(json!({ "userId": "u1" }))
    }

    async fn seed(services: &AppServices, kind: &str) {
        services
            .scheduler()
            .queue_validation(
                kind.to_string(),
                || async { Ok::<_, OperationError>(json!({ "ok": true })) },
                ValidationOptions::default(),
            )
            .await
            .expect("seed validation");
    }

    #[test]
    fn test_invalidated_kind() {
        let permissions = BusEvent::new(BusEventType::PermissionsUpdated, Map::new());
        let mapping = BusEvent::new(BusEventType::ClientMappingUpdated, Map::new());
        let status = BusEvent::new(BusEventType::UserStatusUpdated, Map::new());

        assert_eq!(invalidated_kind(&permissions), Some(KIND_PERMISSIONS));
        assert_eq!(invalidated_kind(&mapping), Some(KIND_CLIENT_ASSIGNMENT));
        assert_eq!(invalidated_kind(&status), None);

        let spelled = BusEvent {
            event_type: BusEventType::Other("permissions-updated".to_string()),
            ..permissions.clone()
        };
        assert_eq!(invalidated_kind(&spelled), Some(KIND_PERMISSIONS));
    }

    #[test]
    fn test_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.scheduler, SchedulerConfig::development());
        assert_eq!(config.bus, BusConfig::default());
        assert!(config.telemetry.filter.contains("fieldline=debug"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_event_invalidates_record() {
        let services = AppServices::new(AppConfig::default());
        seed(&services, KIND_PERMISSIONS).await;
        seed(&services, KIND_CLIENT_ASSIGNMENT).await;
        assert!(services.scheduler().is_validation_recent(KIND_PERMISSIONS));

        services
            .bus()
            .publish(BusEventType::PermissionsUpdated, user_data())
            .expect("publish");

        assert!(!services.scheduler().is_validation_recent(KIND_PERMISSIONS));
        assert!(services.scheduler().is_validation_recent(KIND_CLIENT_ASSIGNMENT));
    }

    #[tokio::test]
    async fn test_remote_event_invalidates_record() {
        let config = AppConfig {
            scheduler: SchedulerConfig {
                pacing: Duration::ZERO,
                ..SchedulerConfig::default()
            },
            ..AppConfig::default()
        };
        let services = AppServices::new(config);
        seed(&services, KIND_CLIENT_ASSIGNMENT).await;

        let other = services.attach_context();
        other
            .publish(BusEventType::ClientMappingUpdated, user_data())
            .expect("publish");

        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while services.scheduler().is_validation_recent(KIND_CLIENT_ASSIGNMENT) {
            assert!(tokio::time::Instant::now() < deadline, "record never invalidated");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_records_and_metrics() {
        let services = AppServices::new(AppConfig::default());
        seed(&services, KIND_PERMISSIONS).await;
        assert_eq!(services.scheduler().metrics().tasks_succeeded, 1);

        services.reset();

        assert!(services.scheduler().get_cached_result(KIND_PERMISSIONS).is_none());
        assert_eq!(services.scheduler().metrics().tasks_succeeded, 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_listener() {
        let services = AppServices::new(AppConfig::default());
        assert!(services.bus().is_listening());
        services.shutdown();
        assert!(!services.bus().is_listening());
    }
}
