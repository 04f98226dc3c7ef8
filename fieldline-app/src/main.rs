//! Fieldline demo
//!
//! Boots the services from the environment, queues a burst of validations
//! and passes an event between two contexts on the same hub.

use std::time::Duration;

use fieldline_app::{init_tracing, AppConfig, AppServices};
use fieldline_core::constants::{KIND_CLIENT_ASSIGNMENT, KIND_PERMISSIONS};
use fieldline_core::{event_data, BusEventType, FieldlineResult, OperationError, ValidationOptions};
use serde_json::{json, Value};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> FieldlineResult<()> {
    let config = AppConfig::from_env();
    init_tracing(&config.telemetry)?;

    let services = AppServices::new(config);
    run_validation_burst(&services).await?;
    run_cross_context_exchange(&services).await?;

    let metrics = services.scheduler().metrics();
    tracing::info!(
        enqueued = metrics.tasks_enqueued,
        settled = metrics.tasks_settled(),
        cache_hits = metrics.cache_hits,
        coalesced = metrics.coalesced,
        "Demo finished"
    );

    services.shutdown();
    Ok(())
}

async fn fetch_permissions(user_id: &'static str) -> Result<Value, OperationError> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(json!({ "userId": user_id, "roles": ["viewer", "editor"] }))
}

async fn check_client_assignment(user_id: &'static str) -> Result<Value, OperationError> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(json!({ "userId": user_id, "clientId": "c-42", "assigned": true }))
}

/// Three requests, two of them for the same kind: the duplicate joins the
/// first and only two operations run.
async fn run_validation_burst(services: &AppServices) -> FieldlineResult<()> {
    let scheduler = services.scheduler();
    let (permissions, assignment, duplicate) = tokio::join!(
        scheduler.queue_validation(
            KIND_PERMISSIONS,
            || fetch_permissions("u1"),
            ValidationOptions::default()
        ),
        scheduler.queue_validation(
            KIND_CLIENT_ASSIGNMENT,
            || check_client_assignment("u1"),
            ValidationOptions::default()
        ),
        scheduler.queue_validation(
            KIND_PERMISSIONS,
            || fetch_permissions("u1"),
            ValidationOptions::default()
        ),
    );

    let (permissions, assignment, duplicate) = (permissions?, assignment?, duplicate?);
    tracing::info!(
        permissions = %permissions,
        assignment = %assignment,
        duplicate = %duplicate,
        "Validation burst settled"
    );

    // Served from the record without running anything.
    let cached = scheduler
        .queue_validation(
            KIND_PERMISSIONS,
            || fetch_permissions("u1"),
            ValidationOptions::default(),
        )
        .await?;
    tracing::info!(cached = %cached, "Permissions served from record");
    Ok(())
}

/// Publish from a second context and watch it arrive in the first.
async fn run_cross_context_exchange(services: &AppServices) -> FieldlineResult<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = services.bus().subscribe(move |event| {
        let _ = tx.send(event.clone());
    });

    let other = services.attach_context();
    let published = other.publish(
        BusEventType::PermissionsUpdated,
        event_data(json!({ "userId": "u1" })),
    )?;
    tracing::info!(event_id = %published.id, origin = %other.context_id(), "Published from second context");

    match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
        Ok(Some(event)) => tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            subject = ?event.subject_id(),
            permissions_recent = services.scheduler().is_validation_recent(KIND_PERMISSIONS),
            "Received event in first context"
        ),
        _ => tracing::warn!(event_id = %published.id, "Event did not arrive"),
    }

    other.close();
    Ok(())
}
