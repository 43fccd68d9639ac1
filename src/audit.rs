use chrono::{DateTime, FixedOffset};
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};
use serde_json::Value;
use uuid::Uuid;

use crate::{entity::audit_logs, error::AppResult, state::AppState};

pub async fn log_audit<C: ConnectionTrait>(
    db: &C,
    actor_id: Option<Uuid>,
    action: &str,
    resource: &str,
    resource_id: Option<Uuid>,
    metadata: Option<Value>,
    at: DateTime<FixedOffset>,
) -> AppResult<()> {
    audit_logs::ActiveModel {
        id: Set(Uuid::new_v4()),
        actor_id: Set(actor_id),
        action: Set(action.to_string()),
        resource: Set(resource.to_string()),
        resource_id: Set(resource_id),
        metadata: Set(metadata),
        created_at: Set(at),
    }
    .insert(db)
    .await?;

    Ok(())
}

/// Record an audit row after a committed mutation; failures are only logged.
pub async fn record(
    state: &AppState,
    actor_id: Option<Uuid>,
    action: &str,
    resource: &str,
    resource_id: Option<Uuid>,
    metadata: Value,
) {
    if let Err(err) = log_audit(
        &state.orm,
        actor_id,
        action,
        resource,
        resource_id,
        Some(metadata),
        state.clock.now_fixed(),
    )
    .await
    {
        tracing::warn!(error = %err, action, "audit log failed");
    }
}
