//! Readiness probe for the sync subsystem: database reachability plus a
//! queue snapshot so operators can see backlog and dead tasks at a glance.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use kirana_core::domain::sync::SyncTaskStatus;
use kirana_db::repositories::SyncTaskRepository;
use kirana_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    tasks: Arc<dyn SyncTaskRepository>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub queue: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, tasks: Arc<dyn SyncTaskRepository>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, tasks })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let queue = queue_check(state.tasks.as_ref()).await;
    let ready = database.status == "ready" && queue.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        queue,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "reachable".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("unreachable: {error}") }
        }
    }
}

async fn queue_check(tasks: &dyn SyncTaskRepository) -> HealthCheck {
    match tasks.status_counts().await {
        Ok(counts) => {
            let count_of = |status: SyncTaskStatus| {
                counts
                    .iter()
                    .find(|(candidate, _)| *candidate == status)
                    .map(|(_, count)| *count)
                    .unwrap_or(0)
            };
            HealthCheck {
                status: "ready",
                detail: format!(
                    "{} pending, {} retrying, {} failed",
                    count_of(SyncTaskStatus::Pending),
                    count_of(SyncTaskStatus::Retrying),
                    count_of(SyncTaskStatus::Failed),
                ),
            }
        }
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("queue query failed: {error}") }
        }
    }
}
