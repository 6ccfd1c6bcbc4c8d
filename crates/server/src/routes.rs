//! Operator-facing HTTP surface: OAuth connect/callback wiring for the
//! external services, sync task enqueueing, manual dispatch passes, and
//! queue statistics.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::Row;
use tracing::error;
use uuid::Uuid;

use kirana_connect::{AccountingSyncAdapter, AdapterError, TokenManager};
use kirana_core::domain::sync::{SyncEntityType, SyncOperation, TargetService};
use kirana_core::sync_engine::NewSyncTask;
use kirana_db::repositories::{InventoryLogRepository, RepositoryError, SyncTaskRepository};
use kirana_db::DbPool;
use kirana_sync::{DispatchError, SyncDispatcher, SyncQueue};

const OAUTH_STATE_TTL_MINUTES: i64 = 10;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub tokens: Arc<TokenManager>,
    pub queue: Arc<SyncQueue>,
    pub dispatcher: Arc<SyncDispatcher>,
    pub accounting: Arc<AccountingSyncAdapter>,
    pub tasks: Arc<dyn SyncTaskRepository>,
    pub inventory_log: Arc<dyn InventoryLogRepository>,
    pub dispatch_batch_size: u32,
    pub inventory_batch_size: u32,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/oauth/{service}/connect", get(oauth_connect))
        .route("/oauth/{service}/callback", get(oauth_callback))
        .route("/oauth/{service}/disconnect", post(oauth_disconnect))
        .route("/sync/tasks", post(enqueue_task))
        .route("/sync/dispatch", post(run_dispatch))
        .route("/sync/stats", get(sync_stats))
        .route("/inventory/batch-push", post(inventory_batch_push))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type Rejection = (StatusCode, Json<ApiError>);

#[derive(Debug, Serialize)]
pub struct OauthConnectResponse {
    pub service: String,
    pub authorization_url: String,
    pub state_token: String,
    pub state_expires_at: String,
}

#[derive(Debug, Deserialize)]
pub struct OauthCallbackQuery {
    pub state: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OauthConnectionResponse {
    pub service: String,
    pub status: &'static str,
    pub token_expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueTaskRequest {
    pub entity_type: String,
    pub entity_id: String,
    pub operation: String,
    pub target_service: String,
    #[serde(default)]
    pub target_entity_type: Option<String>,
    #[serde(default)]
    pub request_payload: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub task_id: String,
    pub status: String,
    pub entity_type: String,
    pub entity_id: String,
    pub target_service: String,
    pub target_entity_type: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct DispatchQuery {
    #[serde(default)]
    pub batch_size: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub claimed: u32,
    pub succeeded: u32,
    pub skipped: u32,
    pub retried: u32,
    pub failed: u32,
}

#[derive(Debug, Serialize)]
pub struct SyncStatsResponse {
    pub tasks: BTreeMap<String, i64>,
    pub inventory: BTreeMap<String, i64>,
}

#[derive(Debug, Deserialize)]
pub struct BatchPushQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct BatchPushResponse {
    pub processed: u32,
    pub errored: u32,
}

pub async fn oauth_connect(
    Path(service_raw): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<OauthConnectResponse>, Rejection> {
    let service = parse_service(&service_raw)?;
    let config = state.tokens.service_config(service);
    let redirect_uri = config
        .redirect_uri
        .clone()
        .ok_or_else(|| bad_request(format!("{service} redirect_uri is not configured")))?;
    let scope = config.scope.clone();

    let state_token = Uuid::new_v4().simple().to_string();
    let authorization_url =
        state.tokens.authorize_url(service, &state_token).map_err(adapter_error)?;

    let now = Utc::now();
    let expires_at = now + Duration::minutes(OAUTH_STATE_TTL_MINUTES);
    sqlx::query(
        "INSERT INTO oauth_state (state_token, service, redirect_uri, scope, requested_at, expires_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&state_token)
    .bind(service.as_str())
    .bind(&redirect_uri)
    .bind(&scope)
    .bind(now.to_rfc3339())
    .bind(expires_at.to_rfc3339())
    .execute(&state.db_pool)
    .await
    .map_err(db_error)?;

    Ok(Json(OauthConnectResponse {
        service: service.as_str().to_string(),
        authorization_url,
        state_token,
        state_expires_at: expires_at.to_rfc3339(),
    }))
}

pub async fn oauth_callback(
    Path(service_raw): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<OauthCallbackQuery>,
) -> Result<Json<OauthConnectionResponse>, Rejection> {
    let service = parse_service(&service_raw)?;

    if let Some(provider_error) = query.error {
        return Err(bad_request(format!(
            "authorization server returned error: {provider_error}"
        )));
    }
    let code = query
        .code
        .ok_or_else(|| bad_request("authorization code missing".to_string()))?;

    let redirect_uri = reserve_oauth_state(&state, service, &query.state).await?;

    let credential = state
        .tokens
        .complete_authorization(service, &code, &redirect_uri)
        .await
        .map_err(adapter_error)?;

    Ok(Json(OauthConnectionResponse {
        service: service.as_str().to_string(),
        status: "connected",
        token_expires_at: Some(credential.expires_at.to_rfc3339()),
    }))
}

pub async fn oauth_disconnect(
    Path(service_raw): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<OauthConnectionResponse>, Rejection> {
    let service = parse_service(&service_raw)?;
    state.tokens.disconnect(service).await.map_err(adapter_error)?;

    Ok(Json(OauthConnectionResponse {
        service: service.as_str().to_string(),
        status: "disconnected",
        token_expires_at: None,
    }))
}

pub async fn enqueue_task(
    State(state): State<AppState>,
    Json(request): Json<EnqueueTaskRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), Rejection> {
    let entity_type = SyncEntityType::parse(&request.entity_type).ok_or_else(|| {
        bad_request(format!("unknown entity type `{}`", request.entity_type))
    })?;
    let operation = SyncOperation::parse(&request.operation)
        .ok_or_else(|| bad_request(format!("unknown operation `{}`", request.operation)))?;
    let target_service = parse_service(&request.target_service)?;
    let target_entity_type = request
        .target_entity_type
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default_target_entity(entity_type, target_service).to_string());

    let task = state
        .queue
        .enqueue(NewSyncTask {
            entity_type,
            entity_id: request.entity_id,
            operation,
            target_service,
            target_entity_type,
            request_payload: request.request_payload,
        })
        .await
        .map_err(repository_error)?;

    Ok((
        StatusCode::CREATED,
        Json(TaskResponse {
            task_id: task.id.0,
            status: task.status.as_str().to_string(),
            entity_type: task.entity_type.as_str().to_string(),
            entity_id: task.entity_id,
            target_service: task.target_service.as_str().to_string(),
            target_entity_type: task.target_entity_type,
            created_at: task.created_at.to_rfc3339(),
        }),
    ))
}

pub async fn run_dispatch(
    State(state): State<AppState>,
    Query(query): Query<DispatchQuery>,
) -> Result<Json<DispatchResponse>, Rejection> {
    let batch_size = query.batch_size.unwrap_or(state.dispatch_batch_size);
    let summary = state.dispatcher.dispatch(batch_size).await.map_err(dispatch_error)?;

    Ok(Json(DispatchResponse {
        claimed: summary.claimed,
        succeeded: summary.succeeded,
        skipped: summary.skipped,
        retried: summary.retried,
        failed: summary.failed,
    }))
}

pub async fn sync_stats(
    State(state): State<AppState>,
) -> Result<Json<SyncStatsResponse>, Rejection> {
    let tasks = state
        .tasks
        .status_counts()
        .await
        .map_err(repository_error)?
        .into_iter()
        .map(|(status, count)| (status.as_str().to_string(), count))
        .collect();
    let inventory = state
        .inventory_log
        .status_counts()
        .await
        .map_err(repository_error)?
        .into_iter()
        .map(|(status, count)| (status.as_str().to_string(), count))
        .collect();

    Ok(Json(SyncStatsResponse { tasks, inventory }))
}

pub async fn inventory_batch_push(
    State(state): State<AppState>,
    Query(query): Query<BatchPushQuery>,
) -> Result<Json<BatchPushResponse>, Rejection> {
    let limit = query.limit.unwrap_or(state.inventory_batch_size);
    let summary = state.accounting.batch_push(limit).await.map_err(adapter_error)?;

    Ok(Json(BatchPushResponse { processed: summary.processed, errored: summary.errored }))
}

/// Looks up a pending state row and marks it consumed. The conditional
/// UPDATE makes replaying a callback with the same token a hard error.
async fn reserve_oauth_state(
    state: &AppState,
    service: TargetService,
    state_token: &str,
) -> Result<String, Rejection> {
    let row = sqlx::query(
        "SELECT redirect_uri, expires_at, consumed_at FROM oauth_state \
         WHERE state_token = ? AND service = ?",
    )
    .bind(state_token)
    .bind(service.as_str())
    .fetch_optional(&state.db_pool)
    .await
    .map_err(db_error)?;

    let Some(row) = row else {
        return Err(bad_request("state token is not recognized".to_string()));
    };

    let consumed_at: Option<String> = row.get("consumed_at");
    if consumed_at.is_some() {
        return Err(bad_request("state token has already been used".to_string()));
    }

    let expires_raw: String = row.get("expires_at");
    let expires_at = DateTime::parse_from_rfc3339(&expires_raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|parse_error| {
            error!(error = %parse_error, "stored oauth state has an unreadable expiry");
            internal_error()
        })?;
    if expires_at <= Utc::now() {
        return Err(bad_request("state token has expired".to_string()));
    }

    let updated = sqlx::query(
        "UPDATE oauth_state SET consumed_at = ? WHERE state_token = ? AND consumed_at IS NULL",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(state_token)
    .execute(&state.db_pool)
    .await
    .map_err(db_error)?;
    if updated.rows_affected() != 1 {
        return Err(bad_request("state token has already been used".to_string()));
    }

    Ok(row.get("redirect_uri"))
}

fn default_target_entity(entity: SyncEntityType, service: TargetService) -> &'static str {
    match (entity, service) {
        (SyncEntityType::User, _) => "Contact",
        (SyncEntityType::Order, _) => "Invoice",
        (SyncEntityType::B2bQuote, TargetService::Accounting) => "Estimate",
        (SyncEntityType::B2bQuote, TargetService::Crm) => "Lead",
        (SyncEntityType::ContactSubmission, _) => "Lead",
        (SyncEntityType::Inventory, _) => "Item",
    }
}

fn parse_service(raw: &str) -> Result<TargetService, Rejection> {
    TargetService::parse(raw)
        .ok_or_else(|| bad_request(format!("target service must be crm or accounting, got `{raw}`")))
}

fn bad_request(message: String) -> Rejection {
    (StatusCode::BAD_REQUEST, Json(ApiError { error: message }))
}

fn internal_error() -> Rejection {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError { error: "an internal error occurred".to_string() }),
    )
}

fn db_error(error: sqlx::Error) -> Rejection {
    error!(error = %error, "database error while serving a request");
    internal_error()
}

fn repository_error(error: RepositoryError) -> Rejection {
    error!(error = %error, "repository error while serving a request");
    internal_error()
}

fn dispatch_error(error: DispatchError) -> Rejection {
    error!(error = %error, "dispatch pass failed");
    internal_error()
}

fn adapter_error(error: AdapterError) -> Rejection {
    match error {
        AdapterError::AuthUnavailable(_) => {
            (StatusCode::PRECONDITION_FAILED, Json(ApiError { error: error.to_string() }))
        }
        AdapterError::Repository(repo_error) => repository_error(repo_error),
        other => (StatusCode::BAD_GATEWAY, Json(ApiError { error: other.to_string() })),
    }
}
