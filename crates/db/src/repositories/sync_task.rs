use chrono::{DateTime, Duration, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use kirana_core::domain::sync::{
    SyncEntityType, SyncOperation, SyncTask, SyncTaskId, SyncTaskStatus, TargetService,
};

use super::{
    parse_optional_timestamp, parse_timestamp, parse_u32, RepositoryError, SyncTaskRepository,
};
use crate::DbPool;

pub struct SqlSyncTaskRepository {
    pool: DbPool,
}

impl SqlSyncTaskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const TASK_COLUMNS: &str = "id, entity_type, entity_id, operation, target_service, \
     target_entity_type, status, attempt_count, max_attempts, next_retry_at, error_message, \
     request_payload, response_payload, claimed_at, created_at, updated_at";

#[async_trait::async_trait]
impl SyncTaskRepository for SqlSyncTaskRepository {
    async fn save(&self, task: SyncTask) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO sync_task (
                id,
                entity_type,
                entity_id,
                operation,
                target_service,
                target_entity_type,
                status,
                attempt_count,
                max_attempts,
                next_retry_at,
                error_message,
                request_payload,
                response_payload,
                claimed_at,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                attempt_count = excluded.attempt_count,
                max_attempts = excluded.max_attempts,
                next_retry_at = excluded.next_retry_at,
                error_message = excluded.error_message,
                request_payload = excluded.request_payload,
                response_payload = excluded.response_payload,
                claimed_at = excluded.claimed_at,
                updated_at = excluded.updated_at",
        )
        .bind(&task.id.0)
        .bind(task.entity_type.as_str())
        .bind(&task.entity_id)
        .bind(task.operation.as_str())
        .bind(task.target_service.as_str())
        .bind(&task.target_entity_type)
        .bind(task.status.as_str())
        .bind(i64::from(task.attempt_count))
        .bind(i64::from(task.max_attempts))
        .bind(task.next_retry_at.map(|value| value.to_rfc3339()))
        .bind(task.error_message.as_deref())
        .bind(task.request_payload.as_deref())
        .bind(task.response_payload.as_deref())
        .bind(task.claimed_at.map(|value| value.to_rfc3339()))
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &SyncTaskId) -> Result<Option<SyncTask>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM sync_task WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(task_from_row).transpose()
    }

    async fn claim_due(
        &self,
        limit: u32,
        now: DateTime<Utc>,
        claim_timeout_secs: i64,
    ) -> Result<Vec<SyncTask>, RepositoryError> {
        let now_raw = now.to_rfc3339();
        let stale_cutoff = (now - Duration::seconds(claim_timeout_secs)).to_rfc3339();

        let candidate_ids: Vec<String> = sqlx::query(
            "SELECT id FROM sync_task
             WHERE (status = 'pending' OR (status = 'retrying' AND next_retry_at <= ?))
               AND (claimed_at IS NULL OR claimed_at < ?)
             ORDER BY created_at ASC
             LIMIT ?",
        )
        .bind(&now_raw)
        .bind(&stale_cutoff)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| row.get::<String, _>("id"))
        .collect();

        let mut claimed = Vec::with_capacity(candidate_ids.len());
        for id in candidate_ids {
            // Conditional update restricted to the expected prior state; a
            // concurrent pass that claimed first leaves rows_affected at 0.
            let result = sqlx::query(
                "UPDATE sync_task
                 SET claimed_at = ?
                 WHERE id = ?
                   AND status IN ('pending', 'retrying')
                   AND (claimed_at IS NULL OR claimed_at < ?)",
            )
            .bind(&now_raw)
            .bind(&id)
            .bind(&stale_cutoff)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                if let Some(task) = self.find_by_id(&SyncTaskId(id)).await? {
                    claimed.push(task);
                }
            }
        }

        Ok(claimed)
    }

    async fn status_counts(&self) -> Result<Vec<(SyncTaskStatus, i64)>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM sync_task GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let raw = row.get::<String, _>("status");
                let status = SyncTaskStatus::parse(&raw).ok_or_else(|| {
                    RepositoryError::Decode(format!("unknown sync task status `{raw}`"))
                })?;
                Ok((status, row.get::<i64, _>("count")))
            })
            .collect()
    }
}

fn task_from_row(row: SqliteRow) -> Result<SyncTask, RepositoryError> {
    let entity_raw = row.try_get::<String, _>("entity_type")?;
    let entity_type = SyncEntityType::parse(&entity_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown entity type `{entity_raw}`")))?;

    let operation_raw = row.try_get::<String, _>("operation")?;
    let operation = SyncOperation::parse(&operation_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown operation `{operation_raw}`")))?;

    let service_raw = row.try_get::<String, _>("target_service")?;
    let target_service = TargetService::parse(&service_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown target service `{service_raw}`")))?;

    let status_raw = row.try_get::<String, _>("status")?;
    let status = SyncTaskStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown sync task status `{status_raw}`")))?;

    Ok(SyncTask {
        id: SyncTaskId(row.try_get("id")?),
        entity_type,
        entity_id: row.try_get("entity_id")?,
        operation,
        target_service,
        target_entity_type: row.try_get("target_entity_type")?,
        status,
        attempt_count: parse_u32("attempt_count", row.try_get("attempt_count")?)?,
        max_attempts: parse_u32("max_attempts", row.try_get("max_attempts")?)?,
        next_retry_at: parse_optional_timestamp("next_retry_at", row.try_get("next_retry_at")?)?,
        error_message: row.try_get("error_message")?,
        request_payload: row.try_get("request_payload")?,
        response_payload: row.try_get("response_payload")?,
        claimed_at: parse_optional_timestamp("claimed_at", row.try_get("claimed_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
