use sqlx::Row;

use kirana_core::domain::sync::{InventorySyncLog, SyncLogStatus};

use super::{InventoryLogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlInventoryLogRepository {
    pool: DbPool,
}

impl SqlInventoryLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl InventoryLogRepository for SqlInventoryLogRepository {
    async fn append(&self, log: InventorySyncLog) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO inventory_sync_log (
                variant_id, operation, local_quantity, remote_quantity,
                difference, status, message, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&log.variant_id)
        .bind(log.operation.as_str())
        .bind(log.local_quantity)
        .bind(log.remote_quantity)
        .bind(log.difference)
        .bind(log.status.as_str())
        .bind(log.message.as_deref())
        .bind(log.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn status_counts(&self) -> Result<Vec<(SyncLogStatus, i64)>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM inventory_sync_log
             GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let raw = row.get::<String, _>("status");
                let status = SyncLogStatus::parse(&raw).ok_or_else(|| {
                    RepositoryError::Decode(format!("unknown inventory log status `{raw}`"))
                })?;
                Ok((status, row.get::<i64, _>("count")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use kirana_core::domain::sync::{InventoryOp, InventorySyncLog, SyncLogStatus};

    use super::SqlInventoryLogRepository;
    use crate::migrations;
    use crate::repositories::InventoryLogRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn sample_log(status: SyncLogStatus) -> InventorySyncLog {
        InventorySyncLog {
            variant_id: "V-1".to_string(),
            operation: InventoryOp::Pull,
            local_quantity: 12,
            remote_quantity: Some(9),
            difference: Some(-3),
            status,
            message: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn appended_rows_show_up_in_status_counts() {
        let pool = setup_pool().await;
        let repo = SqlInventoryLogRepository::new(pool.clone());

        repo.append(sample_log(SyncLogStatus::Success)).await.expect("append");
        repo.append(sample_log(SyncLogStatus::Success)).await.expect("append");
        repo.append(sample_log(SyncLogStatus::Skipped)).await.expect("append");

        let counts = repo.status_counts().await.expect("counts");
        assert!(counts.contains(&(SyncLogStatus::Success, 2)));
        assert!(counts.contains(&(SyncLogStatus::Skipped, 1)));

        pool.close().await;
    }
}
