use sqlx::{sqlite::SqliteRow, Row};

use kirana_core::domain::sync::{Credential, TargetService};

use super::{parse_timestamp, CredentialRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCredentialRepository {
    pool: DbPool,
}

impl SqlCredentialRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CredentialRepository for SqlCredentialRepository {
    async fn find(&self, service: TargetService) -> Result<Option<Credential>, RepositoryError> {
        let row = sqlx::query(
            "SELECT service, access_token, refresh_token, expires_at, scope, updated_at
             FROM service_credential WHERE service = ?",
        )
        .bind(service.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(credential_from_row).transpose()
    }

    async fn upsert(&self, credential: Credential) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO service_credential (
                service, access_token, refresh_token, expires_at, scope, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(service) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                scope = excluded.scope,
                updated_at = excluded.updated_at",
        )
        .bind(credential.service.as_str())
        .bind(&credential.access_token)
        .bind(credential.refresh_token.as_deref())
        .bind(credential.expires_at.to_rfc3339())
        .bind(credential.scope.as_deref())
        .bind(credential.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, service: TargetService) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM service_credential WHERE service = ?")
            .bind(service.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn credential_from_row(row: SqliteRow) -> Result<Credential, RepositoryError> {
    let service_raw = row.try_get::<String, _>("service")?;
    let service = TargetService::parse(&service_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown target service `{service_raw}`")))?;

    Ok(Credential {
        service,
        access_token: row.try_get("access_token")?,
        refresh_token: row.try_get("refresh_token")?,
        expires_at: parse_timestamp("expires_at", row.try_get("expires_at")?)?,
        scope: row.try_get("scope")?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
