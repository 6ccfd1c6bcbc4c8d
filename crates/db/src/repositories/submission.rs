use sqlx::{sqlite::SqliteRow, Row};

use kirana_core::domain::submission::{ContactSubmission, SubmissionId};

use super::{parse_timestamp, RepositoryError, SubmissionRepository};
use crate::DbPool;

pub struct SqlSubmissionRepository {
    pool: DbPool,
}

impl SqlSubmissionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SubmissionRepository for SqlSubmissionRepository {
    async fn find_by_id(
        &self,
        id: &SubmissionId,
    ) -> Result<Option<ContactSubmission>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, display_name, email, phone, message, created_at
             FROM contact_submission WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(submission_from_row).transpose()
    }
}

fn submission_from_row(row: SqliteRow) -> Result<ContactSubmission, RepositoryError> {
    Ok(ContactSubmission {
        id: SubmissionId(row.try_get("id")?),
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        message: row.try_get("message")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
