use sqlx::{sqlite::SqliteRow, Row};

use kirana_core::domain::user::{User, UserId};

use super::{RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, email, first_name, last_name, company, phone, gstin, segment,
                    crm_contact_id, accounting_contact_id
             FROM app_user WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(user_from_row))
    }

    async fn set_crm_contact_id(
        &self,
        id: &UserId,
        contact_id: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE app_user SET crm_contact_id = ? WHERE id = ?")
            .bind(contact_id)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_accounting_contact_id(
        &self,
        id: &UserId,
        contact_id: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE app_user SET accounting_contact_id = ? WHERE id = ?")
            .bind(contact_id)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn user_from_row(row: SqliteRow) -> User {
    User {
        id: UserId(row.get("id")),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        company: row.get("company"),
        phone: row.get("phone"),
        gstin: row.get("gstin"),
        segment: row.get("segment"),
        crm_contact_id: row.get("crm_contact_id"),
        accounting_contact_id: row.get("accounting_contact_id"),
    }
}
