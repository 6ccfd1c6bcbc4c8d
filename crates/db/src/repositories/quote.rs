use sqlx::{sqlite::SqliteRow, Row};

use kirana_core::domain::quote::{B2bQuote, B2bQuoteId, B2bQuoteStatus, QuoteLine};
use kirana_core::domain::user::UserId;

use super::{
    parse_decimal, parse_optional_decimal, parse_timestamp, parse_u32, QuoteRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlQuoteRepository {
    pool: DbPool,
}

impl SqlQuoteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl QuoteRepository for SqlQuoteRepository {
    async fn find_by_id(&self, id: &B2bQuoteId) -> Result<Option<B2bQuote>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, status, company_name, notes, accounting_estimate_id, created_at
             FROM b2b_quote WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let line_rows = sqlx::query(
            "SELECT description, quantity, unit_price, tax_rate
             FROM b2b_quote_line WHERE quote_id = ? ORDER BY id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        let lines =
            line_rows.into_iter().map(line_from_row).collect::<Result<Vec<QuoteLine>, _>>()?;

        Ok(Some(quote_from_row(row, lines)?))
    }

    async fn set_estimate_id(
        &self,
        id: &B2bQuoteId,
        estimate_id: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE b2b_quote SET accounting_estimate_id = ? WHERE id = ?")
            .bind(estimate_id)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn quote_from_row(row: SqliteRow, lines: Vec<QuoteLine>) -> Result<B2bQuote, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = B2bQuoteStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown quote status `{status_raw}`")))?;

    Ok(B2bQuote {
        id: B2bQuoteId(row.try_get("id")?),
        user_id: UserId(row.try_get("user_id")?),
        status,
        company_name: row.try_get("company_name")?,
        notes: row.try_get("notes")?,
        lines,
        accounting_estimate_id: row.try_get("accounting_estimate_id")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn line_from_row(row: SqliteRow) -> Result<QuoteLine, RepositoryError> {
    Ok(QuoteLine {
        description: row.try_get("description")?,
        quantity: parse_u32("quantity", row.try_get("quantity")?)?,
        unit_price: parse_decimal("unit_price", row.try_get("unit_price")?)?,
        tax_rate: parse_optional_decimal("tax_rate", row.try_get("tax_rate")?)?,
    })
}
