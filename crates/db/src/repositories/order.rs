use sqlx::{sqlite::SqliteRow, Row};

use kirana_core::domain::order::{Order, OrderId, OrderLine, PaymentStatus};
use kirana_core::domain::user::UserId;

use super::{
    parse_decimal, parse_optional_decimal, parse_timestamp, parse_u32, OrderRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, payment_status, currency, accounting_invoice_id, created_at
             FROM shop_order WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let line_rows = sqlx::query(
            "SELECT description, sku, quantity, unit_price, tax_rate
             FROM shop_order_line WHERE order_id = ? ORDER BY id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        let lines =
            line_rows.into_iter().map(line_from_row).collect::<Result<Vec<OrderLine>, _>>()?;

        Ok(Some(order_from_row(row, lines)?))
    }

    async fn set_invoice_id(
        &self,
        id: &OrderId,
        invoice_id: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE shop_order SET accounting_invoice_id = ? WHERE id = ?")
            .bind(invoice_id)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn order_from_row(row: SqliteRow, lines: Vec<OrderLine>) -> Result<Order, RepositoryError> {
    let status_raw = row.try_get::<String, _>("payment_status")?;
    let payment_status = PaymentStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown payment status `{status_raw}`")))?;

    Ok(Order {
        id: OrderId(row.try_get("id")?),
        user_id: UserId(row.try_get("user_id")?),
        payment_status,
        currency: row.try_get("currency")?,
        lines,
        accounting_invoice_id: row.try_get("accounting_invoice_id")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn line_from_row(row: SqliteRow) -> Result<OrderLine, RepositoryError> {
    Ok(OrderLine {
        description: row.try_get("description")?,
        sku: row.try_get("sku")?,
        quantity: parse_u32("quantity", row.try_get("quantity")?)?,
        unit_price: parse_decimal("unit_price", row.try_get("unit_price")?)?,
        tax_rate: parse_optional_decimal("tax_rate", row.try_get("tax_rate")?)?,
    })
}
