use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use kirana_core::domain::product::{Product, ProductId, ProductVariant, VariantId};

use super::{
    parse_decimal, parse_optional_decimal, parse_optional_timestamp, parse_timestamp,
    CatalogRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CatalogRepository for SqlCatalogRepository {
    async fn find_variant(
        &self,
        id: &VariantId,
    ) -> Result<Option<ProductVariant>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, product_id, sku, name, unit_price, stock_on_hand, weight_value,
                    weight_unit, accounting_item_id, last_synced_at, updated_at
             FROM product_variant WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(variant_from_row).transpose()
    }

    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, segment, active FROM product WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Product {
            id: ProductId(row.get("id")),
            name: row.get("name"),
            segment: row.get("segment"),
            active: row.get::<i64, _>("active") != 0,
        }))
    }

    async fn set_item_id(
        &self,
        id: &VariantId,
        item_id: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE product_variant SET accounting_item_id = ?, last_synced_at = ? WHERE id = ?",
        )
        .bind(item_id)
        .bind(synced_at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_stock_on_hand(
        &self,
        id: &VariantId,
        quantity: i64,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE product_variant SET stock_on_hand = ? WHERE id = ?")
            .bind(quantity)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn push_candidates(&self, limit: u32) -> Result<Vec<VariantId>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT v.id FROM product_variant v
             JOIN product p ON p.id = v.product_id
             WHERE p.active = 1
               AND (v.accounting_item_id IS NULL
                    OR v.last_synced_at IS NULL
                    OR v.updated_at > v.last_synced_at)
             ORDER BY v.updated_at ASC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| VariantId(row.get("id"))).collect())
    }
}

fn variant_from_row(row: SqliteRow) -> Result<ProductVariant, RepositoryError> {
    Ok(ProductVariant {
        id: VariantId(row.try_get("id")?),
        product_id: ProductId(row.try_get("product_id")?),
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        unit_price: parse_decimal("unit_price", row.try_get("unit_price")?)?,
        stock_on_hand: row.try_get("stock_on_hand")?,
        weight_value: parse_optional_decimal("weight_value", row.try_get("weight_value")?)?,
        weight_unit: row.try_get("weight_unit")?,
        accounting_item_id: row.try_get("accounting_item_id")?,
        last_synced_at: parse_optional_timestamp("last_synced_at", row.try_get("last_synced_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use kirana_core::domain::product::VariantId;

    use super::SqlCatalogRepository;
    use crate::migrations;
    use crate::repositories::CatalogRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn seed_product(pool: &DbPool, id: &str, active: i64) {
        sqlx::query("INSERT INTO product (id, name, segment, active) VALUES (?, ?, 'staples', ?)")
            .bind(id)
            .bind(format!("Product {id}"))
            .bind(active)
            .execute(pool)
            .await
            .expect("seed product");
    }

    async fn seed_variant(
        pool: &DbPool,
        id: &str,
        product_id: &str,
        item_id: Option<&str>,
        last_synced_at: Option<String>,
        updated_at: String,
    ) {
        sqlx::query(
            "INSERT INTO product_variant (
                id, product_id, sku, name, unit_price, stock_on_hand, weight_value,
                weight_unit, accounting_item_id, last_synced_at, updated_at
             ) VALUES (?, ?, ?, ?, '99.00', 20, '500', 'g', ?, ?, ?)",
        )
        .bind(id)
        .bind(product_id)
        .bind(format!("SKU-{id}"))
        .bind(format!("Variant {id}"))
        .bind(item_id)
        .bind(last_synced_at)
        .bind(updated_at)
        .execute(pool)
        .await
        .expect("seed variant");
    }

    #[tokio::test]
    async fn variant_round_trips_with_writebacks() {
        let pool = setup_pool().await;
        seed_product(&pool, "P-1", 1).await;
        seed_variant(&pool, "V-1", "P-1", None, None, Utc::now().to_rfc3339()).await;
        let repo = SqlCatalogRepository::new(pool.clone());
        let id = VariantId("V-1".to_string());

        let synced_at = Utc::now();
        repo.set_item_id(&id, "item-5", synced_at).await.expect("set item id");
        repo.set_stock_on_hand(&id, 7).await.expect("set stock");

        let variant = repo.find_variant(&id).await.expect("query").expect("variant exists");
        assert_eq!(variant.accounting_item_id.as_deref(), Some("item-5"));
        assert_eq!(variant.stock_on_hand, 7);
        assert!(variant.last_synced_at.is_some());
        assert_eq!(variant.weight_unit.as_deref(), Some("g"));

        pool.close().await;
    }

    #[tokio::test]
    async fn push_candidates_skip_inactive_and_up_to_date_variants() {
        let pool = setup_pool().await;
        let now = Utc::now();

        seed_product(&pool, "P-active", 1).await;
        seed_product(&pool, "P-inactive", 0).await;

        // Never pushed.
        seed_variant(&pool, "V-new", "P-active", None, None, now.to_rfc3339()).await;
        // Changed locally after the last push.
        seed_variant(
            &pool,
            "V-stale",
            "P-active",
            Some("item-1"),
            Some((now - Duration::hours(2)).to_rfc3339()),
            (now - Duration::hours(1)).to_rfc3339(),
        )
        .await;
        // Pushed after its latest change.
        seed_variant(
            &pool,
            "V-fresh",
            "P-active",
            Some("item-2"),
            Some(now.to_rfc3339()),
            (now - Duration::hours(1)).to_rfc3339(),
        )
        .await;
        // Inactive product.
        seed_variant(&pool, "V-off", "P-inactive", None, None, now.to_rfc3339()).await;

        let repo = SqlCatalogRepository::new(pool.clone());
        let candidates = repo.push_candidates(10).await.expect("candidates");
        let mut ids: Vec<&str> = candidates.iter().map(|id| id.0.as_str()).collect();
        ids.sort();

        assert_eq!(ids, vec!["V-new", "V-stale"]);

        pool.close().await;
    }
}
