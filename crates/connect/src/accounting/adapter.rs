use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use kirana_core::config::CompanyConfig;
use kirana_core::domain::order::{OrderId, PaymentStatus};
use kirana_core::domain::product::{remote_weight_unit, ProductVariant, VariantId};
use kirana_core::domain::quote::{B2bQuoteId, B2bQuoteStatus};
use kirana_core::domain::sync::{InventoryOp, InventorySyncLog, SyncLogStatus, SyncOutcome};
use kirana_core::domain::user::User;
use kirana_core::gst::{compute_b2b, compute_b2c, TaxBreakdown, TaxLine};
use kirana_db::repositories::{
    CatalogRepository, InventoryLogRepository, OrderRepository, QuoteRepository, UserRepository,
};

use crate::accounting::api::AccountingApi;
use crate::error::AdapterError;

/// Custom-field marker stamped onto every item this subsystem pushes, so
/// rows of remote inventory can be traced back to their origin.
const ITEM_PROVENANCE: &str = "kirana-sync";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchPushSummary {
    pub processed: u32,
    pub errored: u32,
}

/// Maps paid orders to invoices, approved quotes to estimates, and catalog
/// variants to inventory items. Single attempt per call; non-qualifying
/// records come back as `Skipped`, never as errors.
pub struct AccountingSyncAdapter {
    api: Arc<dyn AccountingApi>,
    users: Arc<dyn UserRepository>,
    orders: Arc<dyn OrderRepository>,
    quotes: Arc<dyn QuoteRepository>,
    catalog: Arc<dyn CatalogRepository>,
    inventory_log: Arc<dyn InventoryLogRepository>,
    company: CompanyConfig,
}

impl AccountingSyncAdapter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: Arc<dyn AccountingApi>,
        users: Arc<dyn UserRepository>,
        orders: Arc<dyn OrderRepository>,
        quotes: Arc<dyn QuoteRepository>,
        catalog: Arc<dyn CatalogRepository>,
        inventory_log: Arc<dyn InventoryLogRepository>,
        company: CompanyConfig,
    ) -> Self {
        Self { api, users, orders, quotes, catalog, inventory_log, company }
    }

    /// Creates an invoice for a paid order. Anything not yet paid is skipped;
    /// a later payment re-enqueues the order.
    pub async fn sync_order_to_invoice(
        &self,
        order_id: &OrderId,
    ) -> Result<SyncOutcome, AdapterError> {
        let order = self.orders.find_by_id(order_id).await?.ok_or_else(|| {
            AdapterError::MissingRecord { entity: "order", id: order_id.0.clone() }
        })?;

        if order.payment_status != PaymentStatus::Paid {
            return Ok(SyncOutcome::Skipped(format!(
                "order not paid (payment status: {})",
                order.payment_status.as_str()
            )));
        }
        if let Some(invoice_id) = &order.accounting_invoice_id {
            return Ok(SyncOutcome::Skipped(format!("already invoiced as {invoice_id}")));
        }

        let user = self.users.find_by_id(&order.user_id).await?.ok_or_else(|| {
            AdapterError::MissingRecord { entity: "user", id: order.user_id.0.clone() }
        })?;
        let contact_id = self.resolve_contact(&user).await?;

        let lines: Vec<TaxLine> = order.lines.iter().map(|line| line.tax_line()).collect();
        let breakdown = compute_b2c(&lines);

        let record = json!({
            "customer_id": contact_id,
            "reference_number": order.id.0,
            "currency_code": order.currency,
            "line_items": tax_line_items(&lines),
            "sub_total": breakdown.subtotal,
            "tax_total": breakdown.tax_amount,
            "total": breakdown.total,
        });

        let invoice_id = self.api.create_invoice(&record).await?;
        self.orders.set_invoice_id(&order.id, &invoice_id).await?;
        info!(event_name = "accounting.invoice_created", order_id = %order.id.0, invoice_id = %invoice_id);

        Ok(SyncOutcome::Completed(json!({
            "invoice_id": invoice_id,
            "total": breakdown.total,
        })))
    }

    /// Creates a GST estimate for an approved B2B quote.
    pub async fn sync_quote_to_estimate(
        &self,
        quote_id: &B2bQuoteId,
    ) -> Result<SyncOutcome, AdapterError> {
        let quote = self.quotes.find_by_id(quote_id).await?.ok_or_else(|| {
            AdapterError::MissingRecord { entity: "b2b quote", id: quote_id.0.clone() }
        })?;

        if quote.status != B2bQuoteStatus::Approved {
            return Ok(SyncOutcome::Skipped(format!(
                "quote not approved (status: {})",
                quote.status.as_str()
            )));
        }
        if let Some(estimate_id) = &quote.accounting_estimate_id {
            return Ok(SyncOutcome::Skipped(format!("already estimated as {estimate_id}")));
        }

        let user = self.users.find_by_id(&quote.user_id).await?.ok_or_else(|| {
            AdapterError::MissingRecord { entity: "user", id: quote.user_id.0.clone() }
        })?;
        let contact_id = self.resolve_contact(&user).await?;

        let lines: Vec<TaxLine> = quote.lines.iter().map(|line| line.tax_line()).collect();
        let breakdown =
            compute_b2b(&lines, self.company.gstin.as_deref(), user.gstin.as_deref());

        let record = json!({
            "customer_id": contact_id,
            "reference_number": quote.id.0,
            "line_items": tax_line_items(&lines),
            "notes": quote.notes,
            "sub_total": breakdown.subtotal,
            "tax_total": breakdown.tax_amount,
            "total": breakdown.total,
            "taxes": tax_components(&breakdown),
        });

        let estimate_id = self.api.create_estimate(&record).await?;
        self.quotes.set_estimate_id(&quote.id, &estimate_id).await?;
        info!(event_name = "accounting.estimate_created", quote_id = %quote.id.0, estimate_id = %estimate_id);

        Ok(SyncOutcome::Completed(json!({
            "estimate_id": estimate_id,
            "total": breakdown.total,
        })))
    }

    /// Pushes one catalog variant to the remote item list. A variant whose
    /// product is inactive is skipped and logged; an item matched by SKU is
    /// adopted rather than duplicated.
    pub async fn push_inventory_item(
        &self,
        variant_id: &VariantId,
    ) -> Result<SyncOutcome, AdapterError> {
        let variant = self.catalog.find_variant(variant_id).await?.ok_or_else(|| {
            AdapterError::MissingRecord { entity: "product variant", id: variant_id.0.clone() }
        })?;
        let product = self.catalog.find_product(&variant.product_id).await?.ok_or_else(|| {
            AdapterError::MissingRecord { entity: "product", id: variant.product_id.0.clone() }
        })?;

        if !product.active {
            let reason = "product is inactive".to_string();
            self.log_inventory(&variant, InventoryOp::Push, None, SyncLogStatus::Skipped, Some(&reason))
                .await?;
            return Ok(SyncOutcome::Skipped(reason));
        }

        let record = item_record(&variant, &product.name, product.segment.as_deref());

        let (item_id, action) = match &variant.accounting_item_id {
            Some(item_id) => {
                self.api.update_item(item_id, &record).await?;
                (item_id.clone(), "updated")
            }
            None => match self.api.search_item_by_sku(&variant.sku).await? {
                Some(existing) => {
                    self.api.update_item(&existing.id, &record).await?;
                    (existing.id, "adopted")
                }
                None => (self.api.create_item(&record).await?, "created"),
            },
        };

        self.catalog.set_item_id(&variant.id, &item_id, Utc::now()).await?;
        self.log_inventory(&variant, InventoryOp::Push, None, SyncLogStatus::Success, None)
            .await?;
        info!(event_name = "inventory.pushed", variant_id = %variant.id.0, item_id = %item_id, action);

        Ok(SyncOutcome::Completed(json!({ "item_id": item_id, "action": action })))
    }

    /// Pulls the remote stock level for one variant and overwrites the local
    /// count. The accounting service is authoritative for stock.
    pub async fn pull_inventory_item(
        &self,
        variant_id: &VariantId,
    ) -> Result<SyncOutcome, AdapterError> {
        let variant = self.catalog.find_variant(variant_id).await?.ok_or_else(|| {
            AdapterError::MissingRecord { entity: "product variant", id: variant_id.0.clone() }
        })?;

        let Some(item_id) = variant.accounting_item_id.clone() else {
            let reason = "variant has no linked item".to_string();
            self.log_inventory(&variant, InventoryOp::Pull, None, SyncLogStatus::Skipped, Some(&reason))
                .await?;
            return Ok(SyncOutcome::Skipped(reason));
        };

        let remote = self.api.fetch_item(&item_id).await?;
        let Some(remote_quantity) = remote.stock_on_hand else {
            let reason = format!("item {item_id} reports no stock figure");
            self.log_inventory(&variant, InventoryOp::Pull, None, SyncLogStatus::Skipped, Some(&reason))
                .await?;
            return Ok(SyncOutcome::Skipped(reason));
        };

        let difference = remote_quantity - variant.stock_on_hand;
        self.catalog.set_stock_on_hand(&variant.id, remote_quantity).await?;
        self.log_inventory(
            &variant,
            InventoryOp::Pull,
            Some(remote_quantity),
            SyncLogStatus::Success,
            None,
        )
        .await?;
        info!(
            event_name = "inventory.pulled",
            variant_id = %variant.id.0,
            remote_quantity,
            difference,
        );

        Ok(SyncOutcome::Completed(json!({
            "item_id": item_id,
            "stock_on_hand": remote_quantity,
            "difference": difference,
        })))
    }

    /// Pushes every variant that is new or changed since its last push. One
    /// variant failing does not stop the batch.
    pub async fn batch_push(&self, limit: u32) -> Result<BatchPushSummary, AdapterError> {
        let candidates = self.catalog.push_candidates(limit).await?;
        let mut summary = BatchPushSummary::default();

        for variant_id in candidates {
            match self.push_inventory_item(&variant_id).await {
                Ok(_) => summary.processed += 1,
                Err(error) => {
                    summary.errored += 1;
                    warn!(
                        event_name = "inventory.push_failed",
                        variant_id = %variant_id.0,
                        error = %error,
                    );
                    if let Ok(Some(variant)) = self.catalog.find_variant(&variant_id).await {
                        let message = error.to_string();
                        if let Err(log_error) = self
                            .log_inventory(
                                &variant,
                                InventoryOp::Push,
                                None,
                                SyncLogStatus::Failed,
                                Some(&message),
                            )
                            .await
                        {
                            warn!(
                                event_name = "inventory.push_log_failed",
                                variant_id = %variant_id.0,
                                error = %log_error,
                            );
                        }
                    }
                }
            }
        }

        info!(
            event_name = "inventory.batch_push_done",
            processed = summary.processed,
            errored = summary.errored,
        );
        Ok(summary)
    }

    /// Accounting contact for a storefront account: linked id, then email
    /// match, then create. The resolved id is written back in all cases.
    async fn resolve_contact(&self, user: &User) -> Result<String, AdapterError> {
        if let Some(contact_id) = &user.accounting_contact_id {
            return Ok(contact_id.clone());
        }

        let contact_id = match self.api.search_contact_by_email(&user.email).await? {
            Some(existing) => existing,
            None => {
                let record = json!({
                    "contact_name": user.display_name(),
                    "company_name": user.company,
                    "email": user.email,
                    "phone": user.phone,
                    "gst_no": user.gstin,
                });
                self.api.create_contact(&record).await?
            }
        };

        self.users.set_accounting_contact_id(&user.id, &contact_id).await?;
        Ok(contact_id)
    }

    async fn log_inventory(
        &self,
        variant: &ProductVariant,
        operation: InventoryOp,
        remote_quantity: Option<i64>,
        status: SyncLogStatus,
        message: Option<&str>,
    ) -> Result<(), AdapterError> {
        self.inventory_log
            .append(InventorySyncLog {
                variant_id: variant.id.0.clone(),
                operation,
                local_quantity: variant.stock_on_hand,
                remote_quantity,
                difference: remote_quantity.map(|remote| remote - variant.stock_on_hand),
                status,
                message: message.map(str::to_string),
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }
}

fn tax_line_items(lines: &[TaxLine]) -> Value {
    Value::Array(
        lines
            .iter()
            .map(|line| {
                json!({
                    "name": line.description,
                    "quantity": line.quantity,
                    "rate": line.unit_price,
                    "tax_percentage": line.tax_rate,
                })
            })
            .collect(),
    )
}

fn tax_components(breakdown: &TaxBreakdown) -> Value {
    json!({
        "sgst": breakdown.sgst,
        "cgst": breakdown.cgst,
        "igst": breakdown.igst,
    })
}

fn item_record(variant: &ProductVariant, product_name: &str, segment: Option<&str>) -> Value {
    json!({
        "name": format!("{product_name} - {}", variant.name),
        "sku": variant.sku,
        "rate": variant.unit_price,
        "initial_stock": variant.stock_on_hand,
        "unit": variant
            .weight_unit
            .as_deref()
            .map(remote_weight_unit)
            .unwrap_or("units"),
        "weight": variant.weight_value,
        "custom_fields": [
            { "label": "product_id", "value": variant.product_id.0 },
            { "label": "variant_id", "value": variant.id.0 },
            { "label": "segment", "value": segment },
            { "label": "provenance", "value": ITEM_PROVENANCE },
        ],
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;
    use serde_json::Value;
    use tokio::sync::Mutex;

    use kirana_core::config::CompanyConfig;
    use kirana_core::domain::order::{Order, OrderId, OrderLine, PaymentStatus};
    use kirana_core::domain::product::{Product, ProductId, ProductVariant, VariantId};
    use kirana_core::domain::quote::{B2bQuote, B2bQuoteId, B2bQuoteStatus, QuoteLine};
    use kirana_core::domain::sync::{InventoryOp, InventorySyncLog, SyncLogStatus};
    use kirana_core::domain::user::{User, UserId};
    use kirana_db::repositories::{
        CatalogRepository, InMemoryCatalogRepository, InMemoryInventoryLogRepository,
        InMemoryOrderRepository, InMemoryQuoteRepository, InMemoryUserRepository,
        InventoryLogRepository, OrderRepository, QuoteRepository, RepositoryError,
        UserRepository,
    };

    use super::{AccountingSyncAdapter, BatchPushSummary};
    use crate::accounting::api::{AccountingApi, RemoteItem};
    use crate::error::AdapterError;

    #[derive(Default)]
    struct FakeAccountingApi {
        contact_by_email: Option<String>,
        item_by_sku: Option<RemoteItem>,
        remote_stock: Option<i64>,
        fail_item_creates: bool,
        created_contacts: Mutex<Vec<Value>>,
        created_invoices: Mutex<Vec<Value>>,
        created_estimates: Mutex<Vec<Value>>,
        created_items: Mutex<Vec<Value>>,
        updated_items: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait::async_trait]
    impl AccountingApi for FakeAccountingApi {
        async fn search_contact_by_email(
            &self,
            _email: &str,
        ) -> Result<Option<String>, AdapterError> {
            Ok(self.contact_by_email.clone())
        }

        async fn create_contact(&self, record: &Value) -> Result<String, AdapterError> {
            self.created_contacts.lock().await.push(record.clone());
            Ok("contact-new".to_string())
        }

        async fn create_invoice(&self, record: &Value) -> Result<String, AdapterError> {
            self.created_invoices.lock().await.push(record.clone());
            Ok("inv-1".to_string())
        }

        async fn create_estimate(&self, record: &Value) -> Result<String, AdapterError> {
            self.created_estimates.lock().await.push(record.clone());
            Ok("est-1".to_string())
        }

        async fn search_item_by_sku(
            &self,
            _sku: &str,
        ) -> Result<Option<RemoteItem>, AdapterError> {
            Ok(self.item_by_sku.clone())
        }

        async fn create_item(&self, record: &Value) -> Result<String, AdapterError> {
            if self.fail_item_creates {
                return Err(AdapterError::Api {
                    service: kirana_core::domain::sync::TargetService::Accounting,
                    status: 502,
                    message: "upstream unavailable".to_string(),
                });
            }
            self.created_items.lock().await.push(record.clone());
            Ok("item-new".to_string())
        }

        async fn update_item(&self, item_id: &str, record: &Value) -> Result<(), AdapterError> {
            self.updated_items.lock().await.push((item_id.to_string(), record.clone()));
            Ok(())
        }

        async fn fetch_item(&self, item_id: &str) -> Result<RemoteItem, AdapterError> {
            Ok(RemoteItem { id: item_id.to_string(), stock_on_hand: self.remote_stock })
        }
    }

    struct Fixture {
        api: Arc<FakeAccountingApi>,
        users: Arc<InMemoryUserRepository>,
        orders: Arc<InMemoryOrderRepository>,
        quotes: Arc<InMemoryQuoteRepository>,
        catalog: Arc<InMemoryCatalogRepository>,
        inventory_log: Arc<InMemoryInventoryLogRepository>,
        adapter: AccountingSyncAdapter,
    }

    fn fixture(api: FakeAccountingApi) -> Fixture {
        let api = Arc::new(api);
        let users = Arc::new(InMemoryUserRepository::new());
        let orders = Arc::new(InMemoryOrderRepository::new());
        let quotes = Arc::new(InMemoryQuoteRepository::new());
        let catalog = Arc::new(InMemoryCatalogRepository::new());
        let inventory_log = Arc::new(InMemoryInventoryLogRepository::new());
        let adapter = AccountingSyncAdapter::new(
            api.clone(),
            users.clone(),
            orders.clone(),
            quotes.clone(),
            catalog.clone(),
            inventory_log.clone(),
            CompanyConfig {
                name: "Kirana Traders".to_string(),
                gstin: Some("27AAAPL1234C1ZV".to_string()),
            },
        );
        Fixture { api, users, orders, quotes, catalog, inventory_log, adapter }
    }

    fn sample_user(gstin: Option<&str>, accounting_contact_id: Option<&str>) -> User {
        User {
            id: UserId("U-1".to_string()),
            email: "asha@example.com".to_string(),
            first_name: "Asha".to_string(),
            last_name: "Rao".to_string(),
            company: Some("Kirana Traders".to_string()),
            phone: None,
            gstin: gstin.map(str::to_string),
            segment: None,
            crm_contact_id: None,
            accounting_contact_id: accounting_contact_id.map(str::to_string),
        }
    }

    fn sample_order(payment_status: PaymentStatus) -> Order {
        Order {
            id: OrderId("O-1".to_string()),
            user_id: UserId("U-1".to_string()),
            payment_status,
            currency: "INR".to_string(),
            lines: vec![OrderLine {
                description: "Basmati Rice 5kg".to_string(),
                sku: Some("RICE-5".to_string()),
                quantity: 2,
                unit_price: Decimal::from(500),
                tax_rate: Some(Decimal::from(18)),
            }],
            accounting_invoice_id: None,
            created_at: Utc::now(),
        }
    }

    fn sample_quote(status: B2bQuoteStatus) -> B2bQuote {
        B2bQuote {
            id: B2bQuoteId("Q-1".to_string()),
            user_id: UserId("U-1".to_string()),
            status,
            company_name: "Kirana Traders".to_string(),
            notes: None,
            lines: vec![QuoteLine {
                description: "Basmati Rice 25kg".to_string(),
                quantity: 2,
                unit_price: Decimal::from(1_000),
                tax_rate: Some(Decimal::from(18)),
            }],
            accounting_estimate_id: None,
            created_at: Utc::now(),
        }
    }

    fn sample_variant(item_id: Option<&str>, stock: i64) -> ProductVariant {
        ProductVariant {
            id: VariantId("V-1".to_string()),
            product_id: ProductId("P-1".to_string()),
            sku: "RICE-5".to_string(),
            name: "5kg bag".to_string(),
            unit_price: Decimal::from(500),
            stock_on_hand: stock,
            weight_value: Some(Decimal::from(5)),
            weight_unit: Some("kg".to_string()),
            accounting_item_id: item_id.map(str::to_string),
            last_synced_at: None,
            updated_at: Utc::now(),
        }
    }

    fn sample_product(active: bool) -> Product {
        Product {
            id: ProductId("P-1".to_string()),
            name: "Basmati Rice".to_string(),
            segment: Some("staples".to_string()),
            active,
        }
    }

    #[tokio::test]
    async fn unpaid_order_is_skipped_not_failed() {
        let fx = fixture(FakeAccountingApi::default());
        fx.users.insert(sample_user(None, None)).await;
        fx.orders.insert(sample_order(PaymentStatus::Pending)).await;

        let outcome = fx
            .adapter
            .sync_order_to_invoice(&OrderId("O-1".to_string()))
            .await
            .expect("sync");

        assert!(outcome.is_skipped());
        assert!(fx.api.created_invoices.lock().await.is_empty());
    }

    #[tokio::test]
    async fn paid_order_becomes_invoice_with_b2c_totals() {
        let fx = fixture(FakeAccountingApi::default());
        fx.users.insert(sample_user(None, None)).await;
        fx.orders.insert(sample_order(PaymentStatus::Paid)).await;

        let outcome = fx
            .adapter
            .sync_order_to_invoice(&OrderId("O-1".to_string()))
            .await
            .expect("sync");

        assert!(!outcome.is_skipped());
        let invoices = fx.api.created_invoices.lock().await;
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0]["sub_total"], serde_json::json!(Decimal::from(1_000)));
        assert_eq!(invoices[0]["tax_total"], serde_json::json!(Decimal::from(180)));
        assert_eq!(invoices[0]["total"], serde_json::json!(Decimal::from(1_180)));

        let order = fx
            .orders
            .find_by_id(&OrderId("O-1".to_string()))
            .await
            .expect("find")
            .expect("order");
        assert_eq!(order.accounting_invoice_id.as_deref(), Some("inv-1"));
    }

    #[tokio::test]
    async fn contact_is_resolved_by_email_before_creating_one() {
        let fx = fixture(FakeAccountingApi {
            contact_by_email: Some("contact-42".to_string()),
            ..FakeAccountingApi::default()
        });
        fx.users.insert(sample_user(None, None)).await;
        fx.orders.insert(sample_order(PaymentStatus::Paid)).await;

        fx.adapter.sync_order_to_invoice(&OrderId("O-1".to_string())).await.expect("sync");

        assert!(fx.api.created_contacts.lock().await.is_empty());
        let user = fx
            .users
            .find_by_id(&UserId("U-1".to_string()))
            .await
            .expect("find")
            .expect("user");
        assert_eq!(user.accounting_contact_id.as_deref(), Some("contact-42"));
    }

    #[tokio::test]
    async fn unapproved_quote_is_skipped() {
        let fx = fixture(FakeAccountingApi::default());
        fx.users.insert(sample_user(Some("27BBBPL9999D2ZX"), None)).await;
        fx.quotes.insert(sample_quote(B2bQuoteStatus::Submitted)).await;

        let outcome = fx
            .adapter
            .sync_quote_to_estimate(&B2bQuoteId("Q-1".to_string()))
            .await
            .expect("sync");

        assert!(outcome.is_skipped());
        assert!(fx.api.created_estimates.lock().await.is_empty());
    }

    #[tokio::test]
    async fn intra_state_estimate_splits_tax_into_sgst_and_cgst() {
        let fx = fixture(FakeAccountingApi::default());
        fx.users.insert(sample_user(Some("27BBBPL9999D2ZX"), Some("contact-9"))).await;
        fx.quotes.insert(sample_quote(B2bQuoteStatus::Approved)).await;

        fx.adapter.sync_quote_to_estimate(&B2bQuoteId("Q-1".to_string())).await.expect("sync");

        let estimates = fx.api.created_estimates.lock().await;
        assert_eq!(estimates.len(), 1);
        assert_eq!(estimates[0]["taxes"]["sgst"], serde_json::json!(Decimal::from(180)));
        assert_eq!(estimates[0]["taxes"]["cgst"], serde_json::json!(Decimal::from(180)));
        assert_eq!(estimates[0]["taxes"]["igst"], serde_json::json!(Decimal::ZERO));

        let quote = fx
            .quotes
            .find_by_id(&B2bQuoteId("Q-1".to_string()))
            .await
            .expect("find")
            .expect("quote");
        assert_eq!(quote.accounting_estimate_id.as_deref(), Some("est-1"));
    }

    #[tokio::test]
    async fn buyer_without_gstin_gets_igst_estimate() {
        let fx = fixture(FakeAccountingApi::default());
        fx.users.insert(sample_user(None, Some("contact-9"))).await;
        fx.quotes.insert(sample_quote(B2bQuoteStatus::Approved)).await;

        fx.adapter.sync_quote_to_estimate(&B2bQuoteId("Q-1".to_string())).await.expect("sync");

        let estimates = fx.api.created_estimates.lock().await;
        assert_eq!(estimates[0]["taxes"]["igst"], serde_json::json!(Decimal::from(360)));
        assert_eq!(estimates[0]["taxes"]["sgst"], serde_json::json!(Decimal::ZERO));
        assert_eq!(estimates[0]["total"], serde_json::json!(Decimal::from(2_360)));
    }

    #[tokio::test]
    async fn inactive_product_push_is_skipped_and_logged() {
        let fx = fixture(FakeAccountingApi::default());
        fx.catalog.insert_product(sample_product(false)).await;
        fx.catalog.insert_variant(sample_variant(None, 10)).await;

        let outcome = fx
            .adapter
            .push_inventory_item(&VariantId("V-1".to_string()))
            .await
            .expect("push");

        assert!(outcome.is_skipped());
        let entries = fx.inventory_log.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, SyncLogStatus::Skipped);
        assert_eq!(entries[0].operation, InventoryOp::Push);
    }

    #[tokio::test]
    async fn push_creates_item_with_mapped_unit_and_links_it() {
        let fx = fixture(FakeAccountingApi::default());
        fx.catalog.insert_product(sample_product(true)).await;
        fx.catalog.insert_variant(sample_variant(None, 10)).await;

        let outcome = fx
            .adapter
            .push_inventory_item(&VariantId("V-1".to_string()))
            .await
            .expect("push");

        assert_eq!(outcome.response_payload()["action"], "created");
        let items = fx.api.created_items.lock().await;
        assert_eq!(items[0]["unit"], "kilograms");
        assert_eq!(items[0]["sku"], "RICE-5");
        let custom_fields = items[0]["custom_fields"].as_array().expect("custom fields");
        assert!(custom_fields.iter().any(|field| field["value"] == "kirana-sync"));

        let variant = fx
            .catalog
            .find_variant(&VariantId("V-1".to_string()))
            .await
            .expect("find")
            .expect("variant");
        assert_eq!(variant.accounting_item_id.as_deref(), Some("item-new"));
        assert!(variant.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn push_adopts_an_item_matched_by_sku() {
        let fx = fixture(FakeAccountingApi {
            item_by_sku: Some(RemoteItem { id: "item-77".to_string(), stock_on_hand: None }),
            ..FakeAccountingApi::default()
        });
        fx.catalog.insert_product(sample_product(true)).await;
        fx.catalog.insert_variant(sample_variant(None, 10)).await;

        let outcome = fx
            .adapter
            .push_inventory_item(&VariantId("V-1".to_string()))
            .await
            .expect("push");

        assert_eq!(outcome.response_payload()["action"], "adopted");
        assert!(fx.api.created_items.lock().await.is_empty());
        let variant = fx
            .catalog
            .find_variant(&VariantId("V-1".to_string()))
            .await
            .expect("find")
            .expect("variant");
        assert_eq!(variant.accounting_item_id.as_deref(), Some("item-77"));
    }

    #[tokio::test]
    async fn pull_overwrites_local_stock_with_remote_figure() {
        let fx = fixture(FakeAccountingApi {
            remote_stock: Some(4),
            ..FakeAccountingApi::default()
        });
        fx.catalog.insert_product(sample_product(true)).await;
        fx.catalog.insert_variant(sample_variant(Some("item-77"), 10)).await;

        let outcome = fx
            .adapter
            .pull_inventory_item(&VariantId("V-1".to_string()))
            .await
            .expect("pull");

        assert_eq!(outcome.response_payload()["stock_on_hand"], 4);
        assert_eq!(outcome.response_payload()["difference"], -6);

        let variant = fx
            .catalog
            .find_variant(&VariantId("V-1".to_string()))
            .await
            .expect("find")
            .expect("variant");
        assert_eq!(variant.stock_on_hand, 4);

        let entries = fx.inventory_log.entries().await;
        assert_eq!(entries[0].remote_quantity, Some(4));
        assert_eq!(entries[0].difference, Some(-6));
        assert_eq!(entries[0].status, SyncLogStatus::Success);
    }

    #[tokio::test]
    async fn pull_without_linked_item_is_skipped() {
        let fx = fixture(FakeAccountingApi::default());
        fx.catalog.insert_product(sample_product(true)).await;
        fx.catalog.insert_variant(sample_variant(None, 10)).await;

        let outcome = fx
            .adapter
            .pull_inventory_item(&VariantId("V-1".to_string()))
            .await
            .expect("pull");

        assert!(outcome.is_skipped());
    }

    #[tokio::test]
    async fn batch_push_continues_past_a_failing_variant() {
        let fx = fixture(FakeAccountingApi {
            fail_item_creates: true,
            ..FakeAccountingApi::default()
        });
        fx.catalog.insert_product(sample_product(true)).await;
        fx.catalog.insert_variant(sample_variant(None, 10)).await;
        let mut second = sample_variant(None, 3);
        second.id = VariantId("V-2".to_string());
        second.sku = "RICE-1".to_string();
        fx.catalog.insert_variant(second).await;

        let summary = fx.adapter.batch_push(10).await.expect("batch");

        assert_eq!(summary, BatchPushSummary { processed: 0, errored: 2 });
        let entries = fx.inventory_log.entries().await;
        assert_eq!(entries.iter().filter(|log| log.status == SyncLogStatus::Failed).count(), 2);
    }

    struct UnavailableLogRepository;

    #[async_trait::async_trait]
    impl InventoryLogRepository for UnavailableLogRepository {
        async fn append(&self, _log: InventorySyncLog) -> Result<(), RepositoryError> {
            Err(RepositoryError::Decode("inventory log unavailable".to_string()))
        }

        async fn status_counts(&self) -> Result<Vec<(SyncLogStatus, i64)>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn batch_push_survives_a_failing_audit_log() {
        let catalog = Arc::new(InMemoryCatalogRepository::new());
        catalog.insert_product(sample_product(true)).await;
        catalog.insert_variant(sample_variant(None, 10)).await;
        let adapter = AccountingSyncAdapter::new(
            Arc::new(FakeAccountingApi {
                fail_item_creates: true,
                ..FakeAccountingApi::default()
            }),
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryQuoteRepository::new()),
            catalog,
            Arc::new(UnavailableLogRepository),
            CompanyConfig { name: "Kirana Traders".to_string(), gstin: None },
        );

        let summary = adapter.batch_push(10).await.expect("batch");

        assert_eq!(summary, BatchPushSummary { processed: 0, errored: 1 });
    }
}
