//! In-memory repository fakes for tests in the crates above this one.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use kirana_core::domain::order::{Order, OrderId};
use kirana_core::domain::product::{Product, ProductId, ProductVariant, VariantId};
use kirana_core::domain::quote::{B2bQuote, B2bQuoteId};
use kirana_core::domain::submission::{ContactSubmission, SubmissionId};
use kirana_core::domain::sync::{
    Credential, InventorySyncLog, SyncLogStatus, SyncTask, SyncTaskId, SyncTaskStatus,
    TargetService,
};
use kirana_core::domain::user::{User, UserId};

use super::{
    CatalogRepository, CredentialRepository, InventoryLogRepository, OrderRepository,
    QuoteRepository, RepositoryError, SubmissionRepository, SyncTaskRepository, UserRepository,
};

#[derive(Default)]
pub struct InMemorySyncTaskRepository {
    tasks: RwLock<HashMap<String, SyncTask>>,
}

impl InMemorySyncTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SyncTaskRepository for InMemorySyncTaskRepository {
    async fn save(&self, task: SyncTask) -> Result<(), RepositoryError> {
        self.tasks.write().await.insert(task.id.0.clone(), task);
        Ok(())
    }

    async fn find_by_id(&self, id: &SyncTaskId) -> Result<Option<SyncTask>, RepositoryError> {
        Ok(self.tasks.read().await.get(&id.0).cloned())
    }

    async fn claim_due(
        &self,
        limit: u32,
        now: DateTime<Utc>,
        claim_timeout_secs: i64,
    ) -> Result<Vec<SyncTask>, RepositoryError> {
        let stale_cutoff = now - Duration::seconds(claim_timeout_secs);
        let mut tasks = self.tasks.write().await;

        let mut due: Vec<&SyncTask> = tasks
            .values()
            .filter(|task| match task.status {
                SyncTaskStatus::Pending => true,
                SyncTaskStatus::Retrying => {
                    task.next_retry_at.map_or(false, |next| next <= now)
                }
                _ => false,
            })
            .filter(|task| task.claimed_at.map_or(true, |claimed| claimed < stale_cutoff))
            .collect();
        due.sort_by_key(|task| task.created_at);

        let ids: Vec<String> =
            due.into_iter().take(limit as usize).map(|task| task.id.0.clone()).collect();

        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(task) = tasks.get_mut(&id) {
                task.claimed_at = Some(now);
                claimed.push(task.clone());
            }
        }

        Ok(claimed)
    }

    async fn status_counts(&self) -> Result<Vec<(SyncTaskStatus, i64)>, RepositoryError> {
        let tasks = self.tasks.read().await;
        let mut counts: HashMap<SyncTaskStatus, i64> = HashMap::new();
        for task in tasks.values() {
            *counts.entry(task.status).or_default() += 1;
        }
        let mut counts: Vec<(SyncTaskStatus, i64)> = counts.into_iter().collect();
        counts.sort_by_key(|(status, _)| status.as_str());
        Ok(counts)
    }
}

#[derive(Default)]
pub struct InMemoryCredentialRepository {
    credentials: RwLock<HashMap<TargetService, Credential>>,
}

impl InMemoryCredentialRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, credential: Credential) {
        self.credentials.write().await.insert(credential.service, credential);
    }
}

#[async_trait::async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn find(&self, service: TargetService) -> Result<Option<Credential>, RepositoryError> {
        Ok(self.credentials.read().await.get(&service).cloned())
    }

    async fn upsert(&self, credential: Credential) -> Result<(), RepositoryError> {
        self.credentials.write().await.insert(credential.service, credential);
        Ok(())
    }

    async fn delete(&self, service: TargetService) -> Result<(), RepositoryError> {
        self.credentials.write().await.remove(&service);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryInventoryLogRepository {
    logs: RwLock<Vec<InventorySyncLog>>,
}

impl InMemoryInventoryLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<InventorySyncLog> {
        self.logs.read().await.clone()
    }
}

#[async_trait::async_trait]
impl InventoryLogRepository for InMemoryInventoryLogRepository {
    async fn append(&self, log: InventorySyncLog) -> Result<(), RepositoryError> {
        self.logs.write().await.push(log);
        Ok(())
    }

    async fn status_counts(&self) -> Result<Vec<(SyncLogStatus, i64)>, RepositoryError> {
        let logs = self.logs.read().await;
        let mut counts: HashMap<SyncLogStatus, i64> = HashMap::new();
        for log in logs.iter() {
            *counts.entry(log.status).or_default() += 1;
        }
        let mut counts: Vec<(SyncLogStatus, i64)> = counts.into_iter().collect();
        counts.sort_by_key(|(status, _)| status.as_str());
        Ok(counts)
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.id.0.clone(), user);
    }
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(&id.0).cloned())
    }

    async fn set_crm_contact_id(
        &self,
        id: &UserId,
        contact_id: &str,
    ) -> Result<(), RepositoryError> {
        if let Some(user) = self.users.write().await.get_mut(&id.0) {
            user.crm_contact_id = Some(contact_id.to_string());
        }
        Ok(())
    }

    async fn set_accounting_contact_id(
        &self,
        id: &UserId,
        contact_id: &str,
    ) -> Result<(), RepositoryError> {
        if let Some(user) = self.users.write().await.get_mut(&id.0) {
            user.accounting_contact_id = Some(contact_id.to_string());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<String, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, order: Order) {
        self.orders.write().await.insert(order.id.0.clone(), order);
    }
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.get(&id.0).cloned())
    }

    async fn set_invoice_id(
        &self,
        id: &OrderId,
        invoice_id: &str,
    ) -> Result<(), RepositoryError> {
        if let Some(order) = self.orders.write().await.get_mut(&id.0) {
            order.accounting_invoice_id = Some(invoice_id.to_string());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryQuoteRepository {
    quotes: RwLock<HashMap<String, B2bQuote>>,
}

impl InMemoryQuoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, quote: B2bQuote) {
        self.quotes.write().await.insert(quote.id.0.clone(), quote);
    }
}

#[async_trait::async_trait]
impl QuoteRepository for InMemoryQuoteRepository {
    async fn find_by_id(&self, id: &B2bQuoteId) -> Result<Option<B2bQuote>, RepositoryError> {
        Ok(self.quotes.read().await.get(&id.0).cloned())
    }

    async fn set_estimate_id(
        &self,
        id: &B2bQuoteId,
        estimate_id: &str,
    ) -> Result<(), RepositoryError> {
        if let Some(quote) = self.quotes.write().await.get_mut(&id.0) {
            quote.accounting_estimate_id = Some(estimate_id.to_string());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCatalogRepository {
    products: RwLock<HashMap<String, Product>>,
    variants: RwLock<HashMap<String, ProductVariant>>,
}

impl InMemoryCatalogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_product(&self, product: Product) {
        self.products.write().await.insert(product.id.0.clone(), product);
    }

    pub async fn insert_variant(&self, variant: ProductVariant) {
        self.variants.write().await.insert(variant.id.0.clone(), variant);
    }
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn find_variant(
        &self,
        id: &VariantId,
    ) -> Result<Option<ProductVariant>, RepositoryError> {
        Ok(self.variants.read().await.get(&id.0).cloned())
    }

    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.products.read().await.get(&id.0).cloned())
    }

    async fn set_item_id(
        &self,
        id: &VariantId,
        item_id: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if let Some(variant) = self.variants.write().await.get_mut(&id.0) {
            variant.accounting_item_id = Some(item_id.to_string());
            variant.last_synced_at = Some(synced_at);
        }
        Ok(())
    }

    async fn set_stock_on_hand(
        &self,
        id: &VariantId,
        quantity: i64,
    ) -> Result<(), RepositoryError> {
        if let Some(variant) = self.variants.write().await.get_mut(&id.0) {
            variant.stock_on_hand = quantity;
        }
        Ok(())
    }

    async fn push_candidates(&self, limit: u32) -> Result<Vec<VariantId>, RepositoryError> {
        let products = self.products.read().await;
        let variants = self.variants.read().await;

        let mut due: Vec<&ProductVariant> = variants
            .values()
            .filter(|variant| {
                products.get(&variant.product_id.0).map_or(false, |product| product.active)
            })
            .filter(|variant| {
                variant.accounting_item_id.is_none()
                    || variant
                        .last_synced_at
                        .map_or(true, |synced| variant.updated_at > synced)
            })
            .collect();
        due.sort_by_key(|variant| variant.updated_at);

        Ok(due.into_iter().take(limit as usize).map(|variant| variant.id.clone()).collect())
    }
}

#[derive(Default)]
pub struct InMemorySubmissionRepository {
    submissions: RwLock<HashMap<String, ContactSubmission>>,
}

impl InMemorySubmissionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, submission: ContactSubmission) {
        self.submissions.write().await.insert(submission.id.0.clone(), submission);
    }
}

#[async_trait::async_trait]
impl SubmissionRepository for InMemorySubmissionRepository {
    async fn find_by_id(
        &self,
        id: &SubmissionId,
    ) -> Result<Option<ContactSubmission>, RepositoryError> {
        Ok(self.submissions.read().await.get(&id.0).cloned())
    }
}
