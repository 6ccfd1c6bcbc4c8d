use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use kirana_core::domain::order::{Order, OrderId};
use kirana_core::domain::product::{Product, ProductId, ProductVariant, VariantId};
use kirana_core::domain::quote::{B2bQuote, B2bQuoteId};
use kirana_core::domain::submission::{ContactSubmission, SubmissionId};
use kirana_core::domain::sync::{
    Credential, InventorySyncLog, SyncLogStatus, SyncTask, SyncTaskId, SyncTaskStatus,
    TargetService,
};
use kirana_core::domain::user::{User, UserId};

pub mod catalog;
pub mod credential;
pub mod inventory_log;
pub mod memory;
pub mod order;
pub mod quote;
pub mod submission;
pub mod sync_task;
pub mod user;

pub use catalog::SqlCatalogRepository;
pub use credential::SqlCredentialRepository;
pub use inventory_log::SqlInventoryLogRepository;
pub use memory::{
    InMemoryCatalogRepository, InMemoryCredentialRepository, InMemoryInventoryLogRepository,
    InMemoryOrderRepository, InMemoryQuoteRepository, InMemorySubmissionRepository,
    InMemorySyncTaskRepository, InMemoryUserRepository,
};
pub use order::SqlOrderRepository;
pub use quote::SqlQuoteRepository;
pub use submission::SqlSubmissionRepository;
pub use sync_task::SqlSyncTaskRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait SyncTaskRepository: Send + Sync {
    async fn save(&self, task: SyncTask) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &SyncTaskId) -> Result<Option<SyncTask>, RepositoryError>;

    /// Atomically claims up to `limit` due tasks (`pending`, or `retrying`
    /// whose `next_retry_at` has elapsed). A claimed task is invisible to
    /// other dispatch passes until it is settled or its claim goes stale
    /// after `claim_timeout_secs`.
    async fn claim_due(
        &self,
        limit: u32,
        now: DateTime<Utc>,
        claim_timeout_secs: i64,
    ) -> Result<Vec<SyncTask>, RepositoryError>;

    async fn status_counts(&self) -> Result<Vec<(SyncTaskStatus, i64)>, RepositoryError>;
}

#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn find(&self, service: TargetService) -> Result<Option<Credential>, RepositoryError>;

    /// Upsert keyed by service identity; concurrent refreshes must never
    /// create duplicate rows.
    async fn upsert(&self, credential: Credential) -> Result<(), RepositoryError>;

    async fn delete(&self, service: TargetService) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait InventoryLogRepository: Send + Sync {
    async fn append(&self, log: InventorySyncLog) -> Result<(), RepositoryError>;

    async fn status_counts(&self) -> Result<Vec<(SyncLogStatus, i64)>, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;

    async fn set_crm_contact_id(
        &self,
        id: &UserId,
        contact_id: &str,
    ) -> Result<(), RepositoryError>;

    async fn set_accounting_contact_id(
        &self,
        id: &UserId,
        contact_id: &str,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn set_invoice_id(&self, id: &OrderId, invoice_id: &str)
        -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait QuoteRepository: Send + Sync {
    async fn find_by_id(&self, id: &B2bQuoteId) -> Result<Option<B2bQuote>, RepositoryError>;

    async fn set_estimate_id(
        &self,
        id: &B2bQuoteId,
        estimate_id: &str,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_variant(&self, id: &VariantId)
        -> Result<Option<ProductVariant>, RepositoryError>;

    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError>;

    async fn set_item_id(
        &self,
        id: &VariantId,
        item_id: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn set_stock_on_hand(&self, id: &VariantId, quantity: i64)
        -> Result<(), RepositoryError>;

    /// Variants of active products that have never been pushed or changed
    /// locally since their last push, oldest first.
    async fn push_candidates(&self, limit: u32) -> Result<Vec<VariantId>, RepositoryError>;
}

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &SubmissionId,
    ) -> Result<Option<ContactSubmission>, RepositoryError>;
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    value.parse::<Decimal>().map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    value.map(|raw| parse_decimal(column, raw)).transpose()
}
