use std::sync::Arc;

use serde_json::json;

use kirana_core::domain::order::OrderId;
use kirana_core::domain::product::VariantId;
use kirana_core::domain::quote::B2bQuoteId;
use kirana_core::domain::submission::SubmissionId;
use kirana_core::domain::sync::{
    SyncEntityType, SyncOperation, SyncTask, SyncTaskStatus, TargetService,
};
use kirana_core::domain::user::UserId;
use kirana_core::sync_engine::{NewSyncTask, SyncEngine};
use kirana_db::repositories::{RepositoryError, SyncTaskRepository};

/// Producer side of the sync queue. Creating a task is cheap and always
/// local; no external call happens until a dispatch pass picks it up.
pub struct SyncQueue {
    engine: SyncEngine,
    tasks: Arc<dyn SyncTaskRepository>,
}

impl SyncQueue {
    pub fn new(engine: SyncEngine, tasks: Arc<dyn SyncTaskRepository>) -> Self {
        Self { engine, tasks }
    }

    pub async fn enqueue(&self, spec: NewSyncTask) -> Result<SyncTask, RepositoryError> {
        let task = self.engine.create_task(spec);
        self.tasks.save(task.clone()).await?;
        Ok(task)
    }

    pub async fn enqueue_user_contact_sync(
        &self,
        user_id: &UserId,
    ) -> Result<SyncTask, RepositoryError> {
        self.enqueue(NewSyncTask {
            entity_type: SyncEntityType::User,
            entity_id: user_id.0.clone(),
            operation: SyncOperation::Create,
            target_service: TargetService::Crm,
            target_entity_type: "Contact".to_string(),
            request_payload: Some(json!({ "user_id": user_id.0 })),
        })
        .await
    }

    pub async fn enqueue_order_invoice(
        &self,
        order_id: &OrderId,
    ) -> Result<SyncTask, RepositoryError> {
        self.enqueue(NewSyncTask {
            entity_type: SyncEntityType::Order,
            entity_id: order_id.0.clone(),
            operation: SyncOperation::Create,
            target_service: TargetService::Accounting,
            target_entity_type: "Invoice".to_string(),
            request_payload: Some(json!({ "order_id": order_id.0 })),
        })
        .await
    }

    pub async fn enqueue_quote_estimate(
        &self,
        quote_id: &B2bQuoteId,
    ) -> Result<SyncTask, RepositoryError> {
        self.enqueue(NewSyncTask {
            entity_type: SyncEntityType::B2bQuote,
            entity_id: quote_id.0.clone(),
            operation: SyncOperation::Create,
            target_service: TargetService::Accounting,
            target_entity_type: "Estimate".to_string(),
            request_payload: Some(json!({ "quote_id": quote_id.0 })),
        })
        .await
    }

    pub async fn enqueue_quote_lead(
        &self,
        quote_id: &B2bQuoteId,
    ) -> Result<SyncTask, RepositoryError> {
        self.enqueue(NewSyncTask {
            entity_type: SyncEntityType::B2bQuote,
            entity_id: quote_id.0.clone(),
            operation: SyncOperation::Create,
            target_service: TargetService::Crm,
            target_entity_type: "Lead".to_string(),
            request_payload: Some(json!({ "quote_id": quote_id.0 })),
        })
        .await
    }

    pub async fn enqueue_submission_lead(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<SyncTask, RepositoryError> {
        self.enqueue(NewSyncTask {
            entity_type: SyncEntityType::ContactSubmission,
            entity_id: submission_id.0.clone(),
            operation: SyncOperation::Create,
            target_service: TargetService::Crm,
            target_entity_type: "Lead".to_string(),
            request_payload: Some(json!({ "submission_id": submission_id.0 })),
        })
        .await
    }

    pub async fn enqueue_inventory_push(
        &self,
        variant_id: &VariantId,
    ) -> Result<SyncTask, RepositoryError> {
        self.enqueue(NewSyncTask {
            entity_type: SyncEntityType::Inventory,
            entity_id: variant_id.0.clone(),
            operation: SyncOperation::Update,
            target_service: TargetService::Accounting,
            target_entity_type: "Item".to_string(),
            request_payload: Some(json!({ "variant_id": variant_id.0 })),
        })
        .await
    }

    pub async fn enqueue_inventory_pull(
        &self,
        variant_id: &VariantId,
    ) -> Result<SyncTask, RepositoryError> {
        self.enqueue(NewSyncTask {
            entity_type: SyncEntityType::Inventory,
            entity_id: variant_id.0.clone(),
            operation: SyncOperation::SyncPull,
            target_service: TargetService::Accounting,
            target_entity_type: "Item".to_string(),
            request_payload: Some(json!({ "variant_id": variant_id.0 })),
        })
        .await
    }

    pub async fn status_counts(
        &self,
    ) -> Result<Vec<(SyncTaskStatus, i64)>, RepositoryError> {
        self.tasks.status_counts().await
    }
}
