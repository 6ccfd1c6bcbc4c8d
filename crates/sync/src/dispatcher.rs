use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use kirana_connect::{AccountingSyncAdapter, AdapterError, CrmSyncAdapter};
use kirana_core::domain::order::OrderId;
use kirana_core::domain::product::VariantId;
use kirana_core::domain::quote::B2bQuoteId;
use kirana_core::domain::submission::SubmissionId;
use kirana_core::domain::sync::{
    SyncEntityType, SyncOperation, SyncOutcome, SyncTask, SyncTaskStatus, TargetService,
};
use kirana_core::domain::user::UserId;
use kirana_core::sync_engine::{SyncEngine, SyncTransitionError};
use kirana_db::repositories::{RepositoryError, SyncTaskRepository};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Transition(#[from] SyncTransitionError),
}

/// Counts for one dispatch pass. `succeeded` includes skipped outcomes;
/// `skipped` breaks them out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub claimed: u32,
    pub succeeded: u32,
    pub skipped: u32,
    pub retried: u32,
    pub failed: u32,
}

/// Consumer side of the sync queue. One pass claims a batch of due tasks,
/// routes each to its adapter, and settles the result through the engine.
/// A mutex keeps passes from overlapping within this process; the claim
/// column keeps them from overlapping across processes.
pub struct SyncDispatcher {
    engine: SyncEngine,
    tasks: Arc<dyn SyncTaskRepository>,
    crm: Arc<CrmSyncAdapter>,
    accounting: Arc<AccountingSyncAdapter>,
    pass_lock: Mutex<()>,
}

impl SyncDispatcher {
    pub fn new(
        engine: SyncEngine,
        tasks: Arc<dyn SyncTaskRepository>,
        crm: Arc<CrmSyncAdapter>,
        accounting: Arc<AccountingSyncAdapter>,
    ) -> Self {
        Self { engine, tasks, crm, accounting, pass_lock: Mutex::new(()) }
    }

    pub async fn dispatch(&self, batch_size: u32) -> Result<DispatchSummary, DispatchError> {
        let _guard = self.pass_lock.lock().await;

        let claim_timeout = self.engine.config().claim_timeout_secs;
        let claimed = self.tasks.claim_due(batch_size, Utc::now(), claim_timeout).await?;

        let mut summary = DispatchSummary { claimed: claimed.len() as u32, ..Default::default() };

        for task in claimed {
            let task_id = task.id.clone();
            let settled = match self.execute(&task).await {
                Ok(outcome) => {
                    if outcome.is_skipped() {
                        summary.skipped += 1;
                    }
                    summary.succeeded += 1;
                    self.engine.complete(task, &outcome)?
                }
                Err(reason) => {
                    let failed = self.engine.fail(task, &reason)?;
                    match failed.status {
                        SyncTaskStatus::Failed => summary.failed += 1,
                        _ => summary.retried += 1,
                    }
                    warn!(
                        event_name = "sync.task_attempt_failed",
                        task_id = %task_id,
                        status = failed.status.as_str(),
                        attempt_count = failed.attempt_count,
                        reason = %reason,
                    );
                    failed
                }
            };
            self.tasks.save(settled).await?;
        }

        info!(
            event_name = "sync.dispatch_pass",
            claimed = summary.claimed,
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            retried = summary.retried,
            failed = summary.failed,
        );
        Ok(summary)
    }

    /// Routes one task to its adapter. Any adapter error collapses into the
    /// failure reason string stored on the task.
    async fn execute(&self, task: &SyncTask) -> Result<SyncOutcome, String> {
        use SyncEntityType as Entity;
        use SyncOperation as Op;
        use TargetService as Service;

        let result: Result<SyncOutcome, AdapterError> =
            match (task.entity_type, task.operation, task.target_service) {
                (Entity::User, Op::Create | Op::Update, Service::Crm) => {
                    self.crm.sync_user_to_contact(&UserId(task.entity_id.clone())).await
                }
                (Entity::B2bQuote, Op::Create, Service::Crm) => {
                    self.crm.create_lead_from_quote(&B2bQuoteId(task.entity_id.clone())).await
                }
                (Entity::ContactSubmission, Op::Create, Service::Crm) => {
                    self.crm
                        .create_lead_from_submission(&SubmissionId(task.entity_id.clone()))
                        .await
                }
                (Entity::Order, Op::Create | Op::Update, Service::Accounting) => {
                    self.accounting.sync_order_to_invoice(&OrderId(task.entity_id.clone())).await
                }
                (Entity::B2bQuote, Op::Create | Op::Update, Service::Accounting) => {
                    self.accounting
                        .sync_quote_to_estimate(&B2bQuoteId(task.entity_id.clone()))
                        .await
                }
                (Entity::Inventory, Op::Create | Op::Update, Service::Accounting) => {
                    self.accounting
                        .push_inventory_item(&VariantId(task.entity_id.clone()))
                        .await
                }
                (Entity::Inventory, Op::SyncPull, Service::Accounting) => {
                    self.accounting
                        .pull_inventory_item(&VariantId(task.entity_id.clone()))
                        .await
                }
                (entity, operation, service) => {
                    return Err(format!(
                        "no adapter for {}/{} against {}",
                        entity.as_str(),
                        operation.as_str(),
                        service.as_str(),
                    ));
                }
            };

        result.map_err(|error| error.to_string())
    }
}
