//! Sync queue state machine.
//!
//! Pure transition logic for durable sync tasks: `pending -> {success |
//! retrying}`, `retrying -> {success | retrying | failed}`. All persistence
//! and dispatch policy lives elsewhere; this module only computes the next
//! task state so transitions stay deterministic and testable.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::sync::{
    mask_payload, SyncEntityType, SyncOperation, SyncOutcome, SyncTask, SyncTaskId, SyncTaskStatus,
    TargetService,
};

#[derive(Clone, Debug)]
pub struct SyncEngineConfig {
    /// Attempt ceiling applied to newly created tasks.
    pub default_max_attempts: u32,
    /// Base delay for the exponential backoff schedule.
    pub base_retry_delay_secs: i64,
    /// Upper bound on a single backoff delay. The source behavior is
    /// unbounded; the cap never bites under the default attempt ceiling.
    pub max_retry_delay_secs: i64,
    /// How long a claimed task may run before another dispatch pass may
    /// reclaim it.
    pub claim_timeout_secs: i64,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: 5,
            base_retry_delay_secs: 300,
            max_retry_delay_secs: 86_400,
            claim_timeout_secs: 600,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SyncTransitionError {
    #[error("sync task {id} is already terminal ({status:?})")]
    AlreadyTerminal { id: SyncTaskId, status: SyncTaskStatus },
}

/// Specification for a task about to be enqueued.
#[derive(Clone, Debug)]
pub struct NewSyncTask {
    pub entity_type: SyncEntityType,
    pub entity_id: String,
    pub operation: SyncOperation,
    pub target_service: TargetService,
    pub target_entity_type: String,
    pub request_payload: Option<Value>,
}

#[derive(Clone, Debug, Default)]
pub struct SyncEngine {
    config: SyncEngineConfig,
}

impl SyncEngine {
    pub fn new(config: SyncEngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyncEngineConfig {
        &self.config
    }

    pub fn create_task(&self, spec: NewSyncTask) -> SyncTask {
        let now = Utc::now();
        SyncTask {
            id: SyncTaskId(Uuid::new_v4().to_string()),
            entity_type: spec.entity_type,
            entity_id: spec.entity_id,
            operation: spec.operation,
            target_service: spec.target_service,
            target_entity_type: spec.target_entity_type,
            status: SyncTaskStatus::Pending,
            attempt_count: 0,
            max_attempts: self.config.default_max_attempts,
            next_retry_at: None,
            error_message: None,
            request_payload: spec
                .request_payload
                .map(|payload| mask_payload(&payload).to_string()),
            response_payload: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Settles a claimed task as successful. A `Skipped` outcome lands here
    /// too: the non-qualifying predicate is consumed, not retried.
    pub fn complete(
        &self,
        mut task: SyncTask,
        outcome: &SyncOutcome,
    ) -> Result<SyncTask, SyncTransitionError> {
        self.ensure_open(&task)?;

        task.status = SyncTaskStatus::Success;
        task.response_payload = Some(mask_payload(&outcome.response_payload()).to_string());
        task.error_message = None;
        task.next_retry_at = None;
        task.claimed_at = None;
        task.updated_at = Utc::now();
        Ok(task)
    }

    /// Settles a claimed task as failed. Attempts remaining schedule a retry
    /// with exponential backoff; an exhausted task becomes terminal.
    pub fn fail(&self, mut task: SyncTask, reason: &str) -> Result<SyncTask, SyncTransitionError> {
        self.ensure_open(&task)?;

        let now = Utc::now();
        task.attempt_count = (task.attempt_count + 1).min(task.max_attempts);
        task.claimed_at = None;
        task.updated_at = now;

        if task.attempt_count >= task.max_attempts {
            task.status = SyncTaskStatus::Failed;
            task.error_message = Some(format!("Max attempts reached: {reason}"));
            task.next_retry_at = None;
        } else {
            task.status = SyncTaskStatus::Retrying;
            task.error_message = Some(reason.to_string());
            task.next_retry_at = Some(now + self.retry_delay(task.attempt_count));
        }
        Ok(task)
    }

    /// Backoff delay for the n-th retry: `base * 2^(n-1)`, capped.
    pub fn retry_delay(&self, attempt_count: u32) -> Duration {
        let exponent = attempt_count.saturating_sub(1).min(32);
        let delay = self
            .config
            .base_retry_delay_secs
            .saturating_mul(1_i64 << exponent)
            .min(self.config.max_retry_delay_secs);
        Duration::seconds(delay)
    }

    /// Whether a dispatch pass should pick this task up now.
    pub fn is_due(&self, task: &SyncTask, now: DateTime<Utc>) -> bool {
        match task.status {
            SyncTaskStatus::Pending => true,
            SyncTaskStatus::Retrying => {
                task.next_retry_at.map_or(true, |next_retry_at| next_retry_at <= now)
            }
            SyncTaskStatus::Success | SyncTaskStatus::Failed => false,
        }
    }

    fn ensure_open(&self, task: &SyncTask) -> Result<(), SyncTransitionError> {
        if task.status.is_terminal() {
            return Err(SyncTransitionError::AlreadyTerminal {
                id: task.id.clone(),
                status: task.status,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use super::{NewSyncTask, SyncEngine, SyncEngineConfig, SyncTransitionError};
    use crate::domain::sync::{
        SyncEntityType, SyncOperation, SyncOutcome, SyncTaskStatus, TargetService,
    };

    fn engine() -> SyncEngine {
        SyncEngine::new(SyncEngineConfig::default())
    }

    fn order_task(engine: &SyncEngine) -> crate::domain::sync::SyncTask {
        engine.create_task(NewSyncTask {
            entity_type: SyncEntityType::Order,
            entity_id: "O1".to_string(),
            operation: SyncOperation::Create,
            target_service: TargetService::Accounting,
            target_entity_type: "Invoice".to_string(),
            request_payload: Some(json!({ "order_id": "O1", "email": "asha@example.com" })),
        })
    }

    #[test]
    fn create_task_starts_pending_with_masked_request_payload() {
        let engine = engine();
        let task = order_task(&engine);

        assert_eq!(task.status, SyncTaskStatus::Pending);
        assert_eq!(task.attempt_count, 0);
        assert_eq!(task.max_attempts, 5);
        assert!(task.next_retry_at.is_none());

        let payload: serde_json::Value =
            serde_json::from_str(task.request_payload.as_deref().expect("payload")).expect("json");
        assert_eq!(payload["email"], "***");
        assert_eq!(payload["order_id"], "O1");
    }

    #[test]
    fn complete_transitions_to_success_and_clears_error() {
        let engine = engine();
        let task = order_task(&engine);

        let settled = engine
            .complete(task, &SyncOutcome::Completed(json!({ "invoice_id": "INV-9" })))
            .expect("complete");

        assert_eq!(settled.status, SyncTaskStatus::Success);
        assert!(settled.error_message.is_none());
        assert!(settled.next_retry_at.is_none());
        assert!(settled.response_payload.expect("response").contains("INV-9"));
    }

    #[test]
    fn skipped_outcome_settles_as_success_with_marker() {
        let engine = engine();
        let task = order_task(&engine);

        let settled = engine
            .complete(task, &SyncOutcome::Skipped("order not paid".to_string()))
            .expect("complete");

        assert_eq!(settled.status, SyncTaskStatus::Success);
        assert!(settled.response_payload.expect("response").contains("skipped"));
    }

    #[test]
    fn backoff_sequence_doubles_from_base_delay() {
        let engine = engine();

        assert_eq!(engine.retry_delay(1), Duration::seconds(300));
        assert_eq!(engine.retry_delay(2), Duration::seconds(600));
        assert_eq!(engine.retry_delay(3), Duration::seconds(1_200));
        assert_eq!(engine.retry_delay(4), Duration::seconds(2_400));
    }

    #[test]
    fn backoff_delay_is_capped() {
        let engine = SyncEngine::new(SyncEngineConfig {
            base_retry_delay_secs: 300,
            max_retry_delay_secs: 3_600,
            ..SyncEngineConfig::default()
        });

        assert_eq!(engine.retry_delay(10), Duration::seconds(3_600));
    }

    #[test]
    fn repeated_failures_exhaust_into_terminal_failed() {
        let engine = engine();
        let mut task = order_task(&engine);

        for attempt in 1..5 {
            task = engine.fail(task, "upstream 502").expect("fail");
            assert_eq!(task.status, SyncTaskStatus::Retrying);
            assert_eq!(task.attempt_count, attempt);
            assert!(task.next_retry_at.is_some());
        }

        task = engine.fail(task, "upstream 502").expect("fail");
        assert_eq!(task.status, SyncTaskStatus::Failed);
        assert_eq!(task.attempt_count, task.max_attempts);
        assert!(task.next_retry_at.is_none());
        assert_eq!(task.error_message.as_deref(), Some("Max attempts reached: upstream 502"));
    }

    #[test]
    fn terminal_task_rejects_further_transitions() {
        let engine = engine();
        let task = order_task(&engine);
        let settled =
            engine.complete(task, &SyncOutcome::Completed(json!({}))).expect("complete");

        let result = engine.fail(settled, "late failure");
        assert!(matches!(result, Err(SyncTransitionError::AlreadyTerminal { .. })));
    }

    #[test]
    fn due_selection_covers_pending_and_elapsed_retries() {
        let engine = engine();
        let now = Utc::now();

        let pending = order_task(&engine);
        assert!(engine.is_due(&pending, now));

        let mut retrying = engine.fail(order_task(&engine), "timeout").expect("fail");
        retrying.next_retry_at = Some(now - Duration::seconds(1));
        assert!(engine.is_due(&retrying, now));

        retrying.next_retry_at = Some(now + Duration::seconds(60));
        assert!(!engine.is_due(&retrying, now));

        let done = engine
            .complete(order_task(&engine), &SyncOutcome::Completed(serde_json::json!({})))
            .expect("complete");
        assert!(!engine.is_due(&done, now));
    }
}
