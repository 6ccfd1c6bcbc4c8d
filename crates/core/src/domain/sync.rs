use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncTaskId(pub String);

impl std::fmt::Display for SyncTaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetService {
    Crm,
    Accounting,
}

impl TargetService {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crm => "crm",
            Self::Accounting => "accounting",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "crm" => Some(Self::Crm),
            "accounting" => Some(Self::Accounting),
            _ => None,
        }
    }
}

impl std::fmt::Display for TargetService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEntityType {
    User,
    Order,
    B2bQuote,
    Inventory,
    ContactSubmission,
}

impl SyncEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Order => "order",
            Self::B2bQuote => "b2b_quote",
            Self::Inventory => "inventory",
            Self::ContactSubmission => "contact_submission",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "order" => Some(Self::Order),
            "b2b_quote" => Some(Self::B2bQuote),
            "inventory" => Some(Self::Inventory),
            "contact_submission" => Some(Self::ContactSubmission),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
    SyncPull,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::SyncPull => "sync_pull",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "sync_pull" => Some(Self::SyncPull),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTaskStatus {
    Pending,
    Retrying,
    Success,
    Failed,
}

impl SyncTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retrying => "retrying",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "retrying" => Some(Self::Retrying),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// Durable unit of synchronization work. Tasks are never deleted; once a
/// terminal status is reached the row becomes a permanent audit record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: SyncTaskId,
    pub entity_type: SyncEntityType,
    pub entity_id: String,
    pub operation: SyncOperation,
    pub target_service: TargetService,
    pub target_entity_type: String,
    pub status: SyncTaskStatus,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub request_payload: Option<String>,
    pub response_payload: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a single adapter invocation. `Skipped` is terminal and treated
/// as success by the queue, but stays distinguishable in payloads and logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(Value),
    Skipped(String),
}

impl SyncOutcome {
    pub fn response_payload(&self) -> Value {
        match self {
            Self::Completed(value) => value.clone(),
            Self::Skipped(reason) => serde_json::json!({ "skipped": reason }),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

/// OAuth credential for one external service. Owned exclusively by the token
/// manager; one persisted row per service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub service: TargetService,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scope: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryOp {
    Push,
    Pull,
}

impl InventoryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "push" => Some(Self::Push),
            "pull" => Some(Self::Pull),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncLogStatus {
    Success,
    Skipped,
    Failed,
}

impl SyncLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => Some(Self::Success),
            "skipped" => Some(Self::Skipped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Append-only record of one inventory reconciliation attempt. Used for audit
/// and statistics only; later runs never read it back for decisions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySyncLog {
    pub variant_id: String,
    pub operation: InventoryOp,
    pub local_quantity: i64,
    pub remote_quantity: Option<i64>,
    pub difference: Option<i64>,
    pub status: SyncLogStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

const MASKED_KEYS: &[&str] = &[
    "email",
    "phone",
    "mobile",
    "gstin",
    "gst_no",
    "first_name",
    "last_name",
    "contact_name",
    "access_token",
    "refresh_token",
];

/// Masks personally identifiable fields before a payload snapshot is
/// persisted on the task row. The live request to the external service is
/// never masked.
pub fn mask_payload(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut masked = serde_json::Map::with_capacity(map.len());
            for (key, inner) in map {
                if MASKED_KEYS.contains(&key.to_ascii_lowercase().as_str()) {
                    masked.insert(key.clone(), Value::String("***".to_string()));
                } else {
                    masked.insert(key.clone(), mask_payload(inner));
                }
            }
            Value::Object(masked)
        }
        Value::Array(items) => Value::Array(items.iter().map(mask_payload).collect()),
        other => other.clone(),
    }
}
