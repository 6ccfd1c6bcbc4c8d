pub mod config;
pub mod domain;
pub mod gst;
pub mod sync_engine;

pub use chrono;

pub use domain::order::{Order, OrderId, OrderLine, PaymentStatus};
pub use domain::product::{Product, ProductId, ProductVariant, VariantId};
pub use domain::quote::{B2bQuote, B2bQuoteId, B2bQuoteStatus, QuoteLine};
pub use domain::submission::{ContactSubmission, SubmissionId};
pub use domain::sync::{
    Credential, InventoryOp, InventorySyncLog, SyncEntityType, SyncLogStatus, SyncOperation,
    SyncOutcome, SyncTask, SyncTaskId, SyncTaskStatus, TargetService,
};
pub use domain::user::{User, UserId};
pub use gst::{compute_b2c, compute_b2b, TaxBreakdown, TaxLine};
pub use sync_engine::{NewSyncTask, SyncEngine, SyncEngineConfig, SyncTransitionError};
