//! Adapters for the external CRM and accounting services: OAuth token
//! lifecycle, HTTP API clients, and the sync logic that maps storefront
//! records onto remote ones. Adapters perform exactly one attempt per call;
//! retry policy belongs to the task queue.

pub mod accounting;
pub mod crm;
pub mod error;
pub mod token;

pub use accounting::{
    AccountingApi, AccountingSyncAdapter, BatchPushSummary, HttpAccountingApi, RemoteItem,
};
pub use crm::{CrmApi, CrmSyncAdapter, HttpCrmApi};
pub use error::AdapterError;
pub use token::{AuthorizationServer, HttpAuthorizationServer, TokenManager, TokenResponse};
