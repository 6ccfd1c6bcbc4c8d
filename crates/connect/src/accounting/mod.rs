mod adapter;
mod api;

pub use adapter::{AccountingSyncAdapter, BatchPushSummary};
pub use api::{AccountingApi, HttpAccountingApi, RemoteItem};
