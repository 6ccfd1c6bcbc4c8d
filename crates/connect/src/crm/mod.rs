mod adapter;
mod api;

pub use adapter::CrmSyncAdapter;
pub use api::{CrmApi, HttpCrmApi, RemoteContact};
