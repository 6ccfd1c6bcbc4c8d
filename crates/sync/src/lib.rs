//! Durable sync queue orchestration: enqueue producers and the dispatch loop
//! that claims due tasks and runs them through the service adapters.

pub mod dispatcher;
pub mod enqueue;

pub use dispatcher::{DispatchError, DispatchSummary, SyncDispatcher};
pub use enqueue::SyncQueue;
