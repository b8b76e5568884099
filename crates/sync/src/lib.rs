//! Tradelog Sync - broker synchronization orchestration.
//!
//! Drives sync batches across a user's connected broker accounts:
//! adapter construction, authentication, fetch, pairing, reconciliation,
//! failure classification, and batch-completion notification.

pub mod classify;
pub mod models;
pub mod notifier;
pub mod orchestrator;

pub use models::{dominant_error_code, AccountSyncResult, SyncBatchResult, SyncRequest};
pub use notifier::BatchNotifier;
pub use orchestrator::{SyncConfig, SyncOrchestrator};
