//! Broker account repository and service traits.
//!
//! These traits define the contract for account operations without any
//! storage-specific types, allowing for different store implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::accounts_model::{BrokerAccount, NewBrokerAccount, SyncStatus};
use crate::errors::Result;
use tradelog_brokers::{BrokerCredentials, Platform};

/// Contract for broker account persistence.
///
/// The account record is read then written by the same sync invocation
/// with no per-account lock; concurrent syncs of one account resolve
/// last-writer-wins.
#[async_trait]
pub trait BrokerAccountRepositoryTrait: Send + Sync {
    /// Creates a new account record.
    async fn create(&self, new_account: NewBrokerAccount) -> Result<BrokerAccount>;

    /// Replaces the stored credential bundle (token rotation).
    async fn update_credentials(
        &self,
        account_id: &str,
        credentials: BrokerCredentials,
    ) -> Result<BrokerAccount>;

    /// Records the outcome of a sync attempt. Called on every exit path,
    /// success or failure.
    async fn set_sync_outcome(
        &self,
        account_id: &str,
        status: SyncStatus,
        error: Option<String>,
        synced_at: DateTime<Utc>,
    ) -> Result<BrokerAccount>;

    /// Soft-removes an account. Returns the number of affected records.
    async fn deactivate(&self, account_id: &str) -> Result<usize>;

    /// Retrieves an account by its ID.
    fn get_by_id(&self, account_id: &str) -> Result<BrokerAccount>;

    /// Lists a user's accounts, optionally filtered to one platform and
    /// to active records only.
    fn list_for_user(
        &self,
        user_id: &str,
        platform: Option<Platform>,
        active_only: bool,
    ) -> Result<Vec<BrokerAccount>>;
}

/// Contract for account business operations.
#[async_trait]
pub trait BrokerAccountServiceTrait: Send + Sync {
    /// Validates the credential bundle and creates the account.
    async fn connect_account(&self, new_account: NewBrokerAccount) -> Result<BrokerAccount>;

    /// Replaces credentials and resets the sync status to pending.
    async fn update_credentials(
        &self,
        account_id: &str,
        credentials: BrokerCredentials,
    ) -> Result<BrokerAccount>;

    /// Soft-removes an account.
    async fn disconnect_account(&self, account_id: &str) -> Result<()>;

    /// Retrieves an account by ID.
    fn get_account(&self, account_id: &str) -> Result<BrokerAccount>;

    /// Lists a user's active accounts.
    fn list_active_accounts(
        &self,
        user_id: &str,
        platform: Option<Platform>,
    ) -> Result<Vec<BrokerAccount>>;
}
