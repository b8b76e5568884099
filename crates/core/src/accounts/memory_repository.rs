//! In-memory broker account repository.
//!
//! The relational store is an external collaborator; this implementation
//! backs tests and embedded use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::accounts_model::{BrokerAccount, NewBrokerAccount, SyncStatus};
use super::accounts_traits::BrokerAccountRepositoryTrait;
use crate::errors::{Error, Result};
use tradelog_brokers::{BrokerCredentials, Platform};

/// Keyed in-memory account store.
#[derive(Clone, Default)]
pub struct InMemoryBrokerAccountRepository {
    accounts: Arc<Mutex<HashMap<String, BrokerAccount>>>,
}

impl InMemoryBrokerAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an existing account record, returning its id.
    pub fn insert(&self, account: BrokerAccount) -> String {
        let id = account.id.clone();
        self.accounts.lock().unwrap().insert(id.clone(), account);
        id
    }

    fn with_account<T>(
        &self,
        account_id: &str,
        mutate: impl FnOnce(&mut BrokerAccount) -> T,
    ) -> Result<T> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(account_id)
            .ok_or_else(|| Error::NotFound(format!("BrokerAccount {}", account_id)))?;
        Ok(mutate(account))
    }
}

#[async_trait]
impl BrokerAccountRepositoryTrait for InMemoryBrokerAccountRepository {
    async fn create(&self, new_account: NewBrokerAccount) -> Result<BrokerAccount> {
        let account = BrokerAccount::from_new(new_account);
        self.accounts
            .lock()
            .unwrap()
            .insert(account.id.clone(), account.clone());
        Ok(account)
    }

    async fn update_credentials(
        &self,
        account_id: &str,
        credentials: BrokerCredentials,
    ) -> Result<BrokerAccount> {
        self.with_account(account_id, |account| {
            account.credentials = credentials;
            account.updated_at = Utc::now();
            account.clone()
        })
    }

    async fn set_sync_outcome(
        &self,
        account_id: &str,
        status: SyncStatus,
        error: Option<String>,
        synced_at: DateTime<Utc>,
    ) -> Result<BrokerAccount> {
        self.with_account(account_id, |account| {
            account.sync_status = status;
            account.last_sync_error = error;
            account.last_sync_at = Some(synced_at);
            account.updated_at = Utc::now();
            account.clone()
        })
    }

    async fn deactivate(&self, account_id: &str) -> Result<usize> {
        self.with_account(account_id, |account| {
            account.is_active = false;
            account.updated_at = Utc::now();
            1
        })
    }

    fn get_by_id(&self, account_id: &str) -> Result<BrokerAccount> {
        self.accounts
            .lock()
            .unwrap()
            .get(account_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("BrokerAccount {}", account_id)))
    }

    fn list_for_user(
        &self,
        user_id: &str,
        platform: Option<Platform>,
        active_only: bool,
    ) -> Result<Vec<BrokerAccount>> {
        let mut accounts: Vec<BrokerAccount> = self
            .accounts
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.user_id == user_id)
            .filter(|a| platform.map(|p| a.platform == p).unwrap_or(true))
            .filter(|a| !active_only || a.is_active)
            .cloned()
            .collect();
        // Stable iteration order for callers and tests.
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dhan_account(user_id: &str) -> NewBrokerAccount {
        NewBrokerAccount {
            user_id: user_id.to_string(),
            credentials: BrokerCredentials::Dhan {
                client_id: "1000001".to_string(),
                access_token: "token".to_string(),
                token_expiry: None,
            },
        }
    }

    #[tokio::test]
    async fn create_list_and_deactivate() {
        let repo = InMemoryBrokerAccountRepository::new();
        let account = repo.create(dhan_account("user-1")).await.unwrap();
        repo.create(dhan_account("user-2")).await.unwrap();

        assert_eq!(repo.list_for_user("user-1", None, true).unwrap().len(), 1);

        repo.deactivate(&account.id).await.unwrap();
        assert!(repo.list_for_user("user-1", None, true).unwrap().is_empty());
        assert_eq!(repo.list_for_user("user-1", None, false).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sync_outcome_updates_status_and_timestamp() {
        let repo = InMemoryBrokerAccountRepository::new();
        let account = repo.create(dhan_account("user-1")).await.unwrap();

        let now = Utc::now();
        let updated = repo
            .set_sync_outcome(
                &account.id,
                SyncStatus::Failed,
                Some("token_expired".to_string()),
                now,
            )
            .await
            .unwrap();

        assert_eq!(updated.sync_status, SyncStatus::Failed);
        assert_eq!(updated.last_sync_at, Some(now));
        assert_eq!(updated.last_sync_error.as_deref(), Some("token_expired"));
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let repo = InMemoryBrokerAccountRepository::new();
        assert!(matches!(
            repo.get_by_id("missing"),
            Err(Error::NotFound(_))
        ));
    }
}
