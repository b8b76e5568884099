use log::debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::accounts_model::{BrokerAccount, NewBrokerAccount, SyncStatus};
use super::accounts_traits::{BrokerAccountRepositoryTrait, BrokerAccountServiceTrait};
use crate::errors::Result;
use tradelog_brokers::{BrokerCredentials, Platform};

/// Service for managing connected broker accounts.
pub struct BrokerAccountService {
    repository: Arc<dyn BrokerAccountRepositoryTrait>,
}

impl BrokerAccountService {
    /// Creates a new BrokerAccountService instance.
    pub fn new(repository: Arc<dyn BrokerAccountRepositoryTrait>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl BrokerAccountServiceTrait for BrokerAccountService {
    async fn connect_account(&self, new_account: NewBrokerAccount) -> Result<BrokerAccount> {
        new_account.credentials.validate()?;
        debug!(
            "Connecting {} account for user {}",
            new_account.credentials.platform(),
            new_account.user_id
        );
        self.repository.create(new_account).await
    }

    async fn update_credentials(
        &self,
        account_id: &str,
        credentials: BrokerCredentials,
    ) -> Result<BrokerAccount> {
        credentials.validate()?;
        self.repository
            .update_credentials(account_id, credentials)
            .await?;
        // Fresh credentials invalidate whatever the last sync concluded.
        self.repository
            .set_sync_outcome(account_id, SyncStatus::Pending, None, Utc::now())
            .await
    }

    async fn disconnect_account(&self, account_id: &str) -> Result<()> {
        self.repository.deactivate(account_id).await?;
        Ok(())
    }

    fn get_account(&self, account_id: &str) -> Result<BrokerAccount> {
        self.repository.get_by_id(account_id)
    }

    fn list_active_accounts(
        &self,
        user_id: &str,
        platform: Option<Platform>,
    ) -> Result<Vec<BrokerAccount>> {
        self.repository.list_for_user(user_id, platform, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::InMemoryBrokerAccountRepository;

    fn service() -> (BrokerAccountService, Arc<InMemoryBrokerAccountRepository>) {
        let repository = Arc::new(InMemoryBrokerAccountRepository::new());
        (BrokerAccountService::new(repository.clone()), repository)
    }

    fn dhan_account(token: &str) -> NewBrokerAccount {
        NewBrokerAccount {
            user_id: "user-1".to_string(),
            credentials: BrokerCredentials::Dhan {
                client_id: "1000001".to_string(),
                access_token: token.to_string(),
                token_expiry: None,
            },
        }
    }

    #[tokio::test]
    async fn connect_rejects_invalid_bundles() {
        let (service, _) = service();
        let result = service.connect_account(dhan_account("  ")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn connect_and_disconnect_round_trip() {
        let (service, _) = service();
        let account = service.connect_account(dhan_account("token")).await.unwrap();
        assert_eq!(account.sync_status, SyncStatus::Pending);

        assert_eq!(service.list_active_accounts("user-1", None).unwrap().len(), 1);

        service.disconnect_account(&account.id).await.unwrap();
        assert!(service.list_active_accounts("user-1", None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn fresh_credentials_reset_the_sync_status() {
        let (service, repository) = service();
        let account = service.connect_account(dhan_account("token")).await.unwrap();
        repository
            .set_sync_outcome(
                &account.id,
                SyncStatus::Failed,
                Some("token_expired".to_string()),
                Utc::now(),
            )
            .await
            .unwrap();

        let updated = service
            .update_credentials(
                &account.id,
                BrokerCredentials::Dhan {
                    client_id: "1000001".to_string(),
                    access_token: "fresh-token".to_string(),
                    token_expiry: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.sync_status, SyncStatus::Pending);
        match service.get_account(&account.id).unwrap().credentials {
            BrokerCredentials::Dhan { access_token, .. } => {
                assert_eq!(access_token, "fresh-token");
            }
            _ => panic!("Expected Dhan credentials"),
        }
    }
}
