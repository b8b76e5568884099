//! Broker account domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tradelog_brokers::{BrokerCredentials, Platform};

/// Sync lifecycle of a connected broker account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Connected but never synced.
    #[default]
    Pending,
    /// Connection verified, no trade sync yet.
    Connected,
    /// The platform needs a fresh one-time code before the next sync.
    TotpRequired,
    /// Last sync succeeded.
    Success,
    /// Last sync failed.
    Failed,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Pending => write!(f, "PENDING"),
            SyncStatus::Connected => write!(f, "CONNECTED"),
            SyncStatus::TotpRequired => write!(f, "TOTP_REQUIRED"),
            SyncStatus::Success => write!(f, "SUCCESS"),
            SyncStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// A connected brokerage account owned by a journal user.
///
/// Created on connect, mutated on token rotation and on every sync
/// attempt, soft-removed via `is_active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerAccount {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    pub credentials: BrokerCredentials,
    pub sync_status: SyncStatus,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sync_error: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for connecting a new broker account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBrokerAccount {
    pub user_id: String,
    pub credentials: BrokerCredentials,
}

impl BrokerAccount {
    /// Builds a fresh account record from connect input.
    pub fn from_new(new_account: NewBrokerAccount) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: new_account.user_id,
            platform: new_account.credentials.platform(),
            credentials: new_account.credentials,
            sync_status: SyncStatus::Pending,
            last_sync_at: None,
            last_sync_error: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
