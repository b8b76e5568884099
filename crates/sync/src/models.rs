//! Sync trigger and result models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradelog_brokers::{ConnectionTestResult, Platform};
use tradelog_core::accounts::BrokerAccount;
use tradelog_core::events::SyncTotals;

/// Inbound sync trigger.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Restrict the batch to one platform.
    #[serde(default)]
    pub platform: Option<Platform>,
    /// Start of the fetch window; defaults to `end - 90 days`.
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    /// End of the fetch window; defaults to now.
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    /// Fresh one-time code for platforms that need one per attempt.
    #[serde(default)]
    pub totp_code: Option<String>,
    /// Bypass the governor's response cache.
    #[serde(default)]
    pub force_refresh: bool,
    /// Probe connections without fetching trades.
    #[serde(default)]
    pub test_only: bool,
}

/// Outcome of syncing one account.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSyncResult {
    pub account_id: String,
    pub platform: Platform,
    pub success: bool,
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    #[serde(default)]
    pub error_code: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_test: Option<ConnectionTestResult>,
}

impl AccountSyncResult {
    /// A failed account outcome with a classified error code.
    pub fn failure(account: &BrokerAccount, code: &str, message: impl Into<String>) -> Self {
        Self {
            account_id: account.id.clone(),
            platform: account.platform,
            success: false,
            fetched: 0,
            created: 0,
            updated: 0,
            skipped: 0,
            error_code: Some(code.to_string()),
            message: message.into(),
            connection_test: None,
        }
    }

    /// This account's contribution to the batch totals.
    pub fn totals(&self) -> SyncTotals {
        SyncTotals {
            fetched: self.fetched,
            created: self.created,
            updated: self.updated,
            skipped: self.skipped,
        }
    }
}

/// Outcome of one sync batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatchResult {
    /// True iff at least one account succeeded; partial failure never
    /// fails the batch.
    pub success: bool,
    pub accounts: Vec<AccountSyncResult>,
    pub totals: SyncTotals,
    /// Dominant error code, present only when every account failed.
    #[serde(default)]
    pub error_code: Option<String>,
}

/// Picks the single dominant error code for an all-failed batch, by
/// priority: totp_invalid > token_expired > auth_failed > everything else.
pub fn dominant_error_code(results: &[AccountSyncResult]) -> Option<String> {
    results
        .iter()
        .filter(|r| !r.success)
        .filter_map(|r| r.error_code.as_deref())
        .min_by_key(|code| error_priority(code))
        .map(String::from)
}

fn error_priority(code: &str) -> u8 {
    match code {
        "totp_invalid" => 0,
        "token_expired" => 1,
        "auth_failed" => 2,
        _ => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradelog_brokers::BrokerCredentials;
    use tradelog_core::accounts::NewBrokerAccount;

    fn account() -> BrokerAccount {
        BrokerAccount::from_new(NewBrokerAccount {
            user_id: "user-1".to_string(),
            credentials: BrokerCredentials::Dhan {
                client_id: "1000001".to_string(),
                access_token: "token".to_string(),
                token_expiry: None,
            },
        })
    }

    #[test]
    fn dominant_error_follows_the_priority_order() {
        let account = account();
        let results = vec![
            AccountSyncResult::failure(&account, "auth_failed", "bad pin"),
            AccountSyncResult::failure(&account, "token_expired", "stale session"),
            AccountSyncResult::failure(&account, "fetch_failed", "boom"),
        ];

        assert_eq!(
            dominant_error_code(&results).as_deref(),
            Some("token_expired")
        );
    }

    #[test]
    fn totp_outranks_everything() {
        let account = account();
        let results = vec![
            AccountSyncResult::failure(&account, "token_expired", "stale"),
            AccountSyncResult::failure(&account, "totp_invalid", "code rejected"),
        ];

        assert_eq!(
            dominant_error_code(&results).as_deref(),
            Some("totp_invalid")
        );
    }

    #[test]
    fn successful_results_carry_no_dominant_error() {
        assert_eq!(dominant_error_code(&[]), None);
    }
}
