//! Sync orchestrator.
//!
//! Drives one sync batch: iterates the requesting user's active accounts
//! strictly sequentially (so the shared governor's pacing holds), builds
//! an adapter per account, authenticates, fetches, pairs, resolves, and
//! classifies failures. A failing account never aborts the batch.
//!
//! There is no batch-level timeout or cancellation token; an individual
//! call is bounded only by its transport timeout plus retry backoff.
//! Accounts are read then written without a per-account lock, so
//! concurrent syncs of the same account resolve last-writer-wins.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{error, info, warn};

use crate::classify::refine_error_code;
use crate::models::{dominant_error_code, AccountSyncResult, SyncBatchResult, SyncRequest};
use crate::notifier::BatchNotifier;
use tradelog_brokers::{AdapterFactory, AuthFailureReason, BuildOptions, Platform};
use tradelog_core::accounts::{BrokerAccount, BrokerAccountRepositoryTrait, SyncStatus};
use tradelog_core::events::SyncTotals;
use tradelog_core::trades::{pair_fills, TradeResolver};
use tradelog_core::Result;

/// Configuration for sync batches.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Fetch window when the trigger does not supply one.
    pub default_window_days: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_window_days: 90,
        }
    }
}

/// Orchestrates trade synchronization across a user's broker accounts.
pub struct SyncOrchestrator {
    accounts: Arc<dyn BrokerAccountRepositoryTrait>,
    resolver: TradeResolver,
    factory: Arc<dyn AdapterFactory>,
    notifier: BatchNotifier,
    config: SyncConfig,
}

impl SyncOrchestrator {
    /// Creates a new sync orchestrator.
    pub fn new(
        accounts: Arc<dyn BrokerAccountRepositoryTrait>,
        resolver: TradeResolver,
        factory: Arc<dyn AdapterFactory>,
        notifier: BatchNotifier,
        config: SyncConfig,
    ) -> Self {
        Self {
            accounts,
            resolver,
            factory,
            notifier,
            config,
        }
    }

    /// Runs one sync batch for the requesting user.
    ///
    /// Batch success is true iff at least one account succeeded. When
    /// every account fails, the result carries a single dominant error
    /// code. A completion event is published regardless of outcome.
    pub async fn sync_user(&self, user_id: &str, request: &SyncRequest) -> Result<SyncBatchResult> {
        let accounts = self
            .accounts
            .list_for_user(user_id, request.platform, true)?;
        info!(
            "Starting sync batch for {} across {} account(s)",
            user_id,
            accounts.len()
        );

        let end = request.end.unwrap_or_else(Utc::now);
        let start = request
            .start
            .unwrap_or(end - ChronoDuration::days(self.config.default_window_days));

        let mut results: Vec<AccountSyncResult> = Vec::new();
        for account in &accounts {
            let result = self.sync_account(account, request, start, end).await;
            if let Some(code) = &result.error_code {
                warn!(
                    "Account {} ({}) failed with {}: {}",
                    account.id, account.platform, code, result.message
                );
            }
            results.push(result);
        }

        let mut totals = SyncTotals::default();
        for result in &results {
            totals.add(result.totals());
        }
        let success = results.iter().any(|r| r.success);
        let error_code = if success {
            None
        } else {
            dominant_error_code(&results)
        };

        let mut platforms: Vec<Platform> = Vec::new();
        for result in &results {
            if !platforms.contains(&result.platform) {
                platforms.push(result.platform);
            }
        }
        self.notifier.notify_completed(user_id, platforms, totals);

        info!(
            "Sync batch for {} finished: success={}, {} fetched, {} created, {} updated, {} skipped",
            user_id, success, totals.fetched, totals.created, totals.updated, totals.skipped
        );
        Ok(SyncBatchResult {
            success,
            accounts: results,
            totals,
            error_code,
        })
    }

    /// Syncs one account. Never returns an error: every failure is folded
    /// into a classified result, and the account's sync status and
    /// timestamp are written on every exit path.
    async fn sync_account(
        &self,
        account: &BrokerAccount,
        request: &SyncRequest,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AccountSyncResult {
        // Accounts waiting on a one-time code are skipped outright rather
        // than burning a failed provider call.
        if account.sync_status == SyncStatus::TotpRequired && request.totp_code.is_none() {
            self.finalize(account, SyncStatus::TotpRequired, Some("totp_invalid"))
                .await;
            return AccountSyncResult::failure(
                account,
                "totp_invalid",
                "A fresh one-time code is required before this account can sync",
            );
        }

        let mut credentials = account.credentials.clone();
        if let Some(code) = &request.totp_code {
            credentials = credentials.with_totp(code);
        }

        let adapter = match self.factory.build(
            account.platform,
            credentials,
            BuildOptions {
                force_refresh: request.force_refresh,
            },
        ) {
            Ok(adapter) => adapter,
            Err(err) => {
                let code = err.error_code();
                self.finalize(account, SyncStatus::Failed, Some(code)).await;
                return AccountSyncResult::failure(account, code, err.to_string());
            }
        };

        match adapter.authenticate().await {
            Ok(true) => {
                // Persist rotated tokens so the next sync skips the full flow.
                if let Some(rotated) = adapter.rotated_credentials() {
                    if let Err(err) = self
                        .accounts
                        .update_credentials(&account.id, rotated)
                        .await
                    {
                        error!(
                            "Failed to persist rotated tokens for {}: {}",
                            account.id, err
                        );
                    }
                }
            }
            Ok(false) => {
                let reason = match adapter.state() {
                    tradelog_brokers::AdapterState::Failed(reason) => reason,
                    _ => AuthFailureReason::Unknown,
                };
                let code = reason.as_code();
                // A rejected one-time code parks the account until the user
                // supplies a fresh one.
                let status = if reason == AuthFailureReason::TotpInvalid {
                    SyncStatus::TotpRequired
                } else {
                    SyncStatus::Failed
                };
                self.finalize(account, status, Some(code)).await;
                return AccountSyncResult::failure(account, code, auth_failure_message(reason));
            }
            Err(err) => {
                let code = err.error_code();
                self.finalize(account, SyncStatus::Failed, Some(code)).await;
                return AccountSyncResult::failure(account, code, err.to_string());
            }
        }

        if request.test_only {
            let test = adapter.test_connection().await;
            let status = if test.success {
                SyncStatus::Connected
            } else {
                SyncStatus::Failed
            };
            let error = (!test.success).then(|| "fetch_failed");
            self.finalize(account, status, error).await;
            return AccountSyncResult {
                account_id: account.id.clone(),
                platform: account.platform,
                success: test.success,
                fetched: 0,
                created: 0,
                updated: 0,
                skipped: 0,
                error_code: error.map(String::from),
                message: test.message.clone(),
                connection_test: Some(test),
            };
        }

        let fills = match adapter.fetch_trades(start, end).await {
            Ok(fills) => fills,
            Err(err) => {
                let code = refine_error_code(&err);
                self.finalize(account, SyncStatus::Failed, Some(code)).await;
                return AccountSyncResult::failure(account, code, err.to_string());
            }
        };
        let fetched = fills.len();

        let candidates = pair_fills(&fills);
        match self
            .resolver
            .resolve(&account.user_id, account.platform, candidates)
            .await
        {
            Ok(outcome) => {
                self.finalize(account, SyncStatus::Success, None).await;
                AccountSyncResult {
                    account_id: account.id.clone(),
                    platform: account.platform,
                    success: true,
                    fetched,
                    created: outcome.created,
                    updated: outcome.updated,
                    skipped: outcome.skipped,
                    error_code: None,
                    message: format!(
                        "Synced {} fills: {} created, {} updated, {} skipped",
                        fetched, outcome.created, outcome.updated, outcome.skipped
                    ),
                    connection_test: None,
                }
            }
            Err(err) => {
                self.finalize(account, SyncStatus::Failed, Some("unknown"))
                    .await;
                AccountSyncResult::failure(account, "unknown", err.to_string())
            }
        }
    }

    /// Records the sync outcome on the account. Runs on every exit path;
    /// a failing status write is logged, never propagated.
    async fn finalize(&self, account: &BrokerAccount, status: SyncStatus, error: Option<&str>) {
        if let Err(err) = self
            .accounts
            .set_sync_outcome(&account.id, status, error.map(String::from), Utc::now())
            .await
        {
            error!("Failed to record sync outcome for {}: {}", account.id, err);
        }
    }
}

fn auth_failure_message(reason: AuthFailureReason) -> &'static str {
    match reason {
        AuthFailureReason::TotpInvalid => {
            "The one-time code was rejected or missing; supply a fresh code and retry"
        }
        AuthFailureReason::TokenExpired => "The stored session has expired; reconnect the account",
        AuthFailureReason::ReactivationRequired => {
            "The platform requires reactivating API access for this account"
        }
        AuthFailureReason::AuthFailed => "The platform rejected the stored credentials",
        AuthFailureReason::Unknown => "Authentication failed for an unknown reason",
    }
}
