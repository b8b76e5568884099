//! The capability contract every platform adapter implements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::AdapterState;
use crate::errors::BrokerError;
use crate::models::{BrokerCredentials, Platform, RawFill};

/// Outcome of a non-mutating connection probe.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ConnectionTestResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            details: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Common capability contract over heterogeneous brokerage APIs.
///
/// Implementations differ in auth flow (password + rotating one-time code,
/// OAuth code exchange, pre-issued session token), endpoint shapes, and
/// fallback strategies, but present the same surface to the orchestrator.
///
/// Adapter instances are built per sync invocation and hold their own
/// state machine; they are not reused across invocations.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// The platform this adapter integrates.
    fn platform(&self) -> Platform;

    /// Runs the platform's auth flow.
    ///
    /// Returns `Ok(true)` on success. A rejection by the provider returns
    /// `Ok(false)` with a classifiable reason recorded in [`state`]
    /// (`auth_failed`, `totp_invalid`, `token_expired`,
    /// `reactivation_required`, `unknown`). `Err` is reserved for
    /// transport-level faults.
    ///
    /// [`state`]: BrokerAdapter::state
    async fn authenticate(&self) -> Result<bool, BrokerError>;

    /// Fetches raw fills executed in `[start, end]`, ordered as reported.
    ///
    /// An empty result is not an error; permission and auth failures are
    /// distinguishable errors so callers can surface actionable guidance.
    async fn fetch_trades(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawFill>, BrokerError>;

    /// Rotates the session using the stored refresh token, when the
    /// platform supports it. Returns `Ok(false)` when there is nothing
    /// to refresh.
    async fn refresh_token(&self) -> Result<bool, BrokerError>;

    /// Non-mutating connectivity probe.
    async fn test_connection(&self) -> ConnectionTestResult;

    /// Current state of this instance's state machine.
    fn state(&self) -> AdapterState;

    /// Credentials updated by token rotation during this invocation, for
    /// the caller to persist. `None` when nothing rotated.
    fn rotated_credentials(&self) -> Option<BrokerCredentials>;
}
