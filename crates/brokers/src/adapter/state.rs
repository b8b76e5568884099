//! Per-invocation adapter state machine.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::errors::BrokerError;
use crate::models::Platform;

/// Classifiable reason recorded when authentication fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailureReason {
    AuthFailed,
    TotpInvalid,
    TokenExpired,
    ReactivationRequired,
    Unknown,
}

impl AuthFailureReason {
    /// Stable error code, matching the broker error taxonomy.
    pub fn as_code(&self) -> &'static str {
        match self {
            AuthFailureReason::AuthFailed => "auth_failed",
            AuthFailureReason::TotpInvalid => "totp_invalid",
            AuthFailureReason::TokenExpired => "token_expired",
            AuthFailureReason::ReactivationRequired => "reactivation_required",
            AuthFailureReason::Unknown => "unknown",
        }
    }

    /// Classifies a broker error into an auth failure reason.
    pub fn from_error(error: &BrokerError) -> Self {
        match error {
            BrokerError::TotpInvalid { .. } => AuthFailureReason::TotpInvalid,
            BrokerError::TokenExpired { .. } => AuthFailureReason::TokenExpired,
            BrokerError::ReactivationRequired { .. } => AuthFailureReason::ReactivationRequired,
            BrokerError::AuthFailed { .. }
            | BrokerError::NotAuthenticated { .. }
            | BrokerError::InvalidCredentials { .. } => AuthFailureReason::AuthFailed,
            _ => AuthFailureReason::Unknown,
        }
    }
}

/// Lifecycle of one adapter instance.
///
/// `Unauthenticated -> Authenticating -> Authenticated -> Fetching ->
/// Authenticated`; any auth error moves to `Failed(reason)`, terminal until
/// the caller rebuilds the adapter with fresh credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Fetching,
    Failed(AuthFailureReason),
}

/// Shared state cell enforcing the adapter transitions.
pub struct StateCell {
    platform: Platform,
    state: Mutex<AdapterState>,
}

impl StateCell {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            state: Mutex::new(AdapterState::Unauthenticated),
        }
    }

    pub fn get(&self) -> AdapterState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set(&self, next: AdapterState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = next;
    }

    /// `Unauthenticated -> Authenticating`. A failed instance stays failed
    /// until fresh credentials produce a new adapter.
    pub fn begin_auth(&self) -> Result<(), BrokerError> {
        match self.get() {
            AdapterState::Failed(_) => Err(BrokerError::NotAuthenticated {
                platform: self.platform,
            }),
            _ => {
                self.set(AdapterState::Authenticating);
                Ok(())
            }
        }
    }

    pub fn mark_authenticated(&self) {
        self.set(AdapterState::Authenticated);
    }

    pub fn mark_failed(&self, reason: AuthFailureReason) {
        self.set(AdapterState::Failed(reason));
    }

    /// `Authenticated -> Fetching`; rejects fetches on instances that have
    /// not authenticated.
    pub fn begin_fetch(&self) -> Result<(), BrokerError> {
        match self.get() {
            AdapterState::Authenticated => {
                self.set(AdapterState::Fetching);
                Ok(())
            }
            _ => Err(BrokerError::NotAuthenticated {
                platform: self.platform,
            }),
        }
    }

    /// `Fetching -> Authenticated`.
    pub fn end_fetch(&self) {
        if self.get() == AdapterState::Fetching {
            self.set(AdapterState::Authenticated);
        }
    }

    /// The recorded failure reason, if the instance has failed.
    pub fn failure_reason(&self) -> Option<AuthFailureReason> {
        match self.get() {
            AdapterState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let cell = StateCell::new(Platform::Dhan);
        assert_eq!(cell.get(), AdapterState::Unauthenticated);

        cell.begin_auth().unwrap();
        assert_eq!(cell.get(), AdapterState::Authenticating);

        cell.mark_authenticated();
        cell.begin_fetch().unwrap();
        assert_eq!(cell.get(), AdapterState::Fetching);

        cell.end_fetch();
        assert_eq!(cell.get(), AdapterState::Authenticated);
    }

    #[test]
    fn fetch_before_auth_is_rejected() {
        let cell = StateCell::new(Platform::Dhan);
        let err = cell.begin_fetch().unwrap_err();
        assert_eq!(err.error_code(), "auth_failed");
    }

    #[test]
    fn failed_state_is_terminal() {
        let cell = StateCell::new(Platform::AngelOne);
        cell.begin_auth().unwrap();
        cell.mark_failed(AuthFailureReason::TotpInvalid);

        assert!(cell.begin_auth().is_err());
        assert!(cell.begin_fetch().is_err());
        assert_eq!(cell.failure_reason(), Some(AuthFailureReason::TotpInvalid));
    }

    #[test]
    fn reason_classification_covers_the_auth_taxonomy() {
        let err = BrokerError::TotpInvalid {
            platform: Platform::AngelOne,
        };
        assert_eq!(
            AuthFailureReason::from_error(&err),
            AuthFailureReason::TotpInvalid
        );

        let err = BrokerError::RateLimited {
            platform: Platform::AngelOne,
        };
        assert_eq!(AuthFailureReason::from_error(&err), AuthFailureReason::Unknown);
    }
}
