//! Error types and retry classification for broker integrations.
//!
//! This module provides:
//! - [`BrokerError`]: the main error enum for all broker operations
//! - [`RetryClass`]: classification for determining retry behavior
//!
//! Every variant maps to a stable, machine-readable error code via
//! [`error_code`](BrokerError::error_code) so callers can branch on the
//! failure (prompt for a fresh one-time code vs. prompt to reconnect vs.
//! silent retry later) without parsing messages.

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

use crate::models::Platform;

/// Errors that can occur while talking to a brokerage platform.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// The provider rejected the supplied credentials.
    #[error("Authentication failed for {platform}: {message}")]
    AuthFailed { platform: Platform, message: String },

    /// The one-time code was rejected (expired or mistyped).
    /// The caller should prompt for a fresh code and retry the sync.
    #[error("Invalid one-time code for {platform}")]
    TotpInvalid { platform: Platform },

    /// The session or access token is no longer valid.
    #[error("Token expired for {platform}")]
    TokenExpired { platform: Platform },

    /// The provider requires the user to reactivate API access
    /// (blocked account, revoked app consent, dormant API subscription).
    #[error("Account reactivation required for {platform}: {message}")]
    ReactivationRequired { platform: Platform, message: String },

    /// An operation that requires authentication was attempted before
    /// a successful `authenticate()` on this adapter instance.
    #[error("Adapter for {platform} is not authenticated")]
    NotAuthenticated { platform: Platform },

    /// The execution-history endpoint is missing or unavailable
    /// (404 / decommissioned endpoint / provider maintenance page).
    #[error("Trade book unavailable for {platform}: {message}")]
    TradebookUnavailable { platform: Platform, message: String },

    /// The provider rate limited the request (HTTP 429).
    /// Retried with exponential backoff by the governor.
    #[error("Rate limited by {platform}")]
    RateLimited { platform: Platform },

    /// The request to the provider timed out.
    /// Retried with exponential backoff by the governor.
    #[error("Timeout calling {platform}")]
    Timeout { platform: Platform },

    /// The provider returned a transient upstream failure (502/503/504).
    #[error("{platform} temporarily unavailable (HTTP {status})")]
    ProviderUnavailable { platform: Platform, status: u16 },

    /// The credential bundle does not match the requested platform, or is
    /// structurally incomplete for its flow.
    #[error("Invalid credentials: {message}")]
    InvalidCredentials { message: String },

    /// A network-level failure while communicating with the provider.
    #[error("Network error calling {platform}: {message}")]
    Network { platform: Platform, message: String },

    /// The provider response could not be decoded.
    #[error("Failed to decode {platform} response: {message}")]
    Decode { platform: Platform, message: String },

    /// A fetch failed for a reason outside the known signatures.
    #[error("Fetch failed for {platform}: {message}")]
    FetchFailed { platform: Platform, message: String },

    /// Anything that does not fit the taxonomy above.
    #[error("Unexpected broker error: {message}")]
    Unknown { message: String },
}

impl BrokerError {
    /// Stable machine-readable error code for this error.
    ///
    /// Codes form the taxonomy shared with the sync layer:
    /// `auth_failed`, `totp_invalid`, `token_expired`,
    /// `reactivation_required`, `tradebook_unavailable`, `rate_limited`,
    /// `fetch_failed`, `unknown`.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AuthFailed { .. }
            | Self::NotAuthenticated { .. }
            | Self::InvalidCredentials { .. } => "auth_failed",
            Self::TotpInvalid { .. } => "totp_invalid",
            Self::TokenExpired { .. } => "token_expired",
            Self::ReactivationRequired { .. } => "reactivation_required",
            Self::TradebookUnavailable { .. } => "tradebook_unavailable",
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout { .. }
            | Self::ProviderUnavailable { .. }
            | Self::Network { .. }
            | Self::Decode { .. }
            | Self::FetchFailed { .. } => "fetch_failed",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// Returns the retry classification for this error.
    ///
    /// Only transient signals are retried; hard rejections (auth,
    /// permissions, validation) are returned to the caller immediately.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::ProviderUnavailable { .. } => {
                RetryClass::WithBackoff
            }
            _ => RetryClass::Never,
        }
    }
}
