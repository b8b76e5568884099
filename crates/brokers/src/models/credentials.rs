//! Per-platform credential bundles.
//!
//! Each platform's flow needs different named fields, so credentials are a
//! tagged union validated at construction rather than an open-ended map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::platform::Platform;
use crate::errors::BrokerError;

/// Session tokens issued by a provider after a successful authentication.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionTokens {
    /// True when an expiry is recorded and it has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Credential bundle for a single broker account.
///
/// The variant tag doubles as the platform identifier; a mismatch between
/// the bundle and the platform an adapter is built for is a construction
/// error in the registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrokerCredentials {
    /// Password + rotating one-time code flow. `totp_code` is supplied per
    /// sync attempt and never persisted; `tokens` hold the rotated session.
    AngelOne {
        api_key: String,
        client_code: String,
        pin: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        totp_code: Option<String>,
        #[serde(default)]
        tokens: Option<SessionTokens>,
    },

    /// OAuth authorization-code exchange. `auth_code` is single-use; the
    /// exchanged `tokens` carry the session after the first sync.
    Fyers {
        app_id: String,
        app_secret: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth_code: Option<String>,
        #[serde(default)]
        tokens: Option<SessionTokens>,
    },

    /// Pre-issued session token generated on the provider's dashboard.
    Dhan {
        client_id: String,
        access_token: String,
        #[serde(default)]
        token_expiry: Option<DateTime<Utc>>,
    },
}

impl BrokerCredentials {
    /// The platform this bundle belongs to.
    pub fn platform(&self) -> Platform {
        match self {
            BrokerCredentials::AngelOne { .. } => Platform::AngelOne,
            BrokerCredentials::Fyers { .. } => Platform::Fyers,
            BrokerCredentials::Dhan { .. } => Platform::Dhan,
        }
    }

    /// Validates that the fields required by the platform's flow are present.
    pub fn validate(&self) -> Result<(), BrokerError> {
        match self {
            BrokerCredentials::AngelOne {
                api_key,
                client_code,
                pin,
                ..
            } => {
                require(api_key, "api_key")?;
                require(client_code, "client_code")?;
                require(pin, "pin")
            }
            BrokerCredentials::Fyers {
                app_id,
                app_secret,
                auth_code,
                tokens,
                ..
            } => {
                require(app_id, "app_id")?;
                require(app_secret, "app_secret")?;
                if auth_code.is_none() && tokens.is_none() {
                    return Err(BrokerError::InvalidCredentials {
                        message: "Fyers requires an auth_code or a stored session token"
                            .to_string(),
                    });
                }
                Ok(())
            }
            BrokerCredentials::Dhan {
                client_id,
                access_token,
                ..
            } => {
                require(client_id, "client_id")?;
                require(access_token, "access_token")
            }
        }
    }

    /// Injects a fresh one-time code into flows that need one.
    /// Bundles without a one-time-code step are returned unchanged.
    pub fn with_totp(self, code: &str) -> Self {
        match self {
            BrokerCredentials::AngelOne {
                api_key,
                client_code,
                pin,
                tokens,
                ..
            } => BrokerCredentials::AngelOne {
                api_key,
                client_code,
                pin,
                totp_code: Some(code.to_string()),
                tokens,
            },
            other => other,
        }
    }

    /// The stored session tokens, if any.
    pub fn session_tokens(&self) -> Option<&SessionTokens> {
        match self {
            BrokerCredentials::AngelOne { tokens, .. }
            | BrokerCredentials::Fyers { tokens, .. } => tokens.as_ref(),
            BrokerCredentials::Dhan { .. } => None,
        }
    }

    /// Returns a copy of this bundle carrying the given session tokens.
    /// Dhan tokens are pre-issued, so its bundle is returned unchanged.
    pub fn with_session_tokens(self, session: SessionTokens) -> Self {
        match self {
            BrokerCredentials::AngelOne {
                api_key,
                client_code,
                pin,
                totp_code,
                ..
            } => BrokerCredentials::AngelOne {
                api_key,
                client_code,
                pin,
                totp_code,
                tokens: Some(session),
            },
            BrokerCredentials::Fyers {
                app_id, app_secret, ..
            } => BrokerCredentials::Fyers {
                app_id,
                app_secret,
                // The auth code is single-use; drop it once exchanged.
                auth_code: None,
                tokens: Some(session),
            },
            dhan @ BrokerCredentials::Dhan { .. } => dhan,
        }
    }
}

fn require(value: &str, field: &str) -> Result<(), BrokerError> {
    if value.trim().is_empty() {
        Err(BrokerError::InvalidCredentials {
            message: format!("Missing required credential field '{}'", field),
        })
    } else {
        Ok(())
    }
}
