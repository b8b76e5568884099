//! Angel One SmartAPI adapter.
//!
//! Auth flow: client code + PIN + rotating one-time code, returning a JWT
//! session with a refresh token. Trade history comes from the trade book
//! endpoint, which reports fills in exchange-local time (IST).

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::adapter::{AdapterState, AuthFailureReason, BrokerAdapter, ConnectionTestResult, StateCell};
use crate::errors::BrokerError;
use crate::governor::{CacheMode, RequestGovernor};
use crate::models::{BrokerCredentials, FillSide, Platform, RawFill, SessionTokens};
use crate::transport::TransportRequest;

const BASE_URL: &str = "https://apiconnect.angelone.in";
const LOGIN_ENDPOINT: &str = "/rest/auth/angelbroking/user/v1/loginByPassword";
const REFRESH_ENDPOINT: &str = "/rest/auth/angelbroking/jwt/v1/generateTokens";
const PROFILE_ENDPOINT: &str = "/rest/secure/angelbroking/user/v1/getProfile";
const TRADE_BOOK_ENDPOINT: &str = "/rest/secure/angelbroking/order/v1/getTradeBook";

const PLATFORM: Platform = Platform::AngelOne;

// ============================================================================
// API Response Structures
// ============================================================================

/// Standard SmartAPI envelope.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    errorcode: String,
    data: Option<T>,
}

/// Payload of a successful login or token refresh.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionData {
    jwt_token: String,
    refresh_token: Option<String>,
    // feedToken exists but is only used for streaming, which we don't do.
}

/// One trade book entry.
#[derive(Debug, Deserialize)]
struct TradeBookEntry {
    tradingsymbol: String,
    exchange: String,
    producttype: String,
    transactiontype: String,
    fillprice: String,
    fillsize: String,
    orderid: String,
    fillid: String,
    /// Exchange-local fill time, e.g. "01-Jul-2026 09:22:11".
    filltime: String,
}

/// Profile payload used by the connection probe.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileData {
    name: Option<String>,
    clientcode: Option<String>,
    email: Option<String>,
}

// ============================================================================
// AngelOneAdapter
// ============================================================================

/// Adapter for the Angel One SmartAPI.
pub struct AngelOneAdapter {
    governor: Arc<RequestGovernor>,
    api_key: String,
    client_code: String,
    pin: String,
    totp_code: Option<String>,
    seed_tokens: Option<SessionTokens>,
    tokens: Mutex<Option<SessionTokens>>,
    rotated: Mutex<Option<BrokerCredentials>>,
    state: StateCell,
    force_refresh: bool,
}

impl AngelOneAdapter {
    pub fn new(
        governor: Arc<RequestGovernor>,
        credentials: BrokerCredentials,
        force_refresh: bool,
    ) -> Result<Self, BrokerError> {
        credentials.validate()?;
        match credentials {
            BrokerCredentials::AngelOne {
                api_key,
                client_code,
                pin,
                totp_code,
                tokens,
            } => Ok(Self {
                governor,
                api_key,
                client_code,
                pin,
                totp_code,
                seed_tokens: tokens,
                tokens: Mutex::new(None),
                rotated: Mutex::new(None),
                state: StateCell::new(PLATFORM),
                force_refresh,
            }),
            other => Err(BrokerError::InvalidCredentials {
                message: format!(
                    "Expected ANGEL_ONE credentials, got {}",
                    other.platform()
                ),
            }),
        }
    }

    fn cache_mode(&self) -> CacheMode {
        if self.force_refresh {
            CacheMode::Refresh
        } else {
            CacheMode::Use
        }
    }

    fn base_headers(&self, request: TransportRequest) -> TransportRequest {
        request
            .header("Content-Type", "application/json")
            .header("X-PrivateKey", &self.api_key)
    }

    fn access_token(&self) -> Option<String> {
        self.tokens
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(|t| t.access_token.clone())
    }

    fn store_session(&self, session: SessionTokens) {
        *self.rotated.lock().unwrap_or_else(|p| p.into_inner()) = Some(
            BrokerCredentials::AngelOne {
                api_key: self.api_key.clone(),
                client_code: self.client_code.clone(),
                pin: self.pin.clone(),
                totp_code: None,
                tokens: Some(session.clone()),
            },
        );
        *self.tokens.lock().unwrap_or_else(|p| p.into_inner()) = Some(session);
    }

    /// Runs the password + one-time-code login.
    async fn login(&self, totp: &str) -> Result<bool, BrokerError> {
        let body = serde_json::json!({
            "clientcode": self.client_code,
            "password": self.pin,
            "totp": totp,
        });
        let request = self.base_headers(TransportRequest::post_json(
            format!("{}{}", BASE_URL, LOGIN_ENDPOINT),
            &body,
        ));

        let response = self
            .governor
            .execute(PLATFORM, request, CacheMode::Skip)
            .await?;

        if !response.is_success() {
            let reason = classify_auth_status(response.status);
            self.state.mark_failed(reason);
            return Ok(false);
        }

        let envelope: ApiEnvelope<SessionData> = parse_envelope(&response.body)?;
        if !envelope.status {
            let reason = classify_login_error(&envelope.errorcode, &envelope.message);
            warn!(
                "Angel One login rejected ({}): {}",
                envelope.errorcode, envelope.message
            );
            self.state.mark_failed(reason);
            return Ok(false);
        }

        let data = envelope.data.ok_or_else(|| BrokerError::Decode {
            platform: PLATFORM,
            message: "login response missing data".to_string(),
        })?;

        self.store_session(SessionTokens {
            access_token: data.jwt_token,
            refresh_token: data.refresh_token,
            expires_at: None,
        });
        self.state.mark_authenticated();
        Ok(true)
    }

    /// Validates a stored session by fetching the profile.
    async fn probe_session(&self, access_token: &str) -> Result<ProfileData, BrokerError> {
        let request = self
            .base_headers(TransportRequest::get(format!(
                "{}{}",
                BASE_URL, PROFILE_ENDPOINT
            )))
            .header("Authorization", format!("Bearer {}", access_token));

        let response = self
            .governor
            .execute(PLATFORM, request, CacheMode::Skip)
            .await?;

        if response.status == 401 {
            return Err(BrokerError::TokenExpired { platform: PLATFORM });
        }
        if !response.is_success() {
            return Err(BrokerError::FetchFailed {
                platform: PLATFORM,
                message: format!("profile returned HTTP {}", response.status),
            });
        }

        let envelope: ApiEnvelope<ProfileData> = parse_envelope(&response.body)?;
        if !envelope.status {
            return Err(map_session_error(&envelope.errorcode, &envelope.message));
        }
        envelope.data.ok_or_else(|| BrokerError::Decode {
            platform: PLATFORM,
            message: "profile response missing data".to_string(),
        })
    }

    async fn fetch_trade_book(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawFill>, BrokerError> {
        let access_token = self
            .access_token()
            .ok_or(BrokerError::NotAuthenticated { platform: PLATFORM })?;

        let request = self
            .base_headers(TransportRequest::get(format!(
                "{}{}",
                BASE_URL, TRADE_BOOK_ENDPOINT
            )))
            .header("Authorization", format!("Bearer {}", access_token));

        let response = self
            .governor
            .execute(PLATFORM, request, self.cache_mode())
            .await?;

        if response.status == 401 {
            return Err(BrokerError::TokenExpired { platform: PLATFORM });
        }
        if response.status == 404 {
            return Err(BrokerError::TradebookUnavailable {
                platform: PLATFORM,
                message: "trade book endpoint returned HTTP 404".to_string(),
            });
        }
        if !response.is_success() {
            return Err(BrokerError::FetchFailed {
                platform: PLATFORM,
                message: format!("trade book returned HTTP {}", response.status),
            });
        }

        let envelope: ApiEnvelope<Vec<TradeBookEntry>> = parse_envelope(&response.body)?;
        if !envelope.status {
            return Err(map_session_error(&envelope.errorcode, &envelope.message));
        }

        let entries = envelope.data.unwrap_or_default();
        let mut fills: Vec<RawFill> = entries
            .iter()
            .filter_map(map_trade_book_entry)
            .filter(|fill| fill.filled_at >= start && fill.filled_at <= end)
            .collect();
        fills.sort_by(|a, b| a.filled_at.cmp(&b.filled_at));

        debug!(
            "Angel One: {} fills in window {} -> {}",
            fills.len(),
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );
        Ok(fills)
    }
}

#[async_trait]
impl BrokerAdapter for AngelOneAdapter {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    async fn authenticate(&self) -> Result<bool, BrokerError> {
        self.state.begin_auth()?;

        // Reuse a stored session when it still works.
        if let Some(seed) = &self.seed_tokens {
            if !seed.is_expired(Utc::now()) {
                match self.probe_session(&seed.access_token).await {
                    Ok(_) => {
                        *self.tokens.lock().unwrap_or_else(|p| p.into_inner()) =
                            Some(seed.clone());
                        self.state.mark_authenticated();
                        return Ok(true);
                    }
                    Err(BrokerError::TokenExpired { .. }) => {
                        debug!("Angel One session expired, falling back to login");
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        // Full login needs a current one-time code.
        let Some(totp) = self.totp_code.clone() else {
            self.state.mark_failed(AuthFailureReason::TotpInvalid);
            return Ok(false);
        };
        self.login(&totp).await
    }

    async fn fetch_trades(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawFill>, BrokerError> {
        self.state.begin_fetch()?;
        let result = self.fetch_trade_book(start, end).await;
        self.state.end_fetch();
        result
    }

    async fn refresh_token(&self) -> Result<bool, BrokerError> {
        let stored = self
            .tokens
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .or_else(|| self.seed_tokens.clone());
        let Some(tokens) = stored else {
            return Ok(false);
        };
        let Some(refresh) = tokens.refresh_token.clone() else {
            return Ok(false);
        };

        let body = serde_json::json!({ "refreshToken": refresh });
        let request = self
            .base_headers(TransportRequest::post_json(
                format!("{}{}", BASE_URL, REFRESH_ENDPOINT),
                &body,
            ))
            .header("Authorization", format!("Bearer {}", tokens.access_token));

        let response = self
            .governor
            .execute(PLATFORM, request, CacheMode::Skip)
            .await?;
        if response.status == 401 {
            return Err(BrokerError::TokenExpired { platform: PLATFORM });
        }

        let envelope: ApiEnvelope<SessionData> = parse_envelope(&response.body)?;
        if !envelope.status {
            return Err(map_session_error(&envelope.errorcode, &envelope.message));
        }
        let data = envelope.data.ok_or_else(|| BrokerError::Decode {
            platform: PLATFORM,
            message: "refresh response missing data".to_string(),
        })?;

        self.store_session(SessionTokens {
            access_token: data.jwt_token,
            refresh_token: data.refresh_token.or(Some(refresh)),
            expires_at: None,
        });
        Ok(true)
    }

    async fn test_connection(&self) -> ConnectionTestResult {
        let token = self
            .access_token()
            .or_else(|| self.seed_tokens.as_ref().map(|t| t.access_token.clone()));
        let Some(token) = token else {
            return ConnectionTestResult::failed("No stored Angel One session to test");
        };

        match self.probe_session(&token).await {
            Ok(profile) => ConnectionTestResult::ok("Angel One connection verified")
                .with_details(serde_json::json!({
                    "name": profile.name,
                    "clientCode": profile.clientcode,
                    "email": profile.email,
                })),
            Err(err) => ConnectionTestResult::failed(err.to_string()),
        }
    }

    fn state(&self) -> AdapterState {
        self.state.get()
    }

    fn rotated_credentials(&self) -> Option<BrokerCredentials> {
        self.rotated.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_envelope<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, BrokerError> {
    serde_json::from_str(body).map_err(|e| BrokerError::Decode {
        platform: PLATFORM,
        message: e.to_string(),
    })
}

/// Maps SmartAPI login error codes onto the auth failure taxonomy.
fn classify_login_error(errorcode: &str, message: &str) -> AuthFailureReason {
    let lowered = message.to_lowercase();
    match errorcode {
        "AB1050" => AuthFailureReason::TotpInvalid,
        "AG8001" | "AG8002" | "AG8003" => AuthFailureReason::TokenExpired,
        "AB1007" | "AB1031" => AuthFailureReason::ReactivationRequired,
        _ if lowered.contains("totp") => AuthFailureReason::TotpInvalid,
        _ if lowered.contains("blocked") || lowered.contains("deactivated") => {
            AuthFailureReason::ReactivationRequired
        }
        _ => AuthFailureReason::AuthFailed,
    }
}

fn classify_auth_status(status: u16) -> AuthFailureReason {
    match status {
        401 => AuthFailureReason::TokenExpired,
        403 => AuthFailureReason::ReactivationRequired,
        _ => AuthFailureReason::AuthFailed,
    }
}

/// Maps SmartAPI error codes on authenticated endpoints.
fn map_session_error(errorcode: &str, message: &str) -> BrokerError {
    match errorcode {
        "AG8001" | "AG8002" | "AG8003" => BrokerError::TokenExpired { platform: PLATFORM },
        "AB1007" | "AB1031" => BrokerError::ReactivationRequired {
            platform: PLATFORM,
            message: message.to_string(),
        },
        "AB2001" => BrokerError::TradebookUnavailable {
            platform: PLATFORM,
            message: message.to_string(),
        },
        _ => BrokerError::FetchFailed {
            platform: PLATFORM,
            message: format!("{} - {}", errorcode, message),
        },
    }
}

/// Exchange-local (IST) offset used for trade book fill times.
fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
}

fn parse_fill_time(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%d-%b-%Y %H:%M:%S").ok()?;
    naive
        .and_local_timezone(ist_offset())
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn map_trade_book_entry(entry: &TradeBookEntry) -> Option<RawFill> {
    let side = match entry.transactiontype.to_uppercase().as_str() {
        "BUY" => FillSide::Buy,
        "SELL" => FillSide::Sell,
        other => {
            warn!("Angel One: unknown transaction type '{}'", other);
            return None;
        }
    };

    let price = Decimal::from_str(&entry.fillprice).ok()?;
    let quantity = Decimal::from_str(&entry.fillsize).ok()?;
    let filled_at = match parse_fill_time(&entry.filltime) {
        Some(ts) => ts,
        None => {
            warn!("Angel One: unparseable fill time '{}'", entry.filltime);
            return None;
        }
    };

    Some(RawFill {
        symbol: entry.tradingsymbol.clone(),
        side,
        price,
        quantity,
        filled_at,
        order_id: entry.orderid.clone(),
        fill_id: entry.fillid.clone(),
        exchange: entry.exchange.clone(),
        product_type: entry.producttype.clone(),
    })
}

// ============================================================================
// Tests
// ============================================================================
