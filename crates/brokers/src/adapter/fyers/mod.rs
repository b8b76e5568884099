//! Fyers API v3 adapter.
//!
//! Auth flow: OAuth authorization-code exchange. The app secret never
//! travels in the clear; token calls carry a SHA-256 hash of
//! `app_id:app_secret`. Sessions rotate through a refresh token.
//!
//! The trade book occasionally returns nothing for a freshly requested
//! window even when older executions exist, so an empty primary fetch is
//! retried once over a broadened window.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDateTime, Utc};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::adapter::{AdapterState, AuthFailureReason, BrokerAdapter, ConnectionTestResult, StateCell};
use crate::errors::BrokerError;
use crate::governor::{CacheMode, RequestGovernor};
use crate::models::{BrokerCredentials, FillSide, Platform, RawFill, SessionTokens};
use crate::transport::TransportRequest;

const BASE_URL: &str = "https://api-t1.fyers.in/api/v3";
const TOKEN_ENDPOINT: &str = "/validate-authcode";
const REFRESH_ENDPOINT: &str = "/validate-refreshtoken";
const PROFILE_ENDPOINT: &str = "/profile";
const TRADE_BOOK_ENDPOINT: &str = "/tradebook";

const PLATFORM: Platform = Platform::Fyers;

/// How far the fallback window reaches back past the requested start.
const BROADENED_WINDOW_DAYS: i64 = 30;

// ============================================================================
// API Response Structures
// ============================================================================

/// Common fields of every Fyers response.
#[derive(Debug, Deserialize)]
struct ApiStatus {
    s: String,
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl ApiStatus {
    fn is_ok(&self) -> bool {
        self.s == "ok"
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(flatten)]
    status: ApiStatus,
    access_token: Option<String>,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TradeBookResponse {
    #[serde(flatten)]
    status: ApiStatus,
    #[serde(rename = "tradeBook", default)]
    trade_book: Vec<TradeBookEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeBookEntry {
    symbol: String,
    /// 1 = buy, -1 = sell.
    side: i32,
    trade_price: f64,
    traded_qty: i64,
    /// Exchange-local time, e.g. "01-Jul-2026 09:22:11".
    order_date_time: String,
    id: String,
    order_number: String,
    #[serde(default)]
    exchange: String,
    #[serde(default)]
    product_type: String,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(flatten)]
    status: ApiStatus,
    data: Option<ProfileData>,
}

#[derive(Debug, Deserialize)]
struct ProfileData {
    name: Option<String>,
    fy_id: Option<String>,
    email_id: Option<String>,
}

// ============================================================================
// FyersAdapter
// ============================================================================

/// Adapter for the Fyers API.
pub struct FyersAdapter {
    governor: Arc<RequestGovernor>,
    app_id: String,
    app_secret: String,
    auth_code: Option<String>,
    seed_tokens: Option<SessionTokens>,
    tokens: Mutex<Option<SessionTokens>>,
    rotated: Mutex<Option<BrokerCredentials>>,
    state: StateCell,
    force_refresh: bool,
}

impl FyersAdapter {
    pub fn new(
        governor: Arc<RequestGovernor>,
        credentials: BrokerCredentials,
        force_refresh: bool,
    ) -> Result<Self, BrokerError> {
        credentials.validate()?;
        match credentials {
            BrokerCredentials::Fyers {
                app_id,
                app_secret,
                auth_code,
                tokens,
            } => Ok(Self {
                governor,
                app_id,
                app_secret,
                auth_code,
                seed_tokens: tokens,
                tokens: Mutex::new(None),
                rotated: Mutex::new(None),
                state: StateCell::new(PLATFORM),
                force_refresh,
            }),
            other => Err(BrokerError::InvalidCredentials {
                message: format!("Expected FYERS credentials, got {}", other.platform()),
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

    /// `sha256(app_id:app_secret)` as hex, the form token calls expect.
    fn app_id_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.app_id.as_bytes());
        hasher.update(b":");
        hasher.update(self.app_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn auth_header(&self, access_token: &str) -> String {
        format!("{}:{}", self.app_id, access_token)
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
            BrokerCredentials::Fyers {
                app_id: self.app_id.clone(),
                app_secret: self.app_secret.clone(),
                auth_code: None,
                tokens: Some(session.clone()),
            },
        );
        *self.tokens.lock().unwrap_or_else(|p| p.into_inner()) = Some(session);
    }

    /// Exchanges the single-use authorization code for session tokens.
    async fn exchange_auth_code(&self, code: &str) -> Result<bool, BrokerError> {
        let body = serde_json::json!({
            "grant_type": "authorization_code",
            "appIdHash": self.app_id_hash(),
            "code": code,
        });
        let request =
            TransportRequest::post_json(format!("{}{}", BASE_URL, TOKEN_ENDPOINT), &body)
                .header("Content-Type", "application/json");

        let response = self
            .governor
            .execute(PLATFORM, request, CacheMode::Skip)
            .await?;
        let parsed: TokenResponse = parse_body(&response.body)?;

        if !parsed.status.is_ok() {
            warn!(
                "Fyers auth code exchange rejected ({}): {}",
                parsed.status.code, parsed.status.message
            );
            self.state
                .mark_failed(classify_auth_error(parsed.status.code, &parsed.status.message));
            return Ok(false);
        }

        let access_token = parsed.access_token.ok_or_else(|| BrokerError::Decode {
            platform: PLATFORM,
            message: "token response missing access_token".to_string(),
        })?;
        self.store_session(SessionTokens {
            access_token,
            refresh_token: parsed.refresh_token,
            expires_at: None,
        });
        self.state.mark_authenticated();
        Ok(true)
    }

    /// Validates a stored session by fetching the profile.
    async fn probe_session(&self, access_token: &str) -> Result<ProfileData, BrokerError> {
        let request = TransportRequest::get(format!("{}{}", BASE_URL, PROFILE_ENDPOINT))
            .header("Authorization", self.auth_header(access_token));

        let response = self
            .governor
            .execute(PLATFORM, request, CacheMode::Skip)
            .await?;
        if response.status == 401 {
            return Err(BrokerError::TokenExpired { platform: PLATFORM });
        }

        let parsed: ProfileResponse = parse_body(&response.body)?;
        if !parsed.status.is_ok() {
            return Err(map_api_error(parsed.status.code, &parsed.status.message));
        }
        parsed.data.ok_or_else(|| BrokerError::Decode {
            platform: PLATFORM,
            message: "profile response missing data".to_string(),
        })
    }

    async fn fetch_trade_book_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawFill>, BrokerError> {
        let access_token = self
            .access_token()
            .ok_or(BrokerError::NotAuthenticated { platform: PLATFORM })?;

        let url = format!(
            "{}{}?from={}&to={}",
            BASE_URL,
            TRADE_BOOK_ENDPOINT,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
        );
        let request =
            TransportRequest::get(url).header("Authorization", self.auth_header(&access_token));

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

        let parsed: TradeBookResponse = parse_body(&response.body)?;
        if !parsed.status.is_ok() {
            return Err(map_api_error(parsed.status.code, &parsed.status.message));
        }

        let mut fills: Vec<RawFill> = parsed
            .trade_book
            .iter()
            .filter_map(map_trade_book_entry)
            .collect();
        fills.sort_by(|a, b| a.filled_at.cmp(&b.filled_at));
        Ok(fills)
    }
}

#[async_trait]
impl BrokerAdapter for FyersAdapter {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    async fn authenticate(&self) -> Result<bool, BrokerError> {
        self.state.begin_auth()?;

        // Prefer a stored session; fall back to refresh, then to the
        // single-use authorization code.
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
                        debug!("Fyers session rejected, attempting refresh");
                        *self.tokens.lock().unwrap_or_else(|p| p.into_inner()) =
                            Some(seed.clone());
                        match self.refresh_token().await {
                            Ok(true) => {
                                self.state.mark_authenticated();
                                return Ok(true);
                            }
                            Ok(false) | Err(BrokerError::TokenExpired { .. }) => {
                                *self.tokens.lock().unwrap_or_else(|p| p.into_inner()) = None;
                            }
                            Err(other) => return Err(other),
                        }
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        match self.auth_code.clone() {
            Some(code) => self.exchange_auth_code(&code).await,
            None => {
                // Nothing left to authenticate with; the user must redo the
                // OAuth consent to mint a fresh code.
                self.state.mark_failed(AuthFailureReason::TokenExpired);
                Ok(false)
            }
        }
    }

    async fn fetch_trades(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawFill>, BrokerError> {
        self.state.begin_fetch()?;

        // Ordered fetch strategies with a uniform success predicate: a
        // non-empty fill list wins, errors propagate, and an empty final
        // attempt is a legitimate empty result.
        let broadened_start = start - ChronoDuration::days(BROADENED_WINDOW_DAYS);
        let windows = [("requested", start, end), ("broadened", broadened_start, end)];

        let mut outcome = Ok(Vec::new());
        for (label, window_start, window_end) in windows {
            match self.fetch_trade_book_window(window_start, window_end).await {
                Ok(fills) if fills.is_empty() => {
                    debug!("Fyers: no fills in {} window", label);
                    outcome = Ok(fills);
                }
                other => {
                    outcome = other;
                    break;
                }
            }
        }

        self.state.end_fetch();
        outcome
    }

    async fn refresh_token(&self) -> Result<bool, BrokerError> {
        let stored = self
            .tokens
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .or_else(|| self.seed_tokens.clone());
        let Some(refresh) = stored.and_then(|t| t.refresh_token) else {
            return Ok(false);
        };

        let body = serde_json::json!({
            "grant_type": "refresh_token",
            "appIdHash": self.app_id_hash(),
            "refresh_token": refresh,
        });
        let request =
            TransportRequest::post_json(format!("{}{}", BASE_URL, REFRESH_ENDPOINT), &body)
                .header("Content-Type", "application/json");

        let response = self
            .governor
            .execute(PLATFORM, request, CacheMode::Skip)
            .await?;
        let parsed: TokenResponse = parse_body(&response.body)?;

        if !parsed.status.is_ok() {
            return Err(map_api_error(parsed.status.code, &parsed.status.message));
        }

        let access_token = parsed.access_token.ok_or_else(|| BrokerError::Decode {
            platform: PLATFORM,
            message: "refresh response missing access_token".to_string(),
        })?;
        self.store_session(SessionTokens {
            access_token,
            refresh_token: parsed.refresh_token.or(Some(refresh)),
            expires_at: None,
        });
        Ok(true)
    }

    async fn test_connection(&self) -> ConnectionTestResult {
        let token = self
            .access_token()
            .or_else(|| self.seed_tokens.as_ref().map(|t| t.access_token.clone()));
        let Some(token) = token else {
            return ConnectionTestResult::failed("No stored Fyers session to test");
        };

        match self.probe_session(&token).await {
            Ok(profile) => ConnectionTestResult::ok("Fyers connection verified").with_details(
                serde_json::json!({
                    "name": profile.name,
                    "fyId": profile.fy_id,
                    "email": profile.email_id,
                }),
            ),
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

fn parse_body<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, BrokerError> {
    serde_json::from_str(body).map_err(|e| BrokerError::Decode {
        platform: PLATFORM,
        message: e.to_string(),
    })
}

/// Maps Fyers error codes during the auth-code exchange.
fn classify_auth_error(code: i64, message: &str) -> AuthFailureReason {
    let lowered = message.to_lowercase();
    match code {
        -8 | -15 | -16 => AuthFailureReason::TokenExpired,
        -413 => AuthFailureReason::AuthFailed,
        _ if lowered.contains("auth code") => AuthFailureReason::AuthFailed,
        _ if lowered.contains("suspended") || lowered.contains("reactivate") => {
            AuthFailureReason::ReactivationRequired
        }
        _ => AuthFailureReason::AuthFailed,
    }
}

/// Maps Fyers error codes on authenticated endpoints.
fn map_api_error(code: i64, message: &str) -> BrokerError {
    let lowered = message.to_lowercase();
    match code {
        -8 | -15 | -16 | -17 => BrokerError::TokenExpired { platform: PLATFORM },
        -429 => BrokerError::RateLimited { platform: PLATFORM },
        _ if lowered.contains("suspended") || lowered.contains("reactivate") => {
            BrokerError::ReactivationRequired {
                platform: PLATFORM,
                message: message.to_string(),
            }
        }
        _ => BrokerError::FetchFailed {
            platform: PLATFORM,
            message: format!("{} - {}", code, message),
        },
    }
}

fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
}

fn map_trade_book_entry(entry: &TradeBookEntry) -> Option<RawFill> {
    let side = match entry.side {
        1 => FillSide::Buy,
        -1 => FillSide::Sell,
        other => {
            warn!("Fyers: unknown trade side {}", other);
            return None;
        }
    };

    let price = Decimal::try_from(entry.trade_price).ok()?;
    let quantity = Decimal::from(entry.traded_qty);
    let naive = NaiveDateTime::parse_from_str(&entry.order_date_time, "%d-%b-%Y %H:%M:%S").ok()?;
    let filled_at = naive
        .and_local_timezone(ist_offset())
        .single()?
        .with_timezone(&Utc);

    Some(RawFill {
        symbol: entry.symbol.clone(),
        side,
        price,
        quantity,
        filled_at,
        order_id: entry.order_number.clone(),
        fill_id: entry.id.clone(),
        exchange: entry.exchange.clone(),
        product_type: entry.product_type.clone(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governor::{GovernorConfig, PacingConfig};
    use crate::transport::MockTransport;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn credentials(auth_code: Option<&str>, tokens: Option<SessionTokens>) -> BrokerCredentials {
        BrokerCredentials::Fyers {
            app_id: "APP-100".to_string(),
            app_secret: "secret".to_string(),
            auth_code: auth_code.map(|s| s.to_string()),
            tokens,
        }
    }

    fn governor(transport: Arc<MockTransport>) -> Arc<RequestGovernor> {
        let governor = RequestGovernor::new(
            transport,
            GovernorConfig {
                backoff_base: Duration::from_millis(1),
                ..GovernorConfig::default()
            },
        );
        governor.configure_pacing(
            PLATFORM,
            PacingConfig {
                requests_per_minute: 60_000,
                burst_capacity: 1_000.0,
                min_interval: Duration::ZERO,
            },
        );
        Arc::new(governor)
    }

    #[tokio::test]
    async fn auth_code_exchange_rotates_tokens() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            200,
            r#"{"s":"ok","code":200,"message":"","access_token":"access-1","refresh_token":"refresh-1"}"#,
        );

        let adapter = FyersAdapter::new(
            governor(transport),
            credentials(Some("authcode-1"), None),
            false,
        )
        .unwrap();

        assert!(adapter.authenticate().await.unwrap());
        let rotated = adapter.rotated_credentials().unwrap();
        match rotated {
            BrokerCredentials::Fyers {
                auth_code, tokens, ..
            } => {
                assert!(auth_code.is_none());
                assert_eq!(tokens.unwrap().access_token, "access-1");
            }
            _ => panic!("Expected Fyers credentials"),
        }
    }

    #[tokio::test]
    async fn valid_stored_session_skips_the_exchange() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            200,
            r#"{"s":"ok","code":200,"message":"","data":{"name":"Trader","fy_id":"FY123","email_id":"t@x.in"}}"#,
        );

        let tokens = SessionTokens {
            access_token: "stored".to_string(),
            refresh_token: None,
            expires_at: None,
        };
        let adapter = FyersAdapter::new(
            governor(transport.clone()),
            credentials(None, Some(tokens)),
            false,
        )
        .unwrap();

        assert!(adapter.authenticate().await.unwrap());
        assert_eq!(transport.request_count(), 1);
        let urls = transport.requested_urls();
        assert!(urls[0].contains("/profile"));
    }

    #[tokio::test]
    async fn exhausted_session_without_auth_code_asks_for_reconnect() {
        let transport = Arc::new(MockTransport::new());
        // Profile rejects the token; no refresh token and no auth code left.
        transport.respond(200, r#"{"s":"error","code":-16,"message":"token expired"}"#);

        let tokens = SessionTokens {
            access_token: "stale".to_string(),
            refresh_token: None,
            expires_at: None,
        };
        let adapter = FyersAdapter::new(
            governor(transport),
            credentials(None, Some(tokens)),
            false,
        )
        .unwrap();

        assert!(!adapter.authenticate().await.unwrap());
        assert_eq!(
            adapter.state(),
            AdapterState::Failed(AuthFailureReason::TokenExpired)
        );
    }

    #[tokio::test]
    async fn empty_primary_window_falls_back_to_broadened_window() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            200,
            r#"{"s":"ok","code":200,"message":"","access_token":"access-1","refresh_token":null}"#,
        );
        transport.respond(200, r#"{"s":"ok","code":200,"message":"","tradeBook":[]}"#);
        transport.respond(
            200,
            r#"{"s":"ok","code":200,"message":"","tradeBook":[
                {"symbol":"NSE:SBIN-EQ","side":1,"tradePrice":612.35,"tradedQty":10,"orderDateTime":"10-Jun-2026 09:22:11","id":"5001","orderNumber":"240610000123","exchange":"NSE","productType":"CNC"}
            ]}"#,
        );

        let adapter = FyersAdapter::new(
            governor(transport.clone()),
            credentials(Some("authcode-1"), None),
            false,
        )
        .unwrap();
        adapter.authenticate().await.unwrap();

        let start = "2026-07-01T00:00:00Z".parse().unwrap();
        let end = "2026-07-31T00:00:00Z".parse().unwrap();
        let fills = adapter.fetch_trades(start, end).await.unwrap();

        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].price, dec!(612.35));

        // Exchange + primary window + broadened window.
        let urls = transport.requested_urls();
        assert_eq!(urls.len(), 3);
        assert!(urls[1].contains("from=2026-07-01"));
        assert!(urls[2].contains("from=2026-06-01"));
    }

    #[tokio::test]
    async fn both_windows_empty_is_a_legitimate_empty_result() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            200,
            r#"{"s":"ok","code":200,"message":"","access_token":"access-1","refresh_token":null}"#,
        );
        transport.respond(200, r#"{"s":"ok","code":200,"message":"","tradeBook":[]}"#);
        transport.respond(200, r#"{"s":"ok","code":200,"message":"","tradeBook":[]}"#);

        let adapter = FyersAdapter::new(
            governor(transport),
            credentials(Some("authcode-1"), None),
            false,
        )
        .unwrap();
        adapter.authenticate().await.unwrap();

        let start = "2026-07-01T00:00:00Z".parse().unwrap();
        let end = "2026-07-31T00:00:00Z".parse().unwrap();
        let fills = adapter.fetch_trades(start, end).await.unwrap();
        assert!(fills.is_empty());
        assert_eq!(adapter.state(), AdapterState::Authenticated);
    }

    #[test]
    fn app_id_hash_is_sha256_of_id_and_secret() {
        let transport = Arc::new(MockTransport::new());
        let adapter = FyersAdapter::new(
            governor(transport),
            credentials(Some("code"), None),
            false,
        )
        .unwrap();

        let mut hasher = Sha256::new();
        hasher.update(b"APP-100:secret");
        assert_eq!(adapter.app_id_hash(), hex::encode(hasher.finalize()));
    }

    #[test]
    fn api_error_mapping() {
        assert_eq!(
            map_api_error(-16, "token expired").error_code(),
            "token_expired"
        );
        assert_eq!(map_api_error(-429, "slow down").error_code(), "rate_limited");
        assert_eq!(
            map_api_error(-99, "account suspended, please reactivate").error_code(),
            "reactivation_required"
        );
        assert_eq!(map_api_error(-99, "boom").error_code(), "fetch_failed");
    }
}
