//! Dhan API v2 adapter.
//!
//! Auth flow: a pre-issued access token generated on the provider's
//! dashboard; there is nothing to log in to and nothing to refresh.
//!
//! The execution-history surface is uneven across account types, so
//! fetching walks an ordered list of strategies under a uniform success
//! predicate: the requested trade window, the legacy trade-history
//! endpoint, and finally portfolio holdings rendered as synthetic open
//! fills so the account is not silently empty.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::adapter::{AdapterState, AuthFailureReason, BrokerAdapter, ConnectionTestResult, StateCell};
use crate::errors::BrokerError;
use crate::governor::{CacheMode, RequestGovernor};
use crate::models::{BrokerCredentials, FillSide, Platform, RawFill};
use crate::transport::TransportRequest;

const BASE_URL: &str = "https://api.dhan.co/v2";
const PROFILE_ENDPOINT: &str = "/profile";
const TRADES_ENDPOINT: &str = "/trades";
const TRADE_HISTORY_ENDPOINT: &str = "/tradeHistory";
const HOLDINGS_ENDPOINT: &str = "/holdings";

const PLATFORM: Platform = Platform::Dhan;

/// Product type stamped on synthetic fills derived from holdings.
pub const HOLDING_PRODUCT_TYPE: &str = "HOLDING";

// ============================================================================
// API Response Structures
// ============================================================================

/// Error body returned by Dhan on non-2xx responses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiError {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    error_message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileData {
    dhan_client_id: Option<String>,
    token_validity: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeEntry {
    order_id: String,
    #[serde(default)]
    exchange_trade_id: String,
    exchange_segment: String,
    product_type: String,
    transaction_type: String,
    trading_symbol: String,
    traded_quantity: i64,
    traded_price: f64,
    /// Exchange-local time, e.g. "2026-07-01 09:22:11".
    exchange_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HoldingEntry {
    security_id: String,
    trading_symbol: String,
    #[serde(default)]
    exchange: String,
    total_qty: i64,
    avg_cost_price: f64,
}

// ============================================================================
// Fetch strategies
// ============================================================================

/// Ordered probes for execution history. Tried in sequence until one
/// yields fills; `TradebookUnavailable` moves on to the next strategy,
/// any other error aborts the fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FetchStrategy {
    /// Trade book over the requested window.
    TradeWindow,
    /// Legacy trade-history endpoint over the same window.
    TradeHistory,
    /// Holdings rendered as synthetic open fills.
    HoldingsFallback,
}

const FETCH_STRATEGIES: [FetchStrategy; 3] = [
    FetchStrategy::TradeWindow,
    FetchStrategy::TradeHistory,
    FetchStrategy::HoldingsFallback,
];

// ============================================================================
// DhanAdapter
// ============================================================================

/// Adapter for the Dhan API.
pub struct DhanAdapter {
    governor: Arc<RequestGovernor>,
    client_id: String,
    access_token: String,
    token_expiry: Option<DateTime<Utc>>,
    state: StateCell,
    rotated: Mutex<Option<BrokerCredentials>>,
    force_refresh: bool,
}

impl DhanAdapter {
    pub fn new(
        governor: Arc<RequestGovernor>,
        credentials: BrokerCredentials,
        force_refresh: bool,
    ) -> Result<Self, BrokerError> {
        credentials.validate()?;
        match credentials {
            BrokerCredentials::Dhan {
                client_id,
                access_token,
                token_expiry,
            } => Ok(Self {
                governor,
                client_id,
                access_token,
                token_expiry,
                state: StateCell::new(PLATFORM),
                rotated: Mutex::new(None),
                force_refresh,
            }),
            other => Err(BrokerError::InvalidCredentials {
                message: format!("Expected DHAN credentials, got {}", other.platform()),
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

    fn authed(&self, request: TransportRequest) -> TransportRequest {
        request
            .header("access-token", &self.access_token)
            .header("client-id", &self.client_id)
    }

    /// Maps a non-2xx response onto the taxonomy.
    fn map_http_error(&self, status: u16, body: &str) -> BrokerError {
        if let Ok(api_error) = serde_json::from_str::<ApiError>(body) {
            if !api_error.error_code.is_empty() {
                return map_api_error(&api_error.error_code, &api_error.error_message);
            }
        }
        match status {
            401 => BrokerError::TokenExpired { platform: PLATFORM },
            403 => BrokerError::ReactivationRequired {
                platform: PLATFORM,
                message: "Data API access is not enabled for this account".to_string(),
            },
            404 => BrokerError::TradebookUnavailable {
                platform: PLATFORM,
                message: "endpoint returned HTTP 404".to_string(),
            },
            _ => BrokerError::FetchFailed {
                platform: PLATFORM,
                message: format!("HTTP {}", status),
            },
        }
    }

    async fn fetch_profile(&self) -> Result<ProfileData, BrokerError> {
        let request = self.authed(TransportRequest::get(format!(
            "{}{}",
            BASE_URL, PROFILE_ENDPOINT
        )));
        let response = self
            .governor
            .execute(PLATFORM, request, CacheMode::Skip)
            .await?;
        if !response.is_success() {
            return Err(self.map_http_error(response.status, &response.body));
        }
        serde_json::from_str(&response.body).map_err(|e| BrokerError::Decode {
            platform: PLATFORM,
            message: e.to_string(),
        })
    }

    async fn run_strategy(
        &self,
        strategy: FetchStrategy,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawFill>, BrokerError> {
        match strategy {
            FetchStrategy::TradeWindow => {
                self.fetch_trade_window(TRADES_ENDPOINT, start, end).await
            }
            FetchStrategy::TradeHistory => {
                self.fetch_trade_window(TRADE_HISTORY_ENDPOINT, start, end)
                    .await
            }
            FetchStrategy::HoldingsFallback => self.fetch_holdings_as_fills(start).await,
        }
    }

    async fn fetch_trade_window(
        &self,
        endpoint: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawFill>, BrokerError> {
        let url = format!(
            "{}{}/{}/{}/0",
            BASE_URL,
            endpoint,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
        );
        let request = self.authed(TransportRequest::get(url));
        let response = self
            .governor
            .execute(PLATFORM, request, self.cache_mode())
            .await?;
        if !response.is_success() {
            return Err(self.map_http_error(response.status, &response.body));
        }

        let entries: Vec<TradeEntry> =
            serde_json::from_str(&response.body).map_err(|e| BrokerError::Decode {
                platform: PLATFORM,
                message: e.to_string(),
            })?;

        let mut fills: Vec<RawFill> = entries.iter().filter_map(map_trade_entry).collect();
        fills.sort_by(|a, b| a.filled_at.cmp(&b.filled_at));
        Ok(fills)
    }

    /// Renders current holdings as synthetic open buy fills.
    ///
    /// The fill id is derived from the security id so repeated syncs
    /// resolve to the same journal entry instead of duplicating it.
    async fn fetch_holdings_as_fills(
        &self,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<RawFill>, BrokerError> {
        let request = self.authed(TransportRequest::get(format!(
            "{}{}",
            BASE_URL, HOLDINGS_ENDPOINT
        )));
        let response = self
            .governor
            .execute(PLATFORM, request, self.cache_mode())
            .await?;
        if !response.is_success() {
            return Err(self.map_http_error(response.status, &response.body));
        }

        let holdings: Vec<HoldingEntry> =
            serde_json::from_str(&response.body).map_err(|e| BrokerError::Decode {
                platform: PLATFORM,
                message: e.to_string(),
            })?;

        let fills: Vec<RawFill> = holdings
            .iter()
            .filter(|h| h.total_qty > 0)
            .filter_map(|holding| {
                let price = Decimal::try_from(holding.avg_cost_price).ok()?;
                Some(RawFill {
                    symbol: holding.trading_symbol.clone(),
                    side: FillSide::Buy,
                    price,
                    quantity: Decimal::from(holding.total_qty),
                    filled_at: window_start,
                    order_id: String::new(),
                    fill_id: format!("holding-{}", holding.security_id),
                    exchange: holding.exchange.clone(),
                    product_type: HOLDING_PRODUCT_TYPE.to_string(),
                })
            })
            .collect();

        if !fills.is_empty() {
            debug!("Dhan: derived {} synthetic fills from holdings", fills.len());
        }
        Ok(fills)
    }
}

#[async_trait]
impl BrokerAdapter for DhanAdapter {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    async fn authenticate(&self) -> Result<bool, BrokerError> {
        self.state.begin_auth()?;

        if let Some(expiry) = self.token_expiry {
            if expiry <= Utc::now() {
                self.state.mark_failed(AuthFailureReason::TokenExpired);
                return Ok(false);
            }
        }

        match self.fetch_profile().await {
            Ok(_) => {
                self.state.mark_authenticated();
                Ok(true)
            }
            Err(err)
                if matches!(
                    err,
                    BrokerError::TokenExpired { .. }
                        | BrokerError::ReactivationRequired { .. }
                        | BrokerError::AuthFailed { .. }
                ) =>
            {
                warn!("Dhan token validation failed: {}", err);
                self.state.mark_failed(AuthFailureReason::from_error(&err));
                Ok(false)
            }
            Err(other) => Err(other),
        }
    }

    async fn fetch_trades(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawFill>, BrokerError> {
        self.state.begin_fetch()?;

        let mut outcome: Result<Vec<RawFill>, BrokerError> = Ok(Vec::new());
        for strategy in FETCH_STRATEGIES {
            match self.run_strategy(strategy, start, end).await {
                Ok(fills) if !fills.is_empty() => {
                    outcome = Ok(fills);
                    break;
                }
                Ok(_) => {
                    debug!("Dhan: {:?} yielded no fills, trying next strategy", strategy);
                }
                Err(BrokerError::TradebookUnavailable { message, .. }) => {
                    debug!(
                        "Dhan: {:?} unavailable ({}), trying next strategy",
                        strategy, message
                    );
                }
                Err(other) => {
                    outcome = Err(other);
                    break;
                }
            }
        }

        self.state.end_fetch();
        outcome
    }

    async fn refresh_token(&self) -> Result<bool, BrokerError> {
        // Pre-issued tokens are minted on the dashboard; nothing to rotate.
        Ok(false)
    }

    async fn test_connection(&self) -> ConnectionTestResult {
        match self.fetch_profile().await {
            Ok(profile) => ConnectionTestResult::ok("Dhan connection verified").with_details(
                serde_json::json!({
                    "clientId": profile.dhan_client_id,
                    "tokenValidity": profile.token_validity,
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

/// Maps Dhan error codes onto the taxonomy.
fn map_api_error(code: &str, message: &str) -> BrokerError {
    match code {
        "DH-901" | "DH-808" => BrokerError::TokenExpired { platform: PLATFORM },
        "DH-905" => BrokerError::ReactivationRequired {
            platform: PLATFORM,
            message: message.to_string(),
        },
        "DH-904" => BrokerError::RateLimited { platform: PLATFORM },
        _ => BrokerError::FetchFailed {
            platform: PLATFORM,
            message: format!("{} - {}", code, message),
        },
    }
}

fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
}

fn map_trade_entry(entry: &TradeEntry) -> Option<RawFill> {
    let side = match entry.transaction_type.to_uppercase().as_str() {
        "BUY" => FillSide::Buy,
        "SELL" => FillSide::Sell,
        other => {
            warn!("Dhan: unknown transaction type '{}'", other);
            return None;
        }
    };

    let price = Decimal::try_from(entry.traded_price).ok()?;
    let quantity = Decimal::from(entry.traded_quantity);
    let naive = NaiveDateTime::parse_from_str(&entry.exchange_time, "%Y-%m-%d %H:%M:%S").ok()?;
    let filled_at = naive
        .and_local_timezone(ist_offset())
        .single()?
        .with_timezone(&Utc);

    Some(RawFill {
        symbol: entry.trading_symbol.clone(),
        side,
        price,
        quantity,
        filled_at,
        order_id: entry.order_id.clone(),
        fill_id: entry.exchange_trade_id.clone(),
        exchange: entry.exchange_segment.clone(),
        product_type: entry.product_type.clone(),
    })
}

// ============================================================================
// Tests
// ============================================================================
