//! Canonical trade domain models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tradelog_brokers::Platform;

/// Direction of a round-trip trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    /// Sign applied when deriving profit/loss from entry and exit:
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> Decimal {
        match self {
            TradeDirection::Long => Decimal::ONE,
            TradeDirection::Short => -Decimal::ONE,
        }
    }
}

/// Lifecycle status of a canonical trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Open,
    Complete,
}

/// A trade candidate produced by the pairing engine, before it has been
/// reconciled against the persisted journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeCandidate {
    pub symbol: String,
    pub direction: TradeDirection,
    pub instrument_type: String,
    pub entry_price: Decimal,
    #[serde(default)]
    pub exit_price: Option<Decimal>,
    pub quantity: Decimal,
    pub entry_at: DateTime<Utc>,
    #[serde(default)]
    pub exit_at: Option<DateTime<Utc>>,
    /// Profit/loss as reported by the provider, when it reports one.
    #[serde(default)]
    pub provider_profit_loss: Option<Decimal>,
    /// Unique within (user, platform); derived from provider fill ids or a
    /// content fingerprint.
    pub platform_trade_id: String,
    pub status: TradeStatus,
}

impl TradeCandidate {
    /// Basic validity check; a failing candidate is skipped by the
    /// resolver and counted, never persisted.
    pub fn validation_error(&self) -> Option<String> {
        if self.symbol.trim().is_empty() {
            return Some("empty symbol".to_string());
        }
        if self.platform_trade_id.trim().is_empty() {
            return Some("empty platform trade id".to_string());
        }
        if self.quantity <= Decimal::ZERO {
            return Some(format!("non-positive quantity {}", self.quantity));
        }
        if self.entry_price < Decimal::ZERO {
            return Some(format!("negative entry price {}", self.entry_price));
        }
        None
    }

    /// Profit/loss with the fallback order: provider-reported, else
    /// derived from (exit - entry) x quantity x direction sign, else none.
    pub fn profit_loss(&self) -> Option<Decimal> {
        if let Some(reported) = self.provider_profit_loss {
            return Some(reported);
        }
        self.exit_price
            .map(|exit| (exit - self.entry_price) * self.quantity * self.direction.sign())
    }
}

/// A journal entry: one round-trip or open position on one platform.
///
/// Persists until explicitly deleted by the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalTrade {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    pub direction: TradeDirection,
    pub instrument_type: String,
    pub entry_price: Decimal,
    #[serde(default)]
    pub exit_price: Option<Decimal>,
    pub quantity: Decimal,
    pub entry_at: DateTime<Utc>,
    #[serde(default)]
    pub exit_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub profit_loss: Option<Decimal>,
    pub platform: Platform,
    pub platform_trade_id: String,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CanonicalTrade {
    /// Materializes a candidate into a new journal entry.
    pub fn from_candidate(user_id: &str, platform: Platform, candidate: TradeCandidate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            symbol: candidate.symbol.clone(),
            direction: candidate.direction,
            instrument_type: candidate.instrument_type.clone(),
            entry_price: candidate.entry_price,
            exit_price: candidate.exit_price,
            quantity: candidate.quantity,
            entry_at: candidate.entry_at,
            exit_at: candidate.exit_at,
            profit_loss: candidate.profit_loss(),
            platform,
            platform_trade_id: candidate.platform_trade_id.clone(),
            status: candidate.status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Updates this entry in place from a re-fetched candidate.
    pub fn apply_candidate(&mut self, candidate: &TradeCandidate) {
        self.symbol = candidate.symbol.clone();
        self.direction = candidate.direction;
        self.instrument_type = candidate.instrument_type.clone();
        self.entry_price = candidate.entry_price;
        self.exit_price = candidate.exit_price;
        self.quantity = candidate.quantity;
        self.entry_at = candidate.entry_at;
        self.exit_at = candidate.exit_at;
        self.profit_loss = candidate.profit_loss();
        self.status = candidate.status;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candidate() -> TradeCandidate {
        TradeCandidate {
            symbol: "SBIN-EQ".to_string(),
            direction: TradeDirection::Long,
            instrument_type: "DELIVERY".to_string(),
            entry_price: dec!(100),
            exit_price: Some(dec!(110)),
            quantity: dec!(10),
            entry_at: "2026-07-01T04:00:00Z".parse().unwrap(),
            exit_at: Some("2026-07-01T09:00:00Z".parse().unwrap()),
            provider_profit_loss: None,
            platform_trade_id: "52987-53011".to_string(),
            status: TradeStatus::Complete,
        }
    }

    #[test]
    fn derived_profit_loss_uses_direction_sign() {
        assert_eq!(candidate().profit_loss(), Some(dec!(100)));

        let mut short = candidate();
        short.direction = TradeDirection::Short;
        assert_eq!(short.profit_loss(), Some(dec!(-100)));
    }

    #[test]
    fn provider_reported_profit_loss_wins() {
        let mut c = candidate();
        c.provider_profit_loss = Some(dec!(98.5));
        assert_eq!(c.profit_loss(), Some(dec!(98.5)));
    }

    #[test]
    fn open_candidates_have_no_profit_loss() {
        let mut c = candidate();
        c.exit_price = None;
        c.exit_at = None;
        c.status = TradeStatus::Open;
        assert_eq!(c.profit_loss(), None);
    }

    #[test]
    fn validation_catches_bad_candidates() {
        assert!(candidate().validation_error().is_none());

        let mut zero_qty = candidate();
        zero_qty.quantity = Decimal::ZERO;
        assert!(zero_qty.validation_error().is_some());

        let mut no_id = candidate();
        no_id.platform_trade_id = String::new();
        assert!(no_id.validation_error().is_some());

        let mut negative_price = candidate();
        negative_price.entry_price = dec!(-1);
        assert!(negative_price.validation_error().is_some());
    }

    #[test]
    fn apply_candidate_recomputes_profit_loss() {
        let mut trade =
            CanonicalTrade::from_candidate("user-1", Platform::AngelOne, candidate());
        assert_eq!(trade.profit_loss, Some(dec!(100)));

        let mut updated = candidate();
        updated.exit_price = Some(dec!(120));
        trade.apply_candidate(&updated);
        assert_eq!(trade.profit_loss, Some(dec!(200)));
    }
}
