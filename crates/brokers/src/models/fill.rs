//! Raw execution records fetched from a platform.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of a raw fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FillSide {
    Buy,
    Sell,
}

impl std::fmt::Display for FillSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FillSide::Buy => f.write_str("BUY"),
            FillSide::Sell => f.write_str("SELL"),
        }
    }
}

/// One matched execution of an order, as reported by a platform.
///
/// Raw fills live for a single sync run: produced by an adapter, consumed
/// once by the pairing engine, then discarded.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFill {
    pub symbol: String,
    pub side: FillSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub filled_at: DateTime<Utc>,
    pub order_id: String,
    /// Provider fill identifier. May be empty for providers that do not
    /// report one; downstream pairing synthesizes a fingerprint instead.
    pub fill_id: String,
    pub exchange: String,
    pub product_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn serializes_with_stable_side_tags() {
        let fill = RawFill {
            symbol: "SBIN-EQ".to_string(),
            side: FillSide::Buy,
            price: dec!(612.35),
            quantity: dec!(10),
            filled_at: "2026-07-01T09:22:11Z".parse().unwrap(),
            order_id: "240701000123".to_string(),
            fill_id: "52987".to_string(),
            exchange: "NSE".to_string(),
            product_type: "DELIVERY".to_string(),
        };

        let json = serde_json::to_string(&fill).unwrap();
        assert!(json.contains("\"side\":\"BUY\""));
        assert!(json.contains("\"filledAt\""));
    }
}
