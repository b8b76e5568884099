//! Trade pairing engine.
//!
//! Pure transformation of ordered raw fills into round-trip and open trade
//! candidates. Deterministic: identical input order and timestamps always
//! produce identical output.
//!
//! Algorithm: group fills by symbol; split each group into buy and sell
//! lists sorted ascending by fill time (ties broken by input order); walk
//! the two lists index-by-index, matching the earliest unmatched buy with
//! the earliest unmatched sell. Each match emits one complete trade with
//! matched quantity = min(buy qty, sell qty). Leftover fills on either
//! side become open trades. A fill is consumed at most once per pass; the
//! walk pairs whole fills 1:1 rather than consuming partial quantities
//! across multiple fills.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use super::trades_model::{TradeCandidate, TradeDirection, TradeStatus};
use tradelog_brokers::{FillSide, RawFill};

/// Length of the synthesized fill fingerprint.
const FINGERPRINT_LEN: usize = 16;

/// Pairs raw fills into trade candidates.
pub fn pair_fills(fills: &[RawFill]) -> Vec<TradeCandidate> {
    // Group by symbol, preserving first-seen order for determinism.
    let mut symbol_order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&RawFill>> = HashMap::new();
    for fill in fills {
        let entry = groups.entry(fill.symbol.as_str()).or_default();
        if entry.is_empty() {
            symbol_order.push(fill.symbol.as_str());
        }
        entry.push(fill);
    }

    let mut candidates = Vec::new();
    for symbol in symbol_order {
        let group = &groups[symbol];

        let mut buys: Vec<&RawFill> = group
            .iter()
            .filter(|f| f.side == FillSide::Buy)
            .copied()
            .collect();
        let mut sells: Vec<&RawFill> = group
            .iter()
            .filter(|f| f.side == FillSide::Sell)
            .copied()
            .collect();

        // Stable sorts keep input order for equal timestamps.
        buys.sort_by_key(|f| f.filled_at);
        sells.sort_by_key(|f| f.filled_at);

        let matched = buys.len().min(sells.len());
        for i in 0..matched {
            candidates.push(pair_candidate(buys[i], sells[i]));
        }
        for leftover in &buys[matched..] {
            candidates.push(open_candidate(leftover));
        }
        for leftover in &sells[matched..] {
            candidates.push(open_candidate(leftover));
        }
    }
    candidates
}

/// One complete round trip from a matched buy/sell pair.
fn pair_candidate(buy: &RawFill, sell: &RawFill) -> TradeCandidate {
    // Buy preceding sell reads as a long; the mirrored case as a short.
    let direction = if buy.filled_at <= sell.filled_at {
        TradeDirection::Long
    } else {
        TradeDirection::Short
    };
    let (entry, exit) = match direction {
        TradeDirection::Long => (buy, sell),
        TradeDirection::Short => (sell, buy),
    };

    let quantity = buy.quantity.min(sell.quantity);

    TradeCandidate {
        symbol: entry.symbol.clone(),
        direction,
        instrument_type: entry.product_type.clone(),
        entry_price: entry.price,
        exit_price: Some(exit.price),
        quantity,
        entry_at: entry.filled_at,
        exit_at: Some(exit.filled_at),
        // P/L is derived from entry/exit downstream; none of the supported
        // platforms report a realized figure per fill pair.
        provider_profit_loss: None,
        platform_trade_id: format!("{}-{}", fill_ref(buy), fill_ref(sell)),
        status: TradeStatus::Complete,
    }
}

/// An unmatched fill becomes an open position.
fn open_candidate(fill: &RawFill) -> TradeCandidate {
    let direction = match fill.side {
        FillSide::Buy => TradeDirection::Long,
        FillSide::Sell => TradeDirection::Short,
    };

    TradeCandidate {
        symbol: fill.symbol.clone(),
        direction,
        instrument_type: fill.product_type.clone(),
        entry_price: fill.price,
        exit_price: None,
        quantity: fill.quantity,
        entry_at: fill.filled_at,
        exit_at: None,
        provider_profit_loss: None,
        platform_trade_id: fill_ref(fill),
        status: TradeStatus::Open,
    }
}

/// Stable reference for a fill: its provider id, or a content fingerprint
/// when the provider does not report one.
fn fill_ref(fill: &RawFill) -> String {
    if !fill.fill_id.trim().is_empty() {
        return fill.fill_id.clone();
    }
    fill_fingerprint(fill)
}

/// Content-hash fingerprint over the fields that identify an execution.
/// Stable across fetch passes so re-synced fills resolve to the same
/// journal entry.
fn fill_fingerprint(fill: &RawFill) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fill.symbol.as_bytes());
    hasher.update(b"|");
    hasher.update(fill.side.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(fill.price.normalize().to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(fill.quantity.normalize().to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(fill.filled_at.to_rfc3339().as_bytes());
    hasher.update(b"|");
    hasher.update(fill.order_id.as_bytes());

    let digest = hex::encode(hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}
