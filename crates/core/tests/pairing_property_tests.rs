//! Property tests for the trade pairing engine.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;

use tradelog_brokers::{FillSide, RawFill};
use tradelog_core::trades::{pair_fills, TradeStatus};

fn timestamp(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 1, 9, minute % 60, 0).unwrap()
}

prop_compose! {
    fn arb_fill()
        (symbol in prop::sample::select(vec!["SBIN", "INFY", "TCS"]),
         is_buy in any::<bool>(),
         price in 1u32..100_000,
         quantity in 1u32..1_000,
         minute in 0u32..60,
         id in any::<u64>())
        -> RawFill
    {
        RawFill {
            symbol: symbol.to_string(),
            side: if is_buy { FillSide::Buy } else { FillSide::Sell },
            price: Decimal::from(price) / Decimal::from(100),
            quantity: Decimal::from(quantity),
            filled_at: timestamp(minute),
            order_id: format!("order-{:x}", id),
            fill_id: format!("fill-{:x}", id),
            exchange: "NSE".to_string(),
            product_type: "DELIVERY".to_string(),
        }
    }
}

fn arb_fills() -> impl Strategy<Value = Vec<RawFill>> {
    prop::collection::vec(arb_fill(), 0..40)
}

proptest! {
    /// Identical input always produces identical output.
    #[test]
    fn pairing_is_deterministic(fills in arb_fills()) {
        let first = pair_fills(&fills);
        let second = pair_fills(&fills);
        prop_assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    /// Per symbol, the 1:1 index walk emits max(#buys, #sells) candidates:
    /// min(#buys, #sells) complete trades plus one open trade per leftover
    /// fill. Each fill is consumed at most once.
    #[test]
    fn candidate_counts_match_the_index_walk(fills in arb_fills()) {
        let candidates = pair_fills(&fills);

        for symbol in ["SBIN", "INFY", "TCS"] {
            let buys = fills.iter().filter(|f| f.symbol == symbol && f.side == FillSide::Buy).count();
            let sells = fills.iter().filter(|f| f.symbol == symbol && f.side == FillSide::Sell).count();

            let complete = candidates
                .iter()
                .filter(|c| c.symbol == symbol && c.status == TradeStatus::Complete)
                .count();
            let open = candidates
                .iter()
                .filter(|c| c.symbol == symbol && c.status == TradeStatus::Open)
                .count();

            prop_assert_eq!(complete, buys.min(sells));
            prop_assert_eq!(open, buys.max(sells) - buys.min(sells));
        }
    }

    /// Structural invariants: complete trades carry an exit, open trades
    /// don't, quantities are positive, and derived profit/loss follows the
    /// direction sign.
    #[test]
    fn candidates_are_structurally_sound(fills in arb_fills()) {
        for candidate in pair_fills(&fills) {
            prop_assert!(candidate.quantity > Decimal::ZERO);
            prop_assert!(candidate.entry_price >= Decimal::ZERO);
            prop_assert!(candidate.validation_error().is_none());

            match candidate.status {
                TradeStatus::Complete => {
                    let exit = candidate.exit_price.expect("complete trade without exit");
                    prop_assert!(candidate.exit_at.is_some());
                    let expected = (exit - candidate.entry_price)
                        * candidate.quantity
                        * candidate.direction.sign();
                    prop_assert_eq!(candidate.profit_loss(), Some(expected));
                }
                TradeStatus::Open => {
                    prop_assert!(candidate.exit_price.is_none());
                    prop_assert!(candidate.exit_at.is_none());
                    prop_assert_eq!(candidate.profit_loss(), None);
                }
            }
        }
    }

    /// Entries never postdate exits on completed trades.
    #[test]
    fn entries_precede_exits(fills in arb_fills()) {
        for candidate in pair_fills(&fills) {
            if let Some(exit_at) = candidate.exit_at {
                prop_assert!(candidate.entry_at <= exit_at);
            }
        }
    }
}
