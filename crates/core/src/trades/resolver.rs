//! Dedup/upsert resolver.
//!
//! Reconciles trade candidates against the persisted journal by
//! (user, platform, platform trade id). Safe to re-run against the same
//! raw fills: a second pass updates in place instead of duplicating rows.

use std::sync::Arc;

use log::{debug, warn};

use super::trades_model::{CanonicalTrade, TradeCandidate};
use super::trades_traits::TradeRepositoryTrait;
use crate::errors::Result;
use tradelog_brokers::Platform;

/// Counts accumulated while resolving one batch of candidates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Resolves candidates into journal rows, idempotently.
pub struct TradeResolver {
    repository: Arc<dyn TradeRepositoryTrait>,
}

impl TradeResolver {
    pub fn new(repository: Arc<dyn TradeRepositoryTrait>) -> Self {
        Self { repository }
    }

    /// Upserts each candidate for the given user and platform.
    ///
    /// Candidates failing basic validation are counted as skipped and never
    /// persisted; a skip does not fail the batch.
    pub async fn resolve(
        &self,
        user_id: &str,
        platform: Platform,
        candidates: Vec<TradeCandidate>,
    ) -> Result<ResolveOutcome> {
        let mut outcome = ResolveOutcome::default();

        for candidate in candidates {
            if let Some(reason) = candidate.validation_error() {
                warn!(
                    "validation_skip for {} on {}: {}",
                    user_id, platform, reason
                );
                outcome.skipped += 1;
                continue;
            }

            let existing = self.repository.find_by_platform_trade_id(
                user_id,
                platform,
                &candidate.platform_trade_id,
            )?;

            match existing {
                Some(mut trade) => {
                    trade.apply_candidate(&candidate);
                    self.repository.update(trade).await?;
                    outcome.updated += 1;
                }
                None => {
                    let trade = CanonicalTrade::from_candidate(user_id, platform, candidate);
                    self.repository.insert(trade).await?;
                    outcome.created += 1;
                }
            }
        }

        debug!(
            "Resolved batch for {} on {}: {} created, {} updated, {} skipped",
            user_id, platform, outcome.created, outcome.updated, outcome.skipped
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trades::{InMemoryTradeRepository, TradeDirection, TradeStatus};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn candidate(id: &str, exit: Option<Decimal>) -> TradeCandidate {
        TradeCandidate {
            symbol: "SBIN-EQ".to_string(),
            direction: TradeDirection::Long,
            instrument_type: "DELIVERY".to_string(),
            entry_price: dec!(100),
            exit_price: exit,
            quantity: dec!(10),
            entry_at: "2026-07-01T04:00:00Z".parse().unwrap(),
            exit_at: exit.map(|_| "2026-07-01T09:00:00Z".parse().unwrap()),
            provider_profit_loss: None,
            platform_trade_id: id.to_string(),
            status: if exit.is_some() {
                TradeStatus::Complete
            } else {
                TradeStatus::Open
            },
        }
    }

    #[tokio::test]
    async fn second_pass_updates_instead_of_duplicating() {
        let repository = Arc::new(InMemoryTradeRepository::new());
        let resolver = TradeResolver::new(repository.clone());

        let first = resolver
            .resolve(
                "user-1",
                Platform::AngelOne,
                vec![candidate("t1", Some(dec!(110)))],
            )
            .await
            .unwrap();
        assert_eq!(first.created, 1);

        let second = resolver
            .resolve(
                "user-1",
                Platform::AngelOne,
                vec![candidate("t1", Some(dec!(110)))],
            )
            .await
            .unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 1);

        assert_eq!(repository.list_for_user("user-1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn updates_promote_open_trades_to_complete() {
        let repository = Arc::new(InMemoryTradeRepository::new());
        let resolver = TradeResolver::new(repository.clone());

        resolver
            .resolve("user-1", Platform::Dhan, vec![candidate("t1", None)])
            .await
            .unwrap();

        resolver
            .resolve(
                "user-1",
                Platform::Dhan,
                vec![candidate("t1", Some(dec!(120)))],
            )
            .await
            .unwrap();

        let trades = repository.list_for_user("user-1").unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].status, TradeStatus::Complete);
        assert_eq!(trades[0].profit_loss, Some(dec!(200)));
    }

    #[tokio::test]
    async fn invalid_candidates_are_skipped_not_fatal() {
        let repository = Arc::new(InMemoryTradeRepository::new());
        let resolver = TradeResolver::new(repository.clone());

        let mut bad = candidate("t-bad", None);
        bad.quantity = Decimal::ZERO;

        let outcome = resolver
            .resolve(
                "user-1",
                Platform::Dhan,
                vec![bad, candidate("t-good", None)],
            )
            .await
            .unwrap();

        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.created, 1);
        assert_eq!(repository.list_for_user("user-1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn platform_identity_is_scoped_per_user_and_platform() {
        let repository = Arc::new(InMemoryTradeRepository::new());
        let resolver = TradeResolver::new(repository.clone());

        resolver
            .resolve("user-1", Platform::Dhan, vec![candidate("t1", None)])
            .await
            .unwrap();
        let outcome = resolver
            .resolve("user-2", Platform::Dhan, vec![candidate("t1", None)])
            .await
            .unwrap();

        // Same platform trade id, different user: a distinct row.
        assert_eq!(outcome.created, 1);
    }
}
