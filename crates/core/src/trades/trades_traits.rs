//! Trade store trait.
//!
//! The journal's persistence engine is an external collaborator; this
//! trait is the keyed-document-store view the engine relies on. There are
//! no cross-trade transactions.

use async_trait::async_trait;

use super::trades_model::CanonicalTrade;
use crate::errors::Result;
use tradelog_brokers::Platform;

/// Contract for canonical trade persistence.
#[async_trait]
pub trait TradeRepositoryTrait: Send + Sync {
    /// Looks up a trade by its platform identity.
    fn find_by_platform_trade_id(
        &self,
        user_id: &str,
        platform: Platform,
        platform_trade_id: &str,
    ) -> Result<Option<CanonicalTrade>>;

    /// Inserts a new trade.
    async fn insert(&self, trade: CanonicalTrade) -> Result<CanonicalTrade>;

    /// Updates an existing trade by id.
    async fn update(&self, trade: CanonicalTrade) -> Result<CanonicalTrade>;

    /// Lists all trades for a user.
    fn list_for_user(&self, user_id: &str) -> Result<Vec<CanonicalTrade>>;

    /// Deletes a trade. Returns the number of deleted records.
    async fn delete(&self, trade_id: &str) -> Result<usize>;
}
