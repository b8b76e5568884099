//! In-memory trade store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::trades_model::CanonicalTrade;
use super::trades_traits::TradeRepositoryTrait;
use crate::errors::{Error, Result};
use tradelog_brokers::Platform;

/// Keyed in-memory trade store for tests and embedded use.
#[derive(Clone, Default)]
pub struct InMemoryTradeRepository {
    trades: Arc<Mutex<HashMap<String, CanonicalTrade>>>,
}

impl InMemoryTradeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored trades, across users.
    pub fn len(&self) -> usize {
        self.trades.lock().unwrap().len()
    }

    /// True when the store is empty.
    pub fn is_empty(&self) -> bool {
        self.trades.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl TradeRepositoryTrait for InMemoryTradeRepository {
    fn find_by_platform_trade_id(
        &self,
        user_id: &str,
        platform: Platform,
        platform_trade_id: &str,
    ) -> Result<Option<CanonicalTrade>> {
        Ok(self
            .trades
            .lock()
            .unwrap()
            .values()
            .find(|t| {
                t.user_id == user_id
                    && t.platform == platform
                    && t.platform_trade_id == platform_trade_id
            })
            .cloned())
    }

    async fn insert(&self, trade: CanonicalTrade) -> Result<CanonicalTrade> {
        let mut trades = self.trades.lock().unwrap();
        if trades.contains_key(&trade.id) {
            return Err(Error::Repository(format!(
                "Trade {} already exists",
                trade.id
            )));
        }
        trades.insert(trade.id.clone(), trade.clone());
        Ok(trade)
    }

    async fn update(&self, trade: CanonicalTrade) -> Result<CanonicalTrade> {
        let mut trades = self.trades.lock().unwrap();
        if !trades.contains_key(&trade.id) {
            return Err(Error::NotFound(format!("Trade {}", trade.id)));
        }
        trades.insert(trade.id.clone(), trade.clone());
        Ok(trade)
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<CanonicalTrade>> {
        let mut trades: Vec<CanonicalTrade> = self
            .trades
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        trades.sort_by(|a, b| a.entry_at.cmp(&b.entry_at).then(a.id.cmp(&b.id)));
        Ok(trades)
    }

    async fn delete(&self, trade_id: &str) -> Result<usize> {
        Ok(self
            .trades
            .lock()
            .unwrap()
            .remove(trade_id)
            .map(|_| 1)
            .unwrap_or(0))
    }
}
