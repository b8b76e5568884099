//! Canonical trades: models, pairing engine, dedup resolver, store traits.

mod memory_repository;
mod pairing;
mod resolver;
mod trades_model;
mod trades_traits;

pub use memory_repository::InMemoryTradeRepository;
pub use pairing::pair_fills;
pub use resolver::{ResolveOutcome, TradeResolver};
pub use trades_model::{CanonicalTrade, TradeCandidate, TradeDirection, TradeStatus};
pub use trades_traits::TradeRepositoryTrait;
