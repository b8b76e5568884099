//! Connected broker accounts: models, traits, service, in-memory store.

mod accounts_model;
mod accounts_service;
mod accounts_traits;
mod memory_repository;

pub use accounts_model::{BrokerAccount, NewBrokerAccount, SyncStatus};
pub use accounts_service::BrokerAccountService;
pub use accounts_traits::{BrokerAccountRepositoryTrait, BrokerAccountServiceTrait};
pub use memory_repository::InMemoryBrokerAccountRepository;
