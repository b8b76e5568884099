//! Tradelog Brokers - platform adapters and request governance.
//!
//! This crate owns everything that talks to a brokerage: the common
//! adapter contract and its per-platform implementations, the shared
//! request governor (pacing, response caching, bounded retry), the
//! credential models, and the broker error taxonomy.

pub mod adapter;
pub mod errors;
pub mod governor;
pub mod models;
pub mod registry;
pub mod transport;

pub use adapter::{AdapterState, AuthFailureReason, BrokerAdapter, ConnectionTestResult};
pub use errors::{BrokerError, RetryClass};
pub use governor::{GovernorConfig, RequestGovernor};
pub use models::{BrokerCredentials, FillSide, Platform, RawFill, SessionTokens};
pub use registry::{AdapterFactory, AdapterRegistry, BuildOptions};
