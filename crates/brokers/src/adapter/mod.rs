//! Platform adapters.
//!
//! One module per brokerage, each implementing [`BrokerAdapter`] on top of
//! the shared [`RequestGovernor`](crate::governor::RequestGovernor).

pub mod angel_one;
pub mod dhan;
pub mod fyers;
mod state;
mod traits;

pub use state::{AdapterState, AuthFailureReason, StateCell};
pub use traits::{BrokerAdapter, ConnectionTestResult};
