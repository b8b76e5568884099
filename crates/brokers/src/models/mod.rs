//! Shared models for broker integrations.

mod credentials;
mod fill;
mod platform;

pub use credentials::{BrokerCredentials, SessionTokens};
pub use fill::{FillSide, RawFill};
pub use platform::Platform;
