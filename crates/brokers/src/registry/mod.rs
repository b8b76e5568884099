//! Adapter registry.
//!
//! Builds the correct adapter variant from a platform identifier and a
//! credential bundle, wiring every adapter to the shared request governor
//! so all instances of a platform draw from one pacing budget.

use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::adapter::angel_one::AngelOneAdapter;
use crate::adapter::dhan::DhanAdapter;
use crate::adapter::fyers::FyersAdapter;
use crate::adapter::BrokerAdapter;
use crate::errors::BrokerError;
use crate::governor::{PacingConfig, RequestGovernor};
use crate::models::{BrokerCredentials, Platform};

/// Per-build options passed through from the sync trigger.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuildOptions {
    /// Bypass the governor's response cache for this invocation.
    pub force_refresh: bool,
}

/// Object-safe factory so orchestration can be tested with scripted adapters.
pub trait AdapterFactory: Send + Sync {
    fn build(
        &self,
        platform: Platform,
        credentials: BrokerCredentials,
        options: BuildOptions,
    ) -> Result<Arc<dyn BrokerAdapter>, BrokerError>;
}

/// Registry of supported platform adapters.
pub struct AdapterRegistry {
    governor: Arc<RequestGovernor>,
}

impl AdapterRegistry {
    /// Creates a registry over the given governor, installing each
    /// platform's published rate limits.
    pub fn new(governor: Arc<RequestGovernor>) -> Self {
        for platform in Platform::ALL {
            governor.configure_pacing(platform, Self::pacing_defaults(platform));
        }
        Self { governor }
    }

    /// Published request budgets per platform.
    fn pacing_defaults(platform: Platform) -> PacingConfig {
        match platform {
            Platform::AngelOne => PacingConfig {
                requests_per_minute: 60,
                burst_capacity: 5.0,
                min_interval: Duration::from_millis(350),
            },
            Platform::Fyers => PacingConfig {
                requests_per_minute: 100,
                burst_capacity: 10.0,
                min_interval: Duration::from_millis(200),
            },
            Platform::Dhan => PacingConfig {
                requests_per_minute: 60,
                burst_capacity: 5.0,
                min_interval: Duration::from_millis(250),
            },
        }
    }
}

impl AdapterFactory for AdapterRegistry {
    fn build(
        &self,
        platform: Platform,
        credentials: BrokerCredentials,
        options: BuildOptions,
    ) -> Result<Arc<dyn BrokerAdapter>, BrokerError> {
        if credentials.platform() != platform {
            return Err(BrokerError::InvalidCredentials {
                message: format!(
                    "Credential bundle is for {}, not {}",
                    credentials.platform(),
                    platform
                ),
            });
        }

        debug!(
            "Building {} adapter (force_refresh: {})",
            platform, options.force_refresh
        );

        let governor = self.governor.clone();
        let adapter: Arc<dyn BrokerAdapter> = match platform {
            Platform::AngelOne => Arc::new(AngelOneAdapter::new(
                governor,
                credentials,
                options.force_refresh,
            )?),
            Platform::Fyers => Arc::new(FyersAdapter::new(
                governor,
                credentials,
                options.force_refresh,
            )?),
            Platform::Dhan => Arc::new(DhanAdapter::new(
                governor,
                credentials,
                options.force_refresh,
            )?),
        };
        Ok(adapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governor::GovernorConfig;
    use crate::transport::MockTransport;

    fn registry() -> AdapterRegistry {
        let transport = Arc::new(MockTransport::new());
        let governor = Arc::new(RequestGovernor::new(transport, GovernorConfig::default()));
        AdapterRegistry::new(governor)
    }

    #[test]
    fn builds_the_matching_variant() {
        let registry = registry();
        let adapter = registry
            .build(
                Platform::Dhan,
                BrokerCredentials::Dhan {
                    client_id: "1000001".to_string(),
                    access_token: "token".to_string(),
                    token_expiry: None,
                },
                BuildOptions::default(),
            )
            .unwrap();
        assert_eq!(adapter.platform(), Platform::Dhan);
    }

    #[test]
    fn rejects_mismatched_credentials() {
        let registry = registry();
        let err = match registry.build(
            Platform::Fyers,
            BrokerCredentials::Dhan {
                client_id: "1000001".to_string(),
                access_token: "token".to_string(),
                token_expiry: None,
            },
            BuildOptions::default(),
        ) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert_eq!(err.error_code(), "auth_failed");
    }

    #[test]
    fn rejects_invalid_bundles() {
        let registry = registry();
        let err = match registry.build(
            Platform::AngelOne,
            BrokerCredentials::AngelOne {
                api_key: String::new(),
                client_code: "A123456".to_string(),
                pin: "1234".to_string(),
                totp_code: None,
                tokens: None,
            },
            BuildOptions::default(),
        ) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("api_key"));
    }
}
