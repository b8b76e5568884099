//! Supported brokerage platforms.

use serde::{Deserialize, Serialize};

/// Identifier for a supported brokerage platform.
///
/// The string form is stable and used for logging, rate limiter keying,
/// and persisted account records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    /// Angel One SmartAPI (password + rotating one-time code flow).
    AngelOne,
    /// Fyers API v3 (OAuth authorization-code exchange).
    Fyers,
    /// Dhan API v2 (pre-issued session token).
    Dhan,
}

impl Platform {
    /// All supported platforms, in registry order.
    pub const ALL: [Platform; 3] = [Platform::AngelOne, Platform::Fyers, Platform::Dhan];

    /// Stable string identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::AngelOne => "ANGEL_ONE",
            Platform::Fyers => "FYERS",
            Platform::Dhan => "DHAN",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ANGEL_ONE" | "ANGELONE" => Ok(Platform::AngelOne),
            "FYERS" => Ok(Platform::Fyers),
            "DHAN" => Ok(Platform::Dhan),
            other => Err(format!("Unknown platform: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn round_trips_string_form() {
        for platform in Platform::ALL {
            assert_eq!(Platform::from_str(platform.as_str()).unwrap(), platform);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Platform::from_str("dhan").unwrap(), Platform::Dhan);
        assert_eq!(Platform::from_str("angelone").unwrap(), Platform::AngelOne);
    }

    #[test]
    fn unknown_platform_is_rejected() {
        assert!(Platform::from_str("ROBINHOOD").is_err());
    }

    #[test]
    fn serde_uses_stable_identifiers() {
        let json = serde_json::to_string(&Platform::AngelOne).unwrap();
        assert_eq!(json, "\"ANGEL_ONE\"");
    }
}
