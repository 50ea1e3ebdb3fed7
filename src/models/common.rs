use serde::{Deserialize, Serialize};

/// Internal subscription classification granted by a validated transaction.
///
/// `None` is never persisted on a subscription row; it only appears as a
/// user's aggregate entitlement when no active subscription exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntitlementTier {
    None,
    Monthly,
    Annual,
    Lifetime,
}

impl EntitlementTier {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "monthly" => Some(Self::Monthly),
            "annual" => Some(Self::Annual),
            "lifetime" => Some(Self::Lifetime),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Monthly => "monthly",
            Self::Annual => "annual",
            Self::Lifetime => "lifetime",
        }
    }

    /// Ranking used when aggregating a user's subscriptions into one
    /// effective entitlement: lifetime > annual > monthly > none.
    pub fn priority(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Monthly => 1,
            Self::Annual => 2,
            Self::Lifetime => 3,
        }
    }

    /// Lifetime purchases never expire; everything else is judged by
    /// `expires_at` at validation time.
    pub fn expires(&self) -> bool {
        !matches!(self, Self::Lifetime)
    }
}

/// App Store deployment environment a transaction was retrieved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreEnvironment {
    Production,
    Sandbox,
}

impl StoreEnvironment {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "sandbox" => Some(Self::Sandbox),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Sandbox => "sandbox",
        }
    }

    /// Spelling used in the `environment` claim of signed payloads.
    pub fn claim_name(&self) -> &'static str {
        match self {
            Self::Production => "Production",
            Self::Sandbox => "Sandbox",
        }
    }
}
