//! Subscription tiers and the resolved subscription for an API key.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A subscription level. Totally ordered: `Free < Pro < Enterprise`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// No payment required; limited plugin set.
    Free,
    /// Paid individual tier.
    Pro,
    /// Paid organization tier.
    Enterprise,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Tier::Free),
            "pro" => Ok(Tier::Pro),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(format!("unknown subscription tier: {other}")),
        }
    }
}

/// The resolved subscription behind a validated API key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// The subscription's tier.
    pub tier: Tier,
    /// Opaque customer identifier from the entitlement service.
    pub customer_id: String,
    /// Human-readable customer/account name.
    pub customer_name: String,
    /// Named feature flags enabled for this subscription.
    pub features: BTreeSet<String>,
}

impl Subscription {
    /// Whether this subscription's tier satisfies a plugin's required tier.
    ///
    /// `can_access(plugin) ⟺ subscription.tier ≥ plugin.required_tier`.
    #[must_use]
    pub fn can_access(&self, required_tier: Tier) -> bool {
        self.tier >= required_tier
    }

    /// Whether a named feature is enabled for this subscription.
    #[must_use]
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_ordering() {
        assert!(Tier::Free < Tier::Pro);
        assert!(Tier::Pro < Tier::Enterprise);
        assert!(Tier::Free < Tier::Enterprise);
    }

    #[test]
    fn tier_monotonicity_can_access() {
        let free_sub = Subscription {
            tier: Tier::Free,
            customer_id: "c1".into(),
            customer_name: "Name".into(),
            features: BTreeSet::new(),
        };
        assert!(free_sub.can_access(Tier::Free));
        assert!(!free_sub.can_access(Tier::Pro));
        assert!(!free_sub.can_access(Tier::Enterprise));

        let pro_sub = Subscription {
            tier: Tier::Pro,
            ..free_sub.clone()
        };
        assert!(pro_sub.can_access(Tier::Free));
        assert!(pro_sub.can_access(Tier::Pro));
        assert!(!pro_sub.can_access(Tier::Enterprise));
    }

    #[test]
    fn tier_from_str_roundtrip() {
        for tier in [Tier::Free, Tier::Pro, Tier::Enterprise] {
            let parsed: Tier = tier.to_string().parse().unwrap();
            assert_eq!(parsed, tier);
        }
        assert!("bogus".parse::<Tier>().is_err());
    }
}
