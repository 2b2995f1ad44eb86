// Sentinel Center - Zone Model
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Firewall zones and the trusted/untrusted buckets networks are sorted into.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

/// A firewalld zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Zone {
    Drop,
    Block,
    Public,
    External,
    Dmz,
    Work,
    Home,
    Internal,
    Trusted,
    /// A zone defined locally by the administrator.
    Other(String),
}

impl Zone {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Drop => "drop",
            Self::Block => "block",
            Self::Public => "public",
            Self::External => "external",
            Self::Dmz => "dmz",
            Self::Work => "work",
            Self::Home => "home",
            Self::Internal => "internal",
            Self::Trusted => "trusted",
            Self::Other(name) => name,
        }
    }

    /// Parse a zone name as printed by `firewall-cmd`.
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "drop" => Self::Drop,
            "block" => Self::Block,
            "public" => Self::Public,
            "external" => Self::External,
            "dmz" => Self::Dmz,
            "work" => Self::Work,
            "home" => Self::Home,
            "internal" => Self::Internal,
            "trusted" => Self::Trusted,
            other => Self::Other(other.to_string()),
        }
    }

    /// Which policy bucket this zone belongs to.
    pub fn bucket(&self) -> ZoneBucket {
        match self {
            Self::Home | Self::Work | Self::Trusted | Self::Internal => ZoneBucket::Trusted,
            _ => ZoneBucket::Untrusted,
        }
    }

    /// Get a description for the zone.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Drop => "Drops all incoming network packets with no reply. Only outgoing connections are possible.",
            Self::Block => "Incoming connections are rejected with an icmp-host-prohibited message. Only outgoing connections are possible.",
            Self::Public => "For use in public areas. You do not trust other computers. Only selected connections are accepted.",
            Self::External => "For use on external networks with masquerading enabled. Only selected connections are accepted.",
            Self::Dmz => "For computers in your demilitarized zone that are publicly accessible. Only selected connections are accepted.",
            Self::Work => "For use in work areas. You mostly trust other computers. Only selected connections are accepted.",
            Self::Home => "For use at home. You mostly trust other computers. Only selected connections are accepted.",
            Self::Internal => "For use on internal networks. You mostly trust other computers. Only selected connections are accepted.",
            Self::Trusted => "All network connections are accepted.",
            Self::Other(_) => "Custom zone",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.contains(char::is_whitespace) {
            return Err(anyhow!("Invalid zone name: {:?}", s));
        }
        Ok(Self::from_name(s))
    }
}

/// The two-valued policy a network is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneBucket {
    /// Cafés, airports, anything not vouched for.
    Untrusted,
    /// Home or office networks.
    Trusted,
}

impl ZoneBucket {
    /// The concrete zone applied for this bucket.
    pub fn zone(&self) -> Zone {
        match self {
            Self::Untrusted => Zone::Public,
            Self::Trusted => Zone::Home,
        }
    }

    /// Value persisted in the config store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untrusted => "public",
            Self::Trusted => "home",
        }
    }

    /// Parse a persisted bucket. Accepts any zone name and collapses it.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "" => None,
            "untrusted" => Some(Self::Untrusted),
            "trusted" => Some(Self::Trusted),
            other => Some(Zone::from_name(other).bucket()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_collapse() {
        for name in ["home", "work", "trusted", "internal"] {
            assert_eq!(Zone::from_name(name).bucket(), ZoneBucket::Trusted, "{}", name);
        }
        for name in ["public", "block", "drop", "external", "dmz", "mycustom"] {
            assert_eq!(Zone::from_name(name).bucket(), ZoneBucket::Untrusted, "{}", name);
        }
    }

    #[test]
    fn test_bucket_roundtrip_through_store_value() {
        assert_eq!(ZoneBucket::parse(ZoneBucket::Trusted.as_str()), Some(ZoneBucket::Trusted));
        assert_eq!(ZoneBucket::parse("public"), Some(ZoneBucket::Untrusted));
        assert_eq!(ZoneBucket::parse("work"), Some(ZoneBucket::Trusted));
        assert_eq!(ZoneBucket::parse(""), None);
    }

    #[test]
    fn test_custom_zone_name() {
        let zone = Zone::from_name("libvirt");
        assert_eq!(zone, Zone::Other("libvirt".into()));
        assert_eq!(zone.as_str(), "libvirt");
        assert!("two words".parse::<Zone>().is_err());
    }
}
