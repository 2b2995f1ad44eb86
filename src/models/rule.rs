// Sentinel Center - Rule Model
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Backend-neutral firewall port rule.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};

/// Transport protocol of a port rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(anyhow!("Unknown protocol: {}", other)),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Traffic direction a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// Prefix used in label keys.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Self::Inbound => "IN",
            Self::Outbound => "OUT",
        }
    }
}

/// What the firewall does with matching traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleAction {
    Allow,
    Drop,
    Reject,
}

impl RuleAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Drop => "DROP",
            Self::Reject => "REJECT",
        }
    }

    pub fn is_blocking(&self) -> bool {
        !matches!(self, Self::Allow)
    }
}

/// Verdict for an outbound block rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutboundTarget {
    #[default]
    Drop,
    Reject,
}

impl OutboundTarget {
    /// iptables jump target.
    pub fn as_target(&self) -> &'static str {
        match self {
            Self::Drop => "DROP",
            Self::Reject => "REJECT",
        }
    }

    pub fn action(&self) -> RuleAction {
        match self {
            Self::Drop => RuleAction::Drop,
            Self::Reject => RuleAction::Reject,
        }
    }
}

impl FromStr for OutboundTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DROP" | "DENY" => Ok(Self::Drop),
            "REJECT" => Ok(Self::Reject),
            other => Err(anyhow!("Unknown outbound target: {}", other)),
        }
    }
}

/// Add or remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortOp {
    Add,
    Remove,
}

/// Identity of a rule: one label per (direction, port, protocol).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleKey {
    pub direction: Direction,
    pub port: u16,
    pub protocol: Protocol,
}

impl RuleKey {
    pub fn new(direction: Direction, port: u16, protocol: Protocol) -> Self {
        Self { direction, port, protocol }
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.direction.key_prefix(), self.port, self.protocol)
    }
}

/// A firewall port rule as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub port: u16,
    pub protocol: Protocol,
    pub direction: Direction,
    pub action: RuleAction,
    /// Where the backend says the rule comes from ("Anywhere", a zone name, ...).
    pub source_label: String,
}

impl Rule {
    pub fn new(port: u16, protocol: Protocol, direction: Direction, action: RuleAction) -> Self {
        Self {
            port,
            protocol,
            direction,
            action,
            source_label: String::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_label = source.into();
        self
    }

    pub fn key(&self) -> RuleKey {
        RuleKey::new(self.direction, self.port, self.protocol)
    }

    /// Well-known service name for common ports.
    pub fn well_known_service(&self) -> Option<&'static str> {
        match (self.port, self.protocol) {
            (22, Protocol::Tcp) => Some("SSH"),
            (80, Protocol::Tcp) => Some("HTTP"),
            (443, Protocol::Tcp) => Some("HTTPS"),
            (21, Protocol::Tcp) => Some("FTP"),
            (25, Protocol::Tcp) => Some("SMTP"),
            (53, _) => Some("DNS"),
            (67 | 68, Protocol::Udp) => Some("DHCP"),
            (445, Protocol::Tcp) => Some("SMB"),
            (3306, Protocol::Tcp) => Some("MySQL"),
            (5432, Protocol::Tcp) => Some("PostgreSQL"),
            _ => None,
        }
    }
}

/// Parse a `port/proto` pair such as `8080/tcp`.
///
/// Port ranges and bare ports are rejected; callers that need them handle
/// them before calling this.
pub fn parse_port_proto(s: &str) -> Option<(u16, Protocol)> {
    let (port, proto) = s.trim().split_once('/')?;
    let port: u16 = port.parse().ok()?;
    if port == 0 {
        return None;
    }
    Some((port, proto.parse().ok()?))
}

/// Ports 1..=65535 are valid rule targets.
pub fn is_valid_port(port: u16) -> bool {
    port != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_key_format() {
        let key = RuleKey::new(Direction::Inbound, 80, Protocol::Tcp);
        assert_eq!(key.to_string(), "IN:80/tcp");

        let rule = Rule::new(53, Protocol::Udp, Direction::Outbound, RuleAction::Drop);
        assert_eq!(rule.key().to_string(), "OUT:53/udp");
    }

    #[test]
    fn test_parse_port_proto() {
        assert_eq!(parse_port_proto("8080/tcp"), Some((8080, Protocol::Tcp)));
        assert_eq!(parse_port_proto(" 53/UDP "), Some((53, Protocol::Udp)));
        assert_eq!(parse_port_proto("1025-65535/tcp"), None);
        assert_eq!(parse_port_proto("0/tcp"), None);
        assert_eq!(parse_port_proto("80/sctp"), None);
        assert_eq!(parse_port_proto("80"), None);
    }

    #[test]
    fn test_outbound_target_parse() {
        assert_eq!("DROP".parse::<OutboundTarget>().unwrap(), OutboundTarget::Drop);
        assert_eq!("deny".parse::<OutboundTarget>().unwrap(), OutboundTarget::Drop);
        assert_eq!("reject".parse::<OutboundTarget>().unwrap(), OutboundTarget::Reject);
        assert!("ALLOW".parse::<OutboundTarget>().is_err());
    }
}
