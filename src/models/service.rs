// Sentinel Center - Service Model
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Application/service entries on the firewall allow and block lists.

/// Which list a service entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceMode {
    Allow,
    Block,
}

/// A named service (firewalld service or ufw application profile).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub name: String,
    pub mode: ServiceMode,
}

impl ServiceEntry {
    pub fn new(name: &str, mode: ServiceMode) -> Self {
        Self {
            name: name.to_string(),
            mode,
        }
    }

    /// Get the risk level of exposing the service.
    pub fn risk_level(&self) -> &'static str {
        match self.name.to_ascii_lowercase().as_str() {
            "ssh" | "openssh" | "cockpit" | "vnc-server" => "medium",
            "ftp" | "telnet" | "rsh" | "rlogin" => "high",
            _ => "low",
        }
    }

    /// Get a human-readable description.
    pub fn human_description(&self) -> &'static str {
        match self.name.to_ascii_lowercase().as_str() {
            "ssh" | "openssh" => "Secure Shell remote access",
            "http" => "Web server (unencrypted)",
            "https" => "Web server (encrypted)",
            "dns" => "Domain Name System",
            "dhcp" | "dhcpv6-client" => "Dynamic Host Configuration Protocol",
            "ftp" => "File Transfer Protocol",
            "smtp" => "Email sending",
            "imap" | "imaps" => "Email retrieval",
            "samba" | "samba-client" => "Windows file sharing",
            "nfs" => "Network File System",
            "cockpit" => "Web-based server management",
            "mdns" => "Multicast DNS service discovery",
            "cups" | "ipp" => "Printing",
            _ => "Network service",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptions_ignore_case() {
        let entry = ServiceEntry::new("OpenSSH", ServiceMode::Allow);
        assert_eq!(entry.human_description(), "Secure Shell remote access");
        assert_eq!(entry.risk_level(), "medium");
        assert_eq!(ServiceEntry::new("telnet", ServiceMode::Block).risk_level(), "high");
    }
}
