// Sentinel Center - Platform Detection
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Distribution family detection and package manager command lines.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::firewall::BackendKind;

/// Distribution families that share a package manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistroFamily {
    Arch,
    Debian,
    RedHat,
    Suse,
    Unknown,
}

impl DistroFamily {
    /// Read and classify an os-release file. Unreadable means unknown.
    pub fn detect(os_release: &Path) -> Self {
        match fs::read_to_string(os_release) {
            Ok(content) => Self::from_os_release(&content),
            Err(e) => {
                warn!("Failed to read {}: {}", os_release.display(), e);
                Self::Unknown
            }
        }
    }

    /// Classify os-release content by its `ID` and `ID_LIKE` tokens.
    pub fn from_os_release(content: &str) -> Self {
        let mut tokens = Vec::new();
        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if matches!(key.trim(), "ID" | "ID_LIKE") {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                tokens.extend(value.split_whitespace().map(str::to_ascii_lowercase));
            }
        }

        let family = tokens
            .iter()
            .map(|token| Self::from_token(token))
            .find(|family| *family != Self::Unknown)
            .unwrap_or(Self::Unknown);

        debug!("Distribution tokens {:?} -> {:?}", tokens, family);
        family
    }

    fn from_token(token: &str) -> Self {
        match token {
            "arch" | "manjaro" | "endeavouros" => Self::Arch,
            "debian" | "ubuntu" | "linuxmint" | "mint" | "pop" => Self::Debian,
            "fedora" | "rhel" | "centos" | "rocky" | "almalinux" => Self::RedHat,
            t if t.contains("suse") => Self::Suse,
            _ => Self::Unknown,
        }
    }

    /// Non-interactive install command line for `packages`.
    pub fn install_command(&self, packages: &[&str]) -> Option<Vec<String>> {
        let prefix: &[&str] = match self {
            Self::Arch => &["pacman", "-S", "--noconfirm"],
            Self::Debian => &["apt", "install", "-y"],
            Self::RedHat => &["dnf", "install", "-y"],
            Self::Suse => &["zypper", "install", "-n"],
            Self::Unknown => return None,
        };
        Some(
            prefix
                .iter()
                .chain(packages.iter())
                .map(|s| s.to_string())
                .collect(),
        )
    }

    /// Packages providing the scanner, updater and daemon.
    pub fn antivirus_packages(&self) -> &'static [&'static str] {
        match self {
            Self::Debian => &["clamav", "clamav-daemon"],
            Self::RedHat => &["clamav", "clamav-update"],
            _ => &["clamav"],
        }
    }

    /// Package name for a firewall backend.
    pub fn firewall_package(kind: BackendKind) -> Option<&'static str> {
        match kind {
            BackendKind::ZoneDaemon => Some("firewalld"),
            BackendKind::ListDaemon => Some("ufw"),
            BackendKind::None => None,
        }
    }

    /// The backend most at home on this family.
    pub fn recommended_backend(&self) -> BackendKind {
        match self {
            Self::Debian => BackendKind::ListDaemon,
            _ => BackendKind::ZoneDaemon,
        }
    }
}
