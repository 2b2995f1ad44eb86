// Sentinel Center - Systemd Module
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Unit state queries and control.

mod client;

pub use client::SystemdClient;

/// A `systemctl` verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitAction {
    Start,
    Stop,
    Restart,
    Enable,
    Disable,
    EnableNow,
    DisableNow,
    Unmask,
}

impl UnitAction {
    /// Arguments placed after `systemctl`.
    pub fn args(&self) -> &'static [&'static str] {
        match self {
            Self::Start => &["start"],
            Self::Stop => &["stop"],
            Self::Restart => &["restart"],
            Self::Enable => &["enable"],
            Self::Disable => &["disable"],
            Self::EnableNow => &["enable", "--now"],
            Self::DisableNow => &["disable", "--now"],
            Self::Unmask => &["unmask"],
        }
    }
}

/// Reads unit state and changes it.
pub trait ServiceManager: Send + Sync {
    /// Whether the unit's `ActiveState` is `active`.
    fn is_active(&self, unit: &str) -> bool;

    /// Apply `action` to all `units` in one call. True on success.
    fn control(&self, action: UnitAction, units: &[&str]) -> bool;
}
