// Sentinel Center - Library Root
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Security backend orchestration for Linux desktops.
//!
//! Drives firewalld or ufw behind one rule and zone model, moves the
//! firewall zone with the active network, and runs ClamAV scans, its
//! on-access guard and a local quarantine.

pub mod antivirus;
pub mod config;
pub mod error;
pub mod firewall;
pub mod models;
pub mod network;
pub mod platform;
pub mod polkit;
pub mod privilege;
pub mod storage;
pub mod systemd;

#[cfg(test)]
mod testing;

/// Application identifier.
pub const APP_ID: &str = "com.chrisdaggas.sentinel-center";

/// Directory name under the user's config dir.
pub const CONFIG_DIR_NAME: &str = "sentinel-center";
