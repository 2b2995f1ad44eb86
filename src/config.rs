// Sentinel Center - Configuration
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Application settings loaded from a local JSON file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::CONFIG_DIR_NAME;

/// Tunables for the orchestration engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Seconds between two network identity polls.
    #[serde(default = "default_poll_secs")]
    pub zone_poll_secs: u64,
    /// Directory the on-access guard watches.
    #[serde(default = "default_watch_path")]
    pub on_access_watch_path: PathBuf,
    /// How many times to probe for the clamd control socket.
    #[serde(default = "default_ready_attempts")]
    pub daemon_ready_attempts: u32,
    /// Milliseconds between two socket probes.
    #[serde(default = "default_ready_interval_ms")]
    pub daemon_ready_interval_ms: u64,
    /// Managed quarantine storage.
    #[serde(default = "default_quarantine_dir")]
    pub quarantine_dir: PathBuf,
    /// Where clamd's control socket may appear, per distribution.
    #[serde(default = "default_socket_paths")]
    pub clamd_socket_paths: Vec<PathBuf>,
    /// Where clamd's configuration may live, per distribution.
    #[serde(default = "default_clamd_conf_paths")]
    pub clamd_conf_paths: Vec<PathBuf>,
    /// ufw's own configuration, read to decide whether it is enabled.
    #[serde(default = "default_ufw_conf")]
    pub ufw_conf_path: PathBuf,
    /// OS identification file used for package manager selection.
    #[serde(default = "default_os_release")]
    pub os_release_path: PathBuf,
}

fn default_poll_secs() -> u64 { 5 }
fn default_watch_path() -> PathBuf { PathBuf::from("/home") }
fn default_ready_attempts() -> u32 { 30 }
fn default_ready_interval_ms() -> u64 { 1000 }
fn default_ufw_conf() -> PathBuf { PathBuf::from("/etc/ufw/ufw.conf") }
fn default_os_release() -> PathBuf { PathBuf::from("/etc/os-release") }

fn default_quarantine_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
        .join("quarantine")
}

fn default_socket_paths() -> Vec<PathBuf> {
    [
        "/run/clamav/clamd.ctl",
        "/var/run/clamav/clamd.ctl",
        "/run/clamd.scan/clamd.sock",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

fn default_clamd_conf_paths() -> Vec<PathBuf> {
    [
        "/etc/clamav/clamd.conf",
        "/etc/clamd.d/scan.conf",
        "/etc/clamd.conf",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            zone_poll_secs: default_poll_secs(),
            on_access_watch_path: default_watch_path(),
            daemon_ready_attempts: default_ready_attempts(),
            daemon_ready_interval_ms: default_ready_interval_ms(),
            quarantine_dir: default_quarantine_dir(),
            clamd_socket_paths: default_socket_paths(),
            clamd_conf_paths: default_clamd_conf_paths(),
            ufw_conf_path: default_ufw_conf(),
            os_release_path: default_os_release(),
        }
    }
}

impl AppSettings {
    pub fn zone_poll_interval(&self) -> Duration {
        Duration::from_secs(self.zone_poll_secs.max(1))
    }

    pub fn daemon_ready_interval(&self) -> Duration {
        Duration::from_millis(self.daemon_ready_interval_ms)
    }
}

/// Settings manager that persists to a JSON file.
#[derive(Debug)]
pub struct Settings {
    settings: AppSettings,
    path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// Load settings from the per-user configuration directory.
    pub fn new() -> Self {
        let path = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME)
            .join("settings.json");
        Self::load_from(path)
    }

    /// Load settings from an explicit file, falling back to defaults.
    pub fn load_from(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let settings = if path.exists() {
            match fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("Failed to parse settings: {}", e);
                        AppSettings::default()
                    }
                },
                Err(e) => {
                    warn!("Failed to read settings: {}", e);
                    AppSettings::default()
                }
            }
        } else {
            AppSettings::default()
        };

        Self { settings, path }
    }

    /// Save settings to disk.
    pub fn save(&self) {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        match serde_json::to_string_pretty(&self.settings) {
            Ok(content) => {
                if let Err(e) = fs::write(&self.path, content) {
                    warn!("Failed to save settings: {}", e);
                }
            }
            Err(e) => {
                warn!("Failed to serialize settings: {}", e);
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> &AppSettings {
        &self.settings
    }

    /// Change the on-access watch path.
    pub fn set_on_access_watch_path(&mut self, path: impl Into<PathBuf>) {
        self.settings.on_access_watch_path = path.into();
        self.save();
    }

    /// Change the zone poll interval.
    pub fn set_zone_poll_secs(&mut self, secs: u64) {
        self.settings.zone_poll_secs = secs;
        self.save();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_from(dir.path().join("settings.json"));
        assert_eq!(settings.get().zone_poll_secs, 5);
        assert_eq!(settings.get().daemon_ready_attempts, 30);
        assert_eq!(settings.get().zone_poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "zone_poll_secs": 12 }"#).unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.get().zone_poll_secs, 12);
        assert_eq!(settings.get().on_access_watch_path, PathBuf::from("/home"));
        assert_eq!(settings.get().clamd_socket_paths.len(), 3);
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.get().zone_poll_secs, 5);
    }

    #[test]
    fn test_setter_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::load_from(&path);
        settings.set_zone_poll_secs(30);

        let reloaded = Settings::load_from(&path);
        assert_eq!(reloaded.get().zone_poll_secs, 30);
    }
}
