// Sentinel Center - Storage
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Flat key/value store persisted as JSON.
//!
//! Holds rule labels (`IN:80/tcp`), the network → zone bucket mapping
//! (`network:<name>`) and version markers. Every mutation is a
//! read-modify-write under one lock followed by an atomic file replace.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use tracing::warn;

use crate::models::{RuleKey, ZoneBucket};
use crate::CONFIG_DIR_NAME;

const NETWORK_PREFIX: &str = "network:";

#[derive(Debug, Default)]
struct StoreState {
    data: BTreeMap<String, String>,
    loaded: bool,
}

/// Persistent key/value configuration store.
#[derive(Debug)]
pub struct ConfigStore {
    state: Mutex<StoreState>,
    path: PathBuf,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    /// Store in the per-user configuration directory.
    pub fn new() -> Self {
        let path = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME)
            .join("store.json");
        Self::at(path)
    }

    /// Store backed by an explicit file. Nothing is read until first use.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !state.loaded {
            state.data = self.load();
            state.loaded = true;
        }
        state
    }

    fn load(&self) -> BTreeMap<String, String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Failed to parse config store {}: {}", self.path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        }
    }

    fn persist(&self, data: &BTreeMap<String, String>) -> Result<()> {
        #[cfg(unix)]
        use std::os::unix::fs::PermissionsExt;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(data).context("Failed to serialize store")?;
        let temp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&temp_path)
                .with_context(|| format!("Failed to create {}", temp_path.display()))?;
            #[cfg(unix)]
            {
                if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
                    warn!("Failed to set file permissions: {}", e);
                }
            }
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Apply `f` to the map and persist the result. Returns false if the
    /// write failed; the in-memory change is rolled back in that case.
    fn mutate<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let mut state = self.lock();
        let before = state.data.clone();
        if !f(&mut state.data) {
            return true;
        }
        match self.persist(&state.data) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to save config store: {:#}", e);
                state.data = before;
                false
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().data.get(key).cloned()
    }

    pub fn set(&self, key: &str, value: &str) -> bool {
        self.mutate(|data| {
            if data.get(key).map(String::as_str) == Some(value) {
                return false;
            }
            data.insert(key.to_string(), value.to_string());
            true
        })
    }

    pub fn remove(&self, key: &str) -> bool {
        self.mutate(|data| data.remove(key).is_some())
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().data.keys().cloned().collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // RULE LABELS
    // ═══════════════════════════════════════════════════════════════════════

    /// User label for a rule, empty when none was set.
    pub fn rule_label(&self, key: &RuleKey) -> String {
        self.get(&key.to_string()).unwrap_or_default()
    }

    /// Save a label. An empty label clears it.
    pub fn set_rule_label(&self, key: &RuleKey, label: &str) -> bool {
        let label = label.trim();
        if label.is_empty() {
            return self.delete_rule_label(key);
        }
        self.set(&key.to_string(), label)
    }

    pub fn delete_rule_label(&self, key: &RuleKey) -> bool {
        self.remove(&key.to_string())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // KNOWN NETWORKS
    // ═══════════════════════════════════════════════════════════════════════

    /// Bucket previously chosen for a network, if it was ever asked about.
    pub fn network_bucket(&self, network: &str) -> Option<ZoneBucket> {
        self.get(&format!("{}{}", NETWORK_PREFIX, network))
            .and_then(|value| ZoneBucket::parse(&value))
    }

    pub fn set_network_bucket(&self, network: &str, bucket: ZoneBucket) -> bool {
        self.set(&format!("{}{}", NETWORK_PREFIX, network), bucket.as_str())
    }

    pub fn forget_network(&self, network: &str) -> bool {
        self.remove(&format!("{}{}", NETWORK_PREFIX, network))
    }

    /// All remembered networks and their buckets.
    pub fn known_networks(&self) -> Vec<(String, ZoneBucket)> {
        self.lock()
            .data
            .iter()
            .filter_map(|(key, value)| {
                let name = key.strip_prefix(NETWORK_PREFIX)?;
                Some((name.to_string(), ZoneBucket::parse(value)?))
            })
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // VERSION MARKERS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn version_marker(&self, key: &str) -> u32 {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
    }

    pub fn set_version_marker(&self, key: &str, version: u32) -> bool {
        self.set(key, &version.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, Protocol};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ConfigStore {
        ConfigStore::at(dir.path().join("store.json"))
    }

    #[test]
    fn test_set_get_persists() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        assert!(s.set("theme", "dark"));
        assert_eq!(s.get("theme").as_deref(), Some("dark"));

        let reopened = store(&dir);
        assert_eq!(reopened.get("theme").as_deref(), Some("dark"));
    }

    #[test]
    fn test_label_delete_then_readd_has_no_stale_label() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);

        for direction in [Direction::Inbound, Direction::Outbound] {
            for protocol in [Protocol::Tcp, Protocol::Udp] {
                for port in [1u16, 80, 65535] {
                    let key = RuleKey::new(direction, port, protocol);
                    assert!(s.set_rule_label(&key, "web server"));
                    assert_eq!(s.rule_label(&key), "web server");

                    assert!(s.delete_rule_label(&key));
                    assert_eq!(s.rule_label(&key), "");
                }
            }
        }
        assert!(s.keys().is_empty());
    }

    #[test]
    fn test_labels_are_per_direction() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let inbound = RuleKey::new(Direction::Inbound, 80, Protocol::Tcp);
        let outbound = RuleKey::new(Direction::Outbound, 80, Protocol::Tcp);

        s.set_rule_label(&inbound, "nginx");
        assert_eq!(s.rule_label(&outbound), "");
        assert_eq!(s.get("IN:80/tcp").as_deref(), Some("nginx"));
    }

    #[test]
    fn test_empty_label_clears() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let key = RuleKey::new(Direction::Inbound, 22, Protocol::Tcp);
        s.set_rule_label(&key, "ssh");
        s.set_rule_label(&key, "   ");
        assert_eq!(s.rule_label(&key), "");
    }

    #[test]
    fn test_network_buckets() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        assert_eq!(s.network_bucket("HomeWifi"), None);

        s.set_network_bucket("HomeWifi", ZoneBucket::Trusted);
        s.set_network_bucket("Airport Free", ZoneBucket::Untrusted);
        assert_eq!(s.network_bucket("HomeWifi"), Some(ZoneBucket::Trusted));

        let mut known = s.known_networks();
        known.sort();
        assert_eq!(
            known,
            vec![
                ("Airport Free".to_string(), ZoneBucket::Untrusted),
                ("HomeWifi".to_string(), ZoneBucket::Trusted),
            ]
        );
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("store.json"), "garbage").unwrap();
        let s = store(&dir);
        assert_eq!(s.get("anything"), None);
        assert_eq!(s.version_marker("polkit_rule_version"), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_store_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.set_version_marker("polkit_rule_version", 2);
        let mode = fs::metadata(s.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
