// Sentinel Center - Quarantine
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Managed storage for infected files.
//!
//! Each item is a payload named `<unix timestamp>_<original name>` made
//! owner-read-only, plus a `<id>.origin` sidecar holding the absolute path
//! it came from.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, TimeZone};
use tracing::{info, warn};

/// Suffix of the sidecar file next to each payload.
pub const SIDECAR_SUFFIX: &str = ".origin";

/// Shown when a sidecar is missing or unreadable.
pub const UNKNOWN_ORIGIN: &str = "<unknown origin>";

/// One quarantined file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineItem {
    pub id: String,
    pub original_path: String,
    pub stored_at: Option<DateTime<Local>>,
}

impl QuarantineItem {
    /// Unix timestamp encoded in the id.
    fn timestamp(&self) -> Option<i64> {
        timestamp_of(&self.id)
    }
}

fn timestamp_of(id: &str) -> Option<i64> {
    id.split_once('_').and_then(|(ts, _)| ts.parse().ok())
}

/// Quarantine directory and its operations.
#[derive(Debug, Clone)]
pub struct QuarantineStore {
    dir: PathBuf,
}

impl QuarantineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn payload_path(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    fn sidecar_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", id, SIDECAR_SUFFIX))
    }

    /// Ids are plain file names inside the store.
    fn valid_id(id: &str) -> bool {
        !id.is_empty()
            && !id.contains('/')
            && id != "."
            && id != ".."
            && !id.ends_with(SIDECAR_SUFFIX)
    }

    /// Move `path` into quarantine.
    pub fn quarantine(&self, path: &Path) -> bool {
        match self.try_quarantine(path) {
            Ok(id) => {
                info!("Quarantined {} as {}", path.display(), id);
                true
            }
            Err(e) => {
                warn!("Failed to quarantine {}: {:#}", path.display(), e);
                false
            }
        }
    }

    fn try_quarantine(&self, path: &Path) -> Result<String> {
        let meta = fs::symlink_metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        if meta.file_type().is_symlink() {
            return Err(anyhow!("{} is a symbolic link", path.display()));
        }
        if !meta.is_file() {
            return Err(anyhow!("{} is not a regular file", path.display()));
        }
        let original = if path.is_absolute() {
            path.to_path_buf()
        } else {
            env::current_dir()
                .context("Failed to resolve current directory")?
                .join(path)
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("{} has no file name", path.display()))?;

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let mut timestamp = Local::now().timestamp();
        let mut id = format!("{}_{}", timestamp, name);
        while self.payload_path(&id).exists() || self.sidecar_path(&id).exists() {
            timestamp += 1;
            id = format!("{}_{}", timestamp, name);
        }

        let payload = self.payload_path(&id);
        move_file(path, &payload)?;

        let sidecar = self.sidecar_path(&id);
        let stored = set_mode(&payload, 0o400).and_then(|()| {
            fs::write(&sidecar, original.to_string_lossy().as_bytes())
                .with_context(|| format!("Failed to write {}", sidecar.display()))
        });
        if let Err(e) = stored {
            // An item without a sidecar cannot be restored; put the file back.
            put_back(&payload, path);
            return Err(e);
        }

        Ok(id)
    }

    /// Quarantine every path, returning how many succeeded.
    pub fn quarantine_all<P: AsRef<Path>>(&self, paths: &[P]) -> usize {
        paths.iter().filter(|p| self.quarantine(p.as_ref())).count()
    }

    /// Quarantined items, newest first.
    pub fn list(&self) -> Vec<QuarantineItem> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {}", self.dir.display(), e);
                }
                return Vec::new();
            }
        };

        let mut items: Vec<QuarantineItem> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !name.ends_with(SIDECAR_SUFFIX))
            .map(|id| {
                let original_path = fs::read_to_string(self.sidecar_path(&id))
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty() && !s.contains('\0'))
                    .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string());
                let stored_at = timestamp_of(&id)
                    .and_then(|ts| Local.timestamp_opt(ts, 0).single());
                QuarantineItem {
                    id,
                    original_path,
                    stored_at,
                }
            })
            .collect();

        items.sort_by(|a, b| {
            b.timestamp()
                .cmp(&a.timestamp())
                .then_with(|| b.id.cmp(&a.id))
        });
        items
    }

    /// Move an item back to where it came from.
    pub fn restore(&self, id: &str) -> bool {
        match self.try_restore(id) {
            Ok(target) => {
                info!("Restored {} to {}", id, target.display());
                true
            }
            Err(e) => {
                warn!("Failed to restore {}: {:#}", id, e);
                false
            }
        }
    }

    fn try_restore(&self, id: &str) -> Result<PathBuf> {
        if !Self::valid_id(id) {
            return Err(anyhow!("invalid quarantine id {:?}", id));
        }
        let payload = self.payload_path(id);
        let sidecar = self.sidecar_path(id);
        if !payload.is_file() {
            return Err(anyhow!("no payload for {}", id));
        }

        let origin = fs::read_to_string(&sidecar)
            .with_context(|| format!("Failed to read {}", sidecar.display()))?;
        let target = PathBuf::from(origin.trim());
        if !target.is_absolute() {
            return Err(anyhow!("sidecar for {} holds no absolute path", id));
        }
        if target.exists() {
            return Err(anyhow!("{} already exists", target.display()));
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        // The item stays listed and restorable until the payload has moved.
        set_mode(&payload, 0o644)?;
        if let Err(e) = move_file(&payload, &target) {
            if let Err(chmod_err) = set_mode(&payload, 0o400) {
                warn!("{:#}", chmod_err);
            }
            return Err(e);
        }

        // A leftover sidecar is never listed; it only reserves the id.
        if let Err(e) = fs::remove_file(&sidecar) {
            warn!("Failed to remove {}: {}", sidecar.display(), e);
        }
        Ok(target)
    }

    /// Delete an item for good.
    pub fn purge(&self, id: &str) -> bool {
        if !Self::valid_id(id) {
            warn!("Refusing to purge invalid id {:?}", id);
            return false;
        }

        let mut ok = true;
        for path in [self.payload_path(id), self.sidecar_path(id)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove {}: {}", path.display(), e);
                    ok = false;
                }
            }
        }
        if ok {
            info!("Purged {}", id);
        }
        ok
    }
}

/// Rename, or copy and delete when crossing filesystems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            fs::copy(from, to).with_context(|| {
                format!(
                    "Failed to move {} to {} (rename: {})",
                    from.display(),
                    to.display(),
                    rename_err
                )
            })?;
            if let Err(e) = fs::remove_file(from) {
                if let Err(cleanup) = fs::remove_file(to) {
                    warn!("Failed to remove partial copy {}: {}", to.display(), cleanup);
                }
                return Err(e).with_context(|| format!("Failed to remove {}", from.display()));
            }
            Ok(())
        }
    }
}

/// Undo a quarantine move after a later step failed.
fn put_back(payload: &Path, original: &Path) {
    if let Err(e) = set_mode(payload, 0o600) {
        warn!("{:#}", e);
    }
    if let Err(e) = move_file(payload, original) {
        warn!(
            "Could not return {} to {}: {:#}",
            payload.display(),
            original.display(),
            e
        );
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to chmod {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
