// Sentinel Center - clamd Configuration
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Rewrites the on-access section of `clamd.conf`.
//!
//! Every active `OnAccess*` directive is owned by us: disabling removes
//! them, enabling replaces them with one block. Comments and all other
//! directives are left as they are.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::privilege::CommandRunner;

const MARKER: &str = "# On-access scanning (managed by Sentinel Center)";

fn is_on_access_directive(line: &str) -> bool {
    line.trim_start()
        .split_whitespace()
        .next()
        .map(|word| word.starts_with("OnAccess"))
        .unwrap_or(false)
}

fn strip_managed(content: &str) -> Vec<&str> {
    content
        .lines()
        .filter(|line| line.trim() != MARKER && !is_on_access_directive(line))
        .collect()
}

fn join(lines: Vec<&str>, extra: Option<String>) -> String {
    let mut out: Vec<String> = lines.into_iter().map(str::to_string).collect();
    while out.last().map(|l| l.trim().is_empty()).unwrap_or(false) {
        out.pop();
    }
    if let Some(extra) = extra {
        out.push(String::new());
        out.push(extra);
    }
    let mut text = out.join("\n");
    text.push('\n');
    text
}

/// Content with on-access scanning of `watch_path`.
pub fn enable_on_access(content: &str, watch_path: &Path) -> String {
    let block = format!(
        "{}\nOnAccessIncludePath {}\nOnAccessExcludeRootUID yes\nOnAccessPrevention no",
        MARKER,
        watch_path.display()
    );
    join(strip_managed(content), Some(block))
}

/// Content with every on-access directive removed.
pub fn disable_on_access(content: &str) -> String {
    join(strip_managed(content), None)
}

/// Whether any on-access include path is configured.
pub fn has_on_access(content: &str) -> bool {
    content
        .lines()
        .any(|line| line.trim_start().starts_with("OnAccessIncludePath"))
}

/// First existing configuration file among `candidates`.
pub fn locate(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}

/// Read, transform and write back `path` with administrator rights.
pub fn rewrite(
    runner: &dyn CommandRunner,
    path: &Path,
    transform: impl FnOnce(&str) -> String,
) -> Result<()> {
    let current = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let updated = transform(&current);
    if updated == current {
        return Ok(());
    }

    let path_str = path.to_string_lossy();
    let out = runner.run_privileged(&["tee", path_str.as_ref()], Some(updated.as_bytes()))?;
    if !out.success() {
        return Err(anyhow!(
            "Writing {} failed with status {}: {}",
            path.display(),
            out.code,
            out.stderr.trim()
        ));
    }
    info!("Updated {}", path.display());
    Ok(())
}
