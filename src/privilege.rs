// Sentinel Center - Command Execution
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Process execution and the privilege gateway.
//!
//! Every external tool this crate drives goes through [`CommandRunner`].
//! Read-only queries use [`CommandRunner::run`]; anything that changes
//! system state goes through [`CommandRunner::run_privileged`], which the
//! production [`SystemRunner`] elevates with `pkexec` so Polkit handles
//! authorization.

use std::env;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, warn};

/// Exit status pkexec reports when the authentication dialog was dismissed.
pub const PKEXEC_DISMISSED: i32 = 126;
/// Exit status pkexec reports when authorization was refused.
pub const PKEXEC_NOT_AUTHORIZED: i32 = 127;

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or -1 when the process was killed by a signal.
    pub code: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(code: i32, stdout: impl Into<String>) -> Self {
        Self {
            code,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Whether the user cancelled or was refused at the Polkit prompt.
    pub fn auth_cancelled(&self) -> bool {
        self.code == PKEXEC_DISMISSED
            || self.code == PKEXEC_NOT_AUTHORIZED
            || self.stderr.contains("dismissed")
    }

    /// Stdout followed by stderr, the way a terminal would show them.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Executes external commands.
pub trait CommandRunner: Send + Sync {
    /// Run an unprivileged command and capture its output.
    fn run(&self, argv: &[&str]) -> Result<CommandOutput>;

    /// Run a command as administrator, optionally feeding `stdin`.
    fn run_privileged(&self, argv: &[&str], stdin: Option<&[u8]>) -> Result<CommandOutput>;

    /// Whether `program` can be found on `PATH`.
    fn program_exists(&self, program: &str) -> bool;
}

/// Runs commands on the host, elevating through `pkexec`.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    elevator: String,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemRunner {
    pub fn new() -> Self {
        Self {
            elevator: "pkexec".to_string(),
        }
    }

    /// Use a different elevation helper, such as `sudo -n`.
    pub fn with_elevator(elevator: &str) -> Self {
        Self {
            elevator: elevator.to_string(),
        }
    }

    fn execute(argv: &[&str], stdin: Option<&[u8]>) -> Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("Empty command line"))?;

        debug!("Executing: {}", argv.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to execute {}", argv.join(" ")))?;

        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input)
                    .with_context(|| format!("Failed to write stdin of {}", program))?;
            }
        }

        let output = child
            .wait_with_output()
            .with_context(|| format!("Failed to wait for {}", program))?;

        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[&str]) -> Result<CommandOutput> {
        Self::execute(argv, None)
    }

    fn run_privileged(&self, argv: &[&str], stdin: Option<&[u8]>) -> Result<CommandOutput> {
        let mut full: Vec<&str> = self.elevator.split_whitespace().collect();
        full.extend_from_slice(argv);

        let output = Self::execute(&full, stdin)?;
        if output.auth_cancelled() {
            warn!("Authorization cancelled for: {}", argv.join(" "));
        }
        Ok(output)
    }

    fn program_exists(&self, program: &str) -> bool {
        find_in_path(program).is_some()
    }
}

/// Locate an executable on `PATH`, including the sbin directories that are
/// often missing from a desktop user's `PATH`.
pub fn find_in_path(program: &str) -> Option<std::path::PathBuf> {
    if program.contains('/') {
        let path = Path::new(program);
        return path.is_file().then(|| path.to_path_buf());
    }

    let mut dirs: Vec<std::path::PathBuf> = env::var_os("PATH")
        .map(|p| env::split_paths(&p).collect())
        .unwrap_or_default();
    for extra in ["/usr/sbin", "/sbin", "/usr/local/sbin"] {
        let extra = std::path::PathBuf::from(extra);
        if !dirs.contains(&extra) {
            dirs.push(extra);
        }
    }

    dirs.into_iter()
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
