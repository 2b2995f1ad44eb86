// Sentinel Center - Firewall Module
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Firewall backends and the facade that selects between them.
//!
//! Two drivers implement [`FirewallBackend`]: [`Firewalld`] (zone based,
//! driven through `firewall-cmd`) and [`Ufw`] (a flat rule list). The
//! [`FirewallFacade`] detects which one is present and forwards to it.

mod facade;
mod firewalld;
mod ufw;

pub use facade::{FirewallFacade, LabeledRule};
pub use firewalld::Firewalld;
pub use ufw::Ufw;

use std::fmt;

use crate::error::{BackendError, BackendResult};
use crate::models::{Direction, OutboundTarget, PortOp, Protocol, Rule, ServiceEntry, ServiceMode, Zone};
use crate::privilege::{CommandOutput, CommandRunner};

/// Which backend is in charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendKind {
    #[default]
    None,
    /// firewalld.
    ZoneDaemon,
    /// ufw.
    ListDaemon,
}

impl BackendKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ZoneDaemon => "firewalld",
            Self::ListDaemon => "ufw",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Result of a detection pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FirewallStatus {
    pub kind: BackendKind,
    pub active: bool,
    pub details: String,
}

/// Operations every firewall backend provides.
pub trait FirewallBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn name(&self) -> &'static str {
        self.kind().display_name()
    }

    /// Whether the backend's tooling is present.
    fn is_installed(&self) -> bool;

    /// Whether the backend is currently filtering.
    fn is_active(&self) -> bool;

    /// Start or stop the backend and make the change persistent.
    fn set_enabled(&self, enable: bool) -> BackendResult<()>;

    /// Port rules in one direction.
    fn list_rules(&self, direction: Direction) -> BackendResult<Vec<Rule>>;

    /// Add or remove a port rule. `target` only matters for outbound adds.
    fn manage_port(
        &self,
        op: PortOp,
        port: u16,
        protocol: Protocol,
        direction: Direction,
        target: OutboundTarget,
    ) -> BackendResult<()>;

    /// Services on the allow or block list.
    fn services(&self, mode: ServiceMode) -> BackendResult<Vec<ServiceEntry>>;

    /// Every service name the backend knows about.
    fn available_services(&self) -> BackendResult<Vec<String>>;

    fn manage_service(&self, op: PortOp, name: &str, mode: ServiceMode) -> BackendResult<()>;

    fn supports_zones(&self) -> bool;

    fn active_zone(&self) -> BackendResult<Zone>;

    fn set_active_zone(&self, zone: &Zone) -> BackendResult<()>;
}

/// Turn a finished command into a result.
fn check(argv: &[&str], output: CommandOutput) -> BackendResult<CommandOutput> {
    if output.success() {
        Ok(output)
    } else {
        Err(BackendError::CommandFailed {
            command: argv.join(" "),
            code: output.code,
            output: output.combined().trim().to_string(),
        })
    }
}

/// Run an unprivileged query.
fn query(runner: &dyn CommandRunner, argv: &[&str]) -> BackendResult<String> {
    let output = runner.run(argv)?;
    Ok(check(argv, output)?.stdout)
}

/// Run a privileged command.
fn elevate(runner: &dyn CommandRunner, argv: &[&str]) -> BackendResult<String> {
    let output = runner.run_privileged(argv, None)?;
    Ok(check(argv, output)?.stdout)
}
