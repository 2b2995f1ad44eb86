// Sentinel Center - firewalld Driver
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Zone-based backend driven through `firewall-cmd`.
//!
//! Reads run unprivileged against the runtime configuration. Writes go to
//! the permanent configuration and are followed by `--reload`.

use std::sync::Arc;

use tracing::{debug, info};

use super::{elevate, query, BackendKind, FirewallBackend};
use crate::error::{BackendError, BackendResult};
use crate::models::{
    parse_port_proto, Direction, OutboundTarget, PortOp, Protocol, Rule, RuleAction,
    ServiceEntry, ServiceMode, Zone,
};
use crate::privilege::CommandRunner;
use crate::systemd::{ServiceManager, UnitAction};

const FIREWALL_CMD: &str = "firewall-cmd";
const UNIT: &str = "firewalld.service";

/// firewalld driver.
pub struct Firewalld {
    runner: Arc<dyn CommandRunner>,
    services: Arc<dyn ServiceManager>,
}

impl Firewalld {
    pub fn new(runner: Arc<dyn CommandRunner>, services: Arc<dyn ServiceManager>) -> Self {
        Self { runner, services }
    }

    fn read(&self, args: &[&str]) -> BackendResult<String> {
        let mut argv = vec![FIREWALL_CMD];
        argv.extend_from_slice(args);
        query(self.runner.as_ref(), &argv)
    }

    /// Apply a permanent change, then reload so it takes effect.
    fn write_permanent(&self, args: &[&str]) -> BackendResult<()> {
        let mut argv = vec![FIREWALL_CMD, "--permanent"];
        argv.extend_from_slice(args);
        elevate(self.runner.as_ref(), &argv)?;
        elevate(self.runner.as_ref(), &[FIREWALL_CMD, "--reload"])?;
        Ok(())
    }

    /// Existing verdict for an outbound rule, so removal matches what was added.
    fn outbound_target_of(&self, port: u16, protocol: Protocol) -> Option<OutboundTarget> {
        let rules = self.list_rules(Direction::Outbound).ok()?;
        rules
            .into_iter()
            .find(|r| r.port == port && r.protocol == protocol)
            .map(|r| match r.action {
                RuleAction::Reject => OutboundTarget::Reject,
                _ => OutboundTarget::Drop,
            })
    }
}

impl FirewallBackend for Firewalld {
    fn kind(&self) -> BackendKind {
        BackendKind::ZoneDaemon
    }

    fn is_installed(&self) -> bool {
        self.runner.program_exists(FIREWALL_CMD)
    }

    fn is_active(&self) -> bool {
        self.services.is_active(UNIT)
    }

    fn set_enabled(&self, enable: bool) -> BackendResult<()> {
        let action = if enable { UnitAction::EnableNow } else { UnitAction::DisableNow };
        if self.services.control(action, &[UNIT]) {
            Ok(())
        } else {
            Err(BackendError::CommandFailed {
                command: format!("systemctl {} {}", action.args().join(" "), UNIT),
                code: 1,
                output: String::new(),
            })
        }
    }

    fn list_rules(&self, direction: Direction) -> BackendResult<Vec<Rule>> {
        match direction {
            Direction::Inbound => Ok(parse_port_list(&self.read(&["--list-ports"])?)),
            Direction::Outbound => Ok(parse_direct_rules(
                &self.read(&["--permanent", "--direct", "--get-all-rules"])?,
            )),
        }
    }

    fn manage_port(
        &self,
        op: PortOp,
        port: u16,
        protocol: Protocol,
        direction: Direction,
        target: OutboundTarget,
    ) -> BackendResult<()> {
        match direction {
            Direction::Inbound => {
                let flag = match op {
                    PortOp::Add => "--add-port",
                    PortOp::Remove => "--remove-port",
                };
                let arg = format!("{}={}/{}", flag, port, protocol);
                self.write_permanent(&[&arg])?;
            }
            Direction::Outbound => {
                let (flag, target) = match op {
                    PortOp::Add => ("--add-rule", target),
                    PortOp::Remove => (
                        "--remove-rule",
                        self.outbound_target_of(port, protocol).unwrap_or(target),
                    ),
                };
                let port_str = port.to_string();
                self.write_permanent(&[
                    "--direct",
                    flag,
                    "ipv4",
                    "filter",
                    "OUTPUT",
                    "0",
                    "-p",
                    protocol.as_str(),
                    "--dport",
                    &port_str,
                    "-j",
                    target.as_target(),
                ])?;
            }
        }
        info!("firewalld: {:?} {:?} {}/{}", op, direction, port, protocol);
        Ok(())
    }

    fn services(&self, mode: ServiceMode) -> BackendResult<Vec<ServiceEntry>> {
        let names = match mode {
            ServiceMode::Allow => parse_word_list(&self.read(&["--list-services"])?),
            ServiceMode::Block => parse_blocked_services(&self.read(&["--list-rich-rules"])?),
        };
        Ok(names.iter().map(|n| ServiceEntry::new(n, mode)).collect())
    }

    fn available_services(&self) -> BackendResult<Vec<String>> {
        Ok(parse_word_list(&self.read(&["--get-services"])?))
    }

    fn manage_service(&self, op: PortOp, name: &str, mode: ServiceMode) -> BackendResult<()> {
        let arg = match (mode, op) {
            (ServiceMode::Allow, PortOp::Add) => format!("--add-service={}", name),
            (ServiceMode::Allow, PortOp::Remove) => format!("--remove-service={}", name),
            (ServiceMode::Block, PortOp::Add) => format!("--add-rich-rule={}", block_rule(name)),
            (ServiceMode::Block, PortOp::Remove) => {
                format!("--remove-rich-rule={}", block_rule(name))
            }
        };
        self.write_permanent(&[&arg])?;
        info!("firewalld: {:?} service {} ({:?})", op, name, mode);
        Ok(())
    }

    fn supports_zones(&self) -> bool {
        true
    }

    fn active_zone(&self) -> BackendResult<Zone> {
        let out = self.read(&["--get-default-zone"])?;
        let name = out.trim();
        if name.is_empty() {
            return Err(BackendError::Parse {
                backend: "firewalld",
                detail: "empty default zone".into(),
            });
        }
        Ok(Zone::from_name(name))
    }

    fn set_active_zone(&self, zone: &Zone) -> BackendResult<()> {
        let arg = format!("--set-default-zone={}", zone);
        elevate(self.runner.as_ref(), &[FIREWALL_CMD, &arg])?;
        info!("firewalld: default zone set to {}", zone);
        Ok(())
    }
}

/// Rich rule that rejects a service.
fn block_rule(name: &str) -> String {
    format!("rule service name=\"{}\" reject", name)
}

fn parse_word_list(output: &str) -> Vec<String> {
    output.split_whitespace().map(str::to_string).collect()
}

/// `--list-ports` output: `80/tcp 443/tcp 53/udp`.
pub(crate) fn parse_port_list(output: &str) -> Vec<Rule> {
    output
        .split_whitespace()
        .filter_map(|entry| match parse_port_proto(entry) {
            Some((port, protocol)) => Some(
                Rule::new(port, protocol, Direction::Inbound, RuleAction::Allow)
                    .with_source("Anywhere"),
            ),
            None => {
                debug!("Skipping port entry {}", entry);
                None
            }
        })
        .collect()
}

/// `--direct --get-all-rules` output, one rule per line:
/// `ipv4 filter OUTPUT 0 -p tcp --dport 25 -j DROP`.
pub(crate) fn parse_direct_rules(output: &str) -> Vec<Rule> {
    let mut rules = Vec::new();

    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 4 || tokens[2] != "OUTPUT" {
            continue;
        }

        let value_after = |flag: &str| {
            tokens
                .iter()
                .position(|t| *t == flag)
                .and_then(|i| tokens.get(i + 1))
                .copied()
        };

        let protocol = value_after("-p").and_then(|p| p.parse::<Protocol>().ok());
        let port = value_after("--dport").and_then(|p| p.parse::<u16>().ok());
        let action = match value_after("-j") {
            Some("DROP") => Some(RuleAction::Drop),
            Some("REJECT") => Some(RuleAction::Reject),
            _ => None,
        };

        match (protocol, port, action) {
            (Some(protocol), Some(port), Some(action)) if port != 0 => {
                rules.push(
                    Rule::new(port, protocol, Direction::Outbound, action)
                        .with_source(tokens[0]),
                );
            }
            _ => debug!("Skipping direct rule {}", line),
        }
    }

    rules
}

/// Service names blocked by rich rules such as
/// `rule service name="telnet" reject`.
pub(crate) fn parse_blocked_services(output: &str) -> Vec<String> {
    const MARKER: &str = "service name=\"";

    let mut names = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if !(line.ends_with(" reject") || line.ends_with(" drop")) {
            continue;
        }
        let Some(start) = line.find(MARKER) else {
            continue;
        };
        let rest = &line[start + MARKER.len()..];
        if let Some(end) = rest.find('"') {
            let name = rest[..end].to_string();
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}
