// Sentinel Center - ufw Driver
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! List-based backend driven through `ufw`.
//!
//! ufw refuses to run for unprivileged users, so reads go through the
//! privilege gateway as well. ufw has no zones.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{elevate, BackendKind, FirewallBackend};
use crate::error::{BackendError, BackendResult};
use crate::models::{
    parse_port_proto, Direction, OutboundTarget, PortOp, Protocol, Rule, RuleAction,
    ServiceEntry, ServiceMode, Zone,
};
use crate::privilege::CommandRunner;

const UFW: &str = "ufw";

/// One row of the `ufw status` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusRow {
    /// Port (`22/tcp`, `80`) or application profile name.
    pub to: String,
    pub action: RuleAction,
    pub direction: Direction,
    pub from: String,
    /// Interface from an `on <iface>` qualifier.
    pub interface: Option<String>,
}

impl StatusRow {
    fn is_port(&self) -> bool {
        self.to.starts_with(|c: char| c.is_ascii_digit())
    }

    /// Rules for a port row. A bare port covers both protocols.
    fn rules(&self) -> Vec<Rule> {
        let make = |port, protocol| {
            Rule::new(port, protocol, self.direction, self.action).with_source(self.from.clone())
        };

        if let Some(pair) = parse_port_proto(&self.to) {
            return vec![make(pair.0, pair.1)];
        }
        match self.to.parse::<u16>() {
            Ok(port) if port != 0 => vec![make(port, Protocol::Tcp), make(port, Protocol::Udp)],
            _ => {
                debug!("Skipping ufw row target {}", self.to);
                Vec::new()
            }
        }
    }
}

/// ufw driver.
pub struct Ufw {
    runner: Arc<dyn CommandRunner>,
    conf_path: PathBuf,
}

impl Ufw {
    pub fn new(runner: Arc<dyn CommandRunner>, conf_path: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            conf_path: conf_path.into(),
        }
    }

    fn ufw(&self, args: &[&str]) -> BackendResult<String> {
        let mut argv = vec![UFW];
        argv.extend_from_slice(args);
        elevate(self.runner.as_ref(), &argv)
    }

    fn status_rows(&self) -> BackendResult<Vec<StatusRow>> {
        Ok(parse_status(&self.ufw(&["status"])?))
    }

    fn outbound_verb_of(&self, port: u16, protocol: Protocol) -> Option<&'static str> {
        let rows = self.status_rows().ok()?;
        rows.iter()
            .filter(|r| r.direction == Direction::Outbound && r.is_port())
            .flat_map(|r| r.rules())
            .find(|r| r.port == port && r.protocol == protocol)
            .map(|r| action_verb(r.action))
    }
}

fn action_verb(action: RuleAction) -> &'static str {
    match action {
        RuleAction::Allow => "allow",
        RuleAction::Drop => "deny",
        RuleAction::Reject => "reject",
    }
}

impl FirewallBackend for Ufw {
    fn kind(&self) -> BackendKind {
        BackendKind::ListDaemon
    }

    fn is_installed(&self) -> bool {
        self.runner.program_exists(UFW)
    }

    fn is_active(&self) -> bool {
        match fs::read_to_string(&self.conf_path) {
            Ok(content) => conf_enabled(&content),
            Err(e) => {
                debug!("Cannot read {}: {}", self.conf_path.display(), e);
                false
            }
        }
    }

    fn set_enabled(&self, enable: bool) -> BackendResult<()> {
        if enable {
            self.ufw(&["--force", "enable"])?;
        } else {
            self.ufw(&["disable"])?;
        }
        info!("ufw {}", if enable { "enabled" } else { "disabled" });
        Ok(())
    }

    fn list_rules(&self, direction: Direction) -> BackendResult<Vec<Rule>> {
        let mut rules: Vec<Rule> = Vec::new();
        for row in self.status_rows()? {
            if row.direction != direction || !row.is_port() {
                continue;
            }
            for rule in row.rules() {
                if !rules.iter().any(|r| r.key() == rule.key() && r.action == rule.action) {
                    rules.push(rule);
                }
            }
        }
        Ok(rules)
    }

    fn manage_port(
        &self,
        op: PortOp,
        port: u16,
        protocol: Protocol,
        direction: Direction,
        target: OutboundTarget,
    ) -> BackendResult<()> {
        let port_arg = format!("{}/{}", port, protocol);
        let verb = match direction {
            Direction::Inbound => "allow",
            Direction::Outbound => match op {
                PortOp::Add => action_verb(target.action()),
                PortOp::Remove => self
                    .outbound_verb_of(port, protocol)
                    .unwrap_or_else(|| action_verb(target.action())),
            },
        };

        let mut args: Vec<&str> = Vec::with_capacity(4);
        if op == PortOp::Remove {
            args.push("delete");
        }
        args.push(verb);
        if direction == Direction::Outbound {
            args.push("out");
        }
        args.push(&port_arg);

        self.ufw(&args)?;
        info!("ufw: {:?} {:?} {}", op, direction, port_arg);
        Ok(())
    }

    fn services(&self, mode: ServiceMode) -> BackendResult<Vec<ServiceEntry>> {
        let mut entries: Vec<ServiceEntry> = Vec::new();
        for row in self.status_rows()? {
            if row.is_port() || row.direction != Direction::Inbound {
                continue;
            }
            let row_mode = if row.action.is_blocking() {
                ServiceMode::Block
            } else {
                ServiceMode::Allow
            };
            if row_mode == mode && !entries.iter().any(|e| e.name == row.to) {
                entries.push(ServiceEntry::new(&row.to, mode));
            }
        }
        Ok(entries)
    }

    fn available_services(&self) -> BackendResult<Vec<String>> {
        Ok(parse_app_list(&self.ufw(&["app", "list"])?))
    }

    fn manage_service(&self, op: PortOp, name: &str, mode: ServiceMode) -> BackendResult<()> {
        let verb = match mode {
            ServiceMode::Allow => "allow",
            ServiceMode::Block => "deny",
        };
        match op {
            PortOp::Add => self.ufw(&[verb, name])?,
            PortOp::Remove => self.ufw(&["delete", verb, name])?,
        };
        info!("ufw: {:?} app {} ({:?})", op, name, mode);
        Ok(())
    }

    fn supports_zones(&self) -> bool {
        false
    }

    fn active_zone(&self) -> BackendResult<Zone> {
        Err(BackendError::Unsupported { backend: "ufw" })
    }

    fn set_active_zone(&self, _zone: &Zone) -> BackendResult<()> {
        Err(BackendError::Unsupported { backend: "ufw" })
    }
}

/// Whether `/etc/ufw/ufw.conf` says the firewall starts at boot.
pub(crate) fn conf_enabled(content: &str) -> bool {
    content.lines().any(|line| {
        let line = line.trim();
        if line.starts_with('#') {
            return false;
        }
        match line.split_once('=') {
            Some((key, value)) => {
                key.trim() == "ENABLED"
                    && value.trim().trim_matches('"').eq_ignore_ascii_case("yes")
            }
            None => false,
        }
    })
}

/// Parse the rule table printed by `ufw status`.
///
/// ```text
/// Status: active
///
/// To                         Action      From
/// --                         ------      ----
/// 22/tcp                     ALLOW       Anywhere
/// Nginx Full                 ALLOW       Anywhere
/// 25/tcp                     DENY OUT    Anywhere
/// 22/tcp (v6)                ALLOW       Anywhere (v6)
/// ```
pub(crate) fn parse_status(output: &str) -> Vec<StatusRow> {
    let mut rows = Vec::new();
    let mut in_table = false;

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") {
            in_table = true;
            continue;
        }
        if !in_table || trimmed.is_empty() {
            continue;
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        let Some(idx) = tokens
            .iter()
            .position(|t| matches!(*t, "ALLOW" | "DENY" | "REJECT" | "LIMIT"))
        else {
            warn!("Unrecognized ufw status row: {}", trimmed);
            continue;
        };
        if idx == 0 {
            continue;
        }

        let action = match tokens[idx] {
            "DENY" => RuleAction::Drop,
            "REJECT" => RuleAction::Reject,
            _ => RuleAction::Allow,
        };

        let mut from_start = idx + 1;
        let direction = match tokens.get(idx + 1) {
            Some(&"OUT") => {
                from_start += 1;
                Direction::Outbound
            }
            Some(&"IN") => {
                from_start += 1;
                Direction::Inbound
            }
            Some(&"FWD") => continue,
            _ => Direction::Inbound,
        };

        let mut to_tokens: Vec<&str> = tokens[..idx]
            .iter()
            .copied()
            .filter(|t| *t != "(v6)")
            .collect();
        let interface = match to_tokens.iter().position(|t| *t == "on") {
            Some(i) if i > 0 && i + 1 < to_tokens.len() => {
                let iface = to_tokens[i + 1].to_string();
                to_tokens.truncate(i);
                Some(iface)
            }
            _ => None,
        };
        // Source-only rules name no port or application.
        if to_tokens.first() == Some(&"Anywhere") {
            debug!("Skipping source-only ufw row: {}", trimmed);
            continue;
        }
        let from_tokens: Vec<&str> = tokens[from_start.min(tokens.len())..]
            .iter()
            .copied()
            .filter(|t| *t != "(v6)")
            .collect();

        rows.push(StatusRow {
            to: to_tokens.join(" "),
            action,
            direction,
            from: from_tokens.join(" "),
            interface,
        });
    }

    rows
}

/// Parse `ufw app list`.
pub(crate) fn parse_app_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.starts_with(char::is_whitespace))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::CommandOutput;
    use crate::testing::ScriptedRunner;
    use tempfile::TempDir;

    const STATUS: &str = "Status: active

To                         Action      From
--                         ------      ----
22/tcp                     ALLOW       Anywhere
80                         ALLOW       Anywhere
OpenSSH                    ALLOW       Anywhere
Nginx Full                 ALLOW       Anywhere
Telnet                     DENY        Anywhere
8000:8100/tcp              ALLOW       Anywhere
443/tcp                    ALLOW IN    192.168.1.0/24
25/tcp                     DENY OUT    Anywhere
53/udp                     REJECT OUT  Anywhere
22/tcp (v6)                ALLOW       Anywhere (v6)
80 (v6)                    ALLOW       Anywhere (v6)
OpenSSH (v6)               ALLOW       Anywhere (v6)
25/tcp (v6)                DENY OUT    Anywhere (v6)
";

    fn driver(status: &str) -> (Ufw, Arc<ScriptedRunner>) {
        let runner = Arc::new(ScriptedRunner::new().with_program("ufw"));
        runner.respond("ufw status", CommandOutput::new(0, status));
        (Ufw::new(runner.clone(), "/nonexistent/ufw.conf"), runner)
    }

    #[test]
    fn test_parse_status_rows() {
        let rows = parse_status(STATUS);
        assert_eq!(rows.len(), 13);
        assert_eq!(rows[3].to, "Nginx Full");
        assert_eq!(rows[6].from, "192.168.1.0/24");
        assert_eq!(rows[7].direction, Direction::Outbound);
        assert_eq!(rows[8].action, RuleAction::Reject);
        assert_eq!(rows[9].to, "22/tcp");
        assert_eq!(rows[9].from, "Anywhere");
    }

    #[test]
    fn test_parse_status_interface_and_source_only_rows() {
        let status = "Status: active

To                         Action      From
--                         ------      ----
Anywhere                   ALLOW       10.0.0.0/8
22/tcp on eth0             ALLOW       Anywhere
Anywhere on wlan0          DENY        192.168.0.0/16
";
        let rows = parse_status(status);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].to, "22/tcp");
        assert_eq!(rows[0].interface.as_deref(), Some("eth0"));

        let (fw, _) = driver(status);
        let keys: Vec<String> = fw
            .list_rules(Direction::Inbound)
            .unwrap()
            .iter()
            .map(|r| r.key().to_string())
            .collect();
        assert_eq!(keys, vec!["IN:22/tcp"]);
        assert!(fw.services(ServiceMode::Allow).unwrap().is_empty());
        assert!(fw.services(ServiceMode::Block).unwrap().is_empty());
    }

    #[test]
    fn test_inactive_status_has_no_rows() {
        assert!(parse_status("Status: inactive\n").is_empty());
    }

    #[test]
    fn test_inbound_rules_dedupe_v6_and_expand_bare_ports() {
        let (fw, _) = driver(STATUS);
        let keys: Vec<String> = fw
            .list_rules(Direction::Inbound)
            .unwrap()
            .iter()
            .map(|r| r.key().to_string())
            .collect();
        assert_eq!(keys, vec!["IN:22/tcp", "IN:80/tcp", "IN:80/udp", "IN:443/tcp"]);
    }

    #[test]
    fn test_outbound_rules() {
        let (fw, _) = driver(STATUS);
        let rules = fw.list_rules(Direction::Outbound).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].key().to_string(), "OUT:25/tcp");
        assert_eq!(rules[0].action, RuleAction::Drop);
        assert_eq!(rules[1].action, RuleAction::Reject);
    }

    #[test]
    fn test_app_rows_become_services() {
        let (fw, _) = driver(STATUS);
        let allowed: Vec<String> = fw
            .services(ServiceMode::Allow)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(allowed, vec!["OpenSSH", "Nginx Full"]);

        let blocked = fw.services(ServiceMode::Block).unwrap();
        assert_eq!(blocked, vec![ServiceEntry::new("Telnet", ServiceMode::Block)]);
    }

    #[test]
    fn test_parse_app_list() {
        let output = "Available applications:\n  CUPS\n  Nginx Full\n  OpenSSH\n";
        assert_eq!(parse_app_list(output), vec!["CUPS", "Nginx Full", "OpenSSH"]);
    }

    #[test]
    fn test_port_commands() {
        let (fw, runner) = driver(STATUS);
        fw.manage_port(PortOp::Add, 8080, Protocol::Tcp, Direction::Inbound, OutboundTarget::Drop)
            .unwrap();
        fw.manage_port(PortOp::Add, 23, Protocol::Tcp, Direction::Outbound, OutboundTarget::Reject)
            .unwrap();
        fw.manage_port(PortOp::Remove, 53, Protocol::Udp, Direction::Outbound, OutboundTarget::Drop)
            .unwrap();

        let writes: Vec<String> = runner
            .privileged_calls()
            .into_iter()
            .filter(|c| c != "ufw status")
            .collect();
        assert_eq!(
            writes,
            vec![
                "ufw allow 8080/tcp",
                "ufw reject out 23/tcp",
                "ufw delete reject out 53/udp"
            ]
        );
    }

    #[test]
    fn test_zones_unsupported() {
        let (fw, runner) = driver(STATUS);
        assert!(!fw.supports_zones());
        assert!(fw.active_zone().unwrap_err().is_unsupported());
        assert!(fw.set_active_zone(&Zone::Home).unwrap_err().is_unsupported());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_active_reads_conf() {
        assert!(conf_enabled("# comment\nENABLED=yes\nLOGLEVEL=low\n"));
        assert!(!conf_enabled("ENABLED=no\n"));
        assert!(!conf_enabled("#ENABLED=yes\n"));

        let dir = TempDir::new().unwrap();
        let conf = dir.path().join("ufw.conf");
        fs::write(&conf, "ENABLED=yes\n").unwrap();
        let fw = Ufw::new(Arc::new(ScriptedRunner::new()), &conf);
        assert!(fw.is_active());
    }
}
