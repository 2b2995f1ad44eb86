// Sentinel Center - Firewall Facade
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! One firewall API over whichever backend is installed.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, warn};

use super::{BackendKind, FirewallBackend, FirewallStatus, Firewalld, Ufw};
use crate::config::AppSettings;
use crate::error::BackendResult;
use crate::models::{
    is_valid_port, Direction, OutboundTarget, PortOp, Protocol, Rule, RuleKey, ServiceEntry,
    ServiceMode, Zone,
};
use crate::platform::DistroFamily;
use crate::privilege::CommandRunner;
use crate::storage::ConfigStore;
use crate::systemd::ServiceManager;

/// A backend rule together with its user label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledRule {
    pub rule: Rule,
    pub label: String,
}

/// Detects the firewall backend and forwards operations to it.
pub struct FirewallFacade {
    drivers: Vec<Arc<dyn FirewallBackend>>,
    selected: RwLock<Option<Arc<dyn FirewallBackend>>>,
    last_status: Mutex<Option<FirewallStatus>>,
    store: Arc<ConfigStore>,
    runner: Arc<dyn CommandRunner>,
    os_release: PathBuf,
}

impl FirewallFacade {
    /// Facade over the firewalld and ufw drivers, probed in that order.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        services: Arc<dyn ServiceManager>,
        store: Arc<ConfigStore>,
        settings: &AppSettings,
    ) -> Self {
        let drivers: Vec<Arc<dyn FirewallBackend>> = vec![
            Arc::new(Firewalld::new(runner.clone(), services)),
            Arc::new(Ufw::new(runner.clone(), settings.ufw_conf_path.clone())),
        ];
        Self::with_drivers(drivers, store, runner, settings.os_release_path.clone())
    }

    /// Facade over an explicit driver list. Earlier drivers win detection.
    pub fn with_drivers(
        drivers: Vec<Arc<dyn FirewallBackend>>,
        store: Arc<ConfigStore>,
        runner: Arc<dyn CommandRunner>,
        os_release: PathBuf,
    ) -> Self {
        Self {
            drivers,
            selected: RwLock::new(None),
            last_status: Mutex::new(None),
            store,
            runner,
            os_release,
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DETECTION AND STATE
    // ═══════════════════════════════════════════════════════════════════════

    /// Probe the backends and select the first installed one.
    pub fn detect(&self) -> FirewallStatus {
        let found = self.drivers.iter().find(|d| d.is_installed()).cloned();

        let status = match &found {
            Some(driver) => {
                let active = driver.is_active();
                FirewallStatus {
                    kind: driver.kind(),
                    active,
                    details: format!(
                        "{} is installed and {}",
                        driver.name(),
                        if active { "active" } else { "inactive" }
                    ),
                }
            }
            None => FirewallStatus {
                kind: BackendKind::None,
                active: false,
                details: "No supported firewall is installed".to_string(),
            },
        };

        match self.selected.write() {
            Ok(mut guard) => *guard = found,
            Err(poisoned) => *poisoned.into_inner() = found,
        }

        if self.note_status(&status) {
            info!("Firewall detection: {:?} (active: {})", status.kind, status.active);
        } else {
            debug!("Firewall detection unchanged: {:?}", status.kind);
        }
        status
    }

    /// Remember `status`; true when it differs from the previous detection.
    fn note_status(&self, status: &FirewallStatus) -> bool {
        let mut last = match self.last_status.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.as_ref() == Some(status) {
            return false;
        }
        *last = Some(status.clone());
        true
    }

    /// The selected driver, detecting first if nothing was selected yet.
    fn backend(&self) -> Option<Arc<dyn FirewallBackend>> {
        let current = match self.selected.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if current.is_some() {
            return current;
        }
        self.detect();
        match self.selected.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn driver_for(&self, kind: BackendKind) -> Option<&Arc<dyn FirewallBackend>> {
        self.drivers.iter().find(|d| d.kind() == kind)
    }

    /// Start or stop a backend. Already in the requested state is a success
    /// with no privileged call.
    pub fn set_state(&self, kind: BackendKind, enable: bool) -> bool {
        let Some(driver) = self.driver_for(kind) else {
            warn!("No driver for backend {}", kind);
            return false;
        };
        if !driver.is_installed() {
            warn!("{} is not installed", driver.name());
            return false;
        }
        if driver.is_active() == enable {
            info!("{} already {}", driver.name(), if enable { "active" } else { "inactive" });
            return true;
        }

        let ok = report(driver.set_enabled(enable), "set firewall state");
        self.detect();
        ok
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PORTS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn manage_inbound_port(&self, op: PortOp, port: u16, protocol: Protocol) -> bool {
        self.manage_port(op, port, protocol, Direction::Inbound, OutboundTarget::default())
    }

    pub fn manage_outbound_port(
        &self,
        op: PortOp,
        port: u16,
        protocol: Protocol,
        target: OutboundTarget,
    ) -> bool {
        self.manage_port(op, port, protocol, Direction::Outbound, target)
    }

    fn manage_port(
        &self,
        op: PortOp,
        port: u16,
        protocol: Protocol,
        direction: Direction,
        target: OutboundTarget,
    ) -> bool {
        if !is_valid_port(port) {
            warn!("Rejected port {}", port);
            return false;
        }
        let Some(driver) = self.backend() else {
            return false;
        };
        report(
            driver.manage_port(op, port, protocol, direction, target),
            "change port rule",
        )
    }

    pub fn inbound_rules(&self) -> BackendResult<Vec<LabeledRule>> {
        self.rules(Direction::Inbound)
    }

    pub fn outbound_rules(&self) -> BackendResult<Vec<LabeledRule>> {
        self.rules(Direction::Outbound)
    }

    fn rules(&self, direction: Direction) -> BackendResult<Vec<LabeledRule>> {
        let Some(driver) = self.backend() else {
            return Ok(Vec::new());
        };
        Ok(driver
            .list_rules(direction)?
            .into_iter()
            .map(|rule| LabeledRule {
                label: self.store.rule_label(&rule.key()),
                rule,
            })
            .collect())
    }

    /// Add a rule and remember its label.
    pub fn add_rule(
        &self,
        direction: Direction,
        port: u16,
        protocol: Protocol,
        target: OutboundTarget,
        label: &str,
    ) -> bool {
        if !self.manage_port(PortOp::Add, port, protocol, direction, target) {
            return false;
        }
        let key = RuleKey::new(direction, port, protocol);
        if !label.trim().is_empty() && !self.store.set_rule_label(&key, label) {
            warn!("Rule {} added but its label was not saved", key);
        }
        true
    }

    /// Remove a rule and forget its label.
    pub fn remove_rule(&self, direction: Direction, port: u16, protocol: Protocol) -> bool {
        if !self.manage_port(PortOp::Remove, port, protocol, direction, OutboundTarget::default()) {
            return false;
        }
        self.store.delete_rule_label(&RuleKey::new(direction, port, protocol));
        true
    }

    /// Change a rule's label. The backend is not touched.
    pub fn rename_rule(&self, key: &RuleKey, label: &str) -> bool {
        self.store.set_rule_label(key, label)
    }

    pub fn label(&self, key: &RuleKey) -> String {
        self.store.rule_label(key)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SERVICES
    // ═══════════════════════════════════════════════════════════════════════

    pub fn manage_service(&self, op: PortOp, name: &str, mode: ServiceMode) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        let Some(driver) = self.backend() else {
            return false;
        };
        report(driver.manage_service(op, name, mode), "change service rule")
    }

    pub fn services(&self, mode: ServiceMode) -> BackendResult<Vec<ServiceEntry>> {
        match self.backend() {
            Some(driver) => driver.services(mode),
            None => Ok(Vec::new()),
        }
    }

    pub fn available_services(&self) -> BackendResult<Vec<String>> {
        match self.backend() {
            Some(driver) => driver.available_services(),
            None => Ok(Vec::new()),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ZONES
    // ═══════════════════════════════════════════════════════════════════════

    pub fn supports_zones(&self) -> bool {
        self.backend().map(|d| d.supports_zones()).unwrap_or(false)
    }

    pub fn active_zone(&self) -> Option<Zone> {
        let driver = self.backend()?;
        match driver.active_zone() {
            Ok(zone) => Some(zone),
            Err(e) => {
                if !e.is_unsupported() {
                    warn!("Failed to read active zone: {}", e);
                }
                None
            }
        }
    }

    pub fn set_active_zone(&self, zone: &Zone) -> bool {
        let Some(driver) = self.backend() else {
            return false;
        };
        report(driver.set_active_zone(zone), "set active zone")
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INSTALLATION
    // ═══════════════════════════════════════════════════════════════════════

    /// Backend suited to this distribution.
    pub fn recommended_backend(&self) -> BackendKind {
        DistroFamily::detect(&self.os_release).recommended_backend()
    }

    /// Install a backend with the distribution's package manager.
    pub fn install_backend(&self, kind: BackendKind) -> bool {
        let Some(package) = DistroFamily::firewall_package(kind) else {
            return false;
        };
        let family = DistroFamily::detect(&self.os_release);
        let Some(argv) = family.install_command(&[package]) else {
            warn!("Unsupported distribution, cannot install {}", package);
            return false;
        };

        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
        info!("Installing {}: {}", package, argv.join(" "));
        let ok = match self.runner.run_privileged(&argv, None) {
            Ok(out) if out.success() => true,
            Ok(out) => {
                warn!("Installing {} failed: {}", package, out.combined().trim());
                false
            }
            Err(e) => {
                warn!("Installing {} failed: {:#}", package, e);
                false
            }
        };
        if ok {
            self.detect();
        }
        ok
    }
}

fn report(result: BackendResult<()>, what: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to {}: {}", what, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::CommandOutput;
    use crate::testing::{FakeServices, ScriptedRunner};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        facade: FirewallFacade,
        runner: Arc<ScriptedRunner>,
        services: Arc<FakeServices>,
        _dir: TempDir,
    }

    fn fixture(runner: ScriptedRunner) -> Fixture {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(runner);
        let services = Arc::new(FakeServices::new());
        let store = Arc::new(ConfigStore::at(dir.path().join("store.json")));
        let os_release = dir.path().join("os-release");
        fs::write(&os_release, "ID=fedora\n").unwrap();

        let settings = AppSettings {
            ufw_conf_path: dir.path().join("ufw.conf"),
            os_release_path: os_release,
            ..AppSettings::default()
        };
        let facade = FirewallFacade::new(runner.clone(), services.clone(), store, &settings);
        Fixture {
            facade,
            runner,
            services,
            _dir: dir,
        }
    }

    #[test]
    fn test_repeat_detection_is_not_a_change() {
        let fx = fixture(ScriptedRunner::new().with_program("firewall-cmd"));
        let first = fx.facade.detect();
        assert_eq!(first.kind, BackendKind::ZoneDaemon);
        assert!(!fx.facade.note_status(&first));

        fx.services.set_active("firewalld.service", true);
        let second = fx.facade.detect();
        assert!(second.active);
        assert!(!fx.facade.note_status(&second));
        assert!(fx.facade.note_status(&first));
    }

    #[test]
    fn test_nothing_installed() {
        let fx = fixture(ScriptedRunner::new());
        let status = fx.facade.detect();
        assert_eq!(status.kind, BackendKind::None);
        assert!(!status.active);
        assert!(!fx.facade.manage_inbound_port(PortOp::Add, 80, Protocol::Tcp));
        assert!(fx.facade.inbound_rules().unwrap().is_empty());
        assert!(fx.runner.privileged_calls().is_empty());
    }

    #[test]
    fn test_zone_daemon_preferred() {
        let fx = fixture(ScriptedRunner::new().with_program("firewall-cmd").with_program("ufw"));
        fx.services.set_active("firewalld.service", true);
        let status = fx.facade.detect();
        assert_eq!(status.kind, BackendKind::ZoneDaemon);
        assert!(status.active);
        assert!(fx.facade.supports_zones());
    }

    #[test]
    fn test_set_state_is_idempotent() {
        let fx = fixture(ScriptedRunner::new().with_program("firewall-cmd"));
        assert!(fx.facade.set_state(BackendKind::ZoneDaemon, true));
        assert_eq!(fx.services.calls().len(), 1);

        assert!(fx.facade.set_state(BackendKind::ZoneDaemon, true));
        assert_eq!(fx.services.calls().len(), 1);
        assert!(fx.runner.privileged_calls().is_empty());
    }

    #[test]
    fn test_ufw_state_changes() {
        let fx = fixture(ScriptedRunner::new().with_program("ufw"));
        assert!(fx.facade.set_state(BackendKind::ListDaemon, true));
        assert_eq!(fx.runner.privileged_calls(), vec!["ufw --force enable"]);

        // ufw.conf does not exist, so the backend still reads as inactive.
        assert!(fx.facade.set_state(BackendKind::ListDaemon, false));
        assert_eq!(fx.runner.privileged_calls().len(), 1);
        assert!(!fx.facade.set_state(BackendKind::ZoneDaemon, true));
    }

    #[test]
    fn test_rule_labels_follow_rules() {
        let fx = fixture(ScriptedRunner::new().with_program("firewall-cmd"));
        fx.facade.detect();

        assert!(fx.facade.add_rule(
            Direction::Inbound,
            8080,
            Protocol::Tcp,
            OutboundTarget::Drop,
            "dev server"
        ));
        let key = RuleKey::new(Direction::Inbound, 8080, Protocol::Tcp);
        assert_eq!(fx.facade.label(&key), "dev server");

        fx.runner.respond("firewall-cmd --list-ports", CommandOutput::new(0, "8080/tcp\n"));
        let rules = fx.facade.inbound_rules().unwrap();
        assert_eq!(rules[0].label, "dev server");

        fx.runner.clear();
        assert!(fx.facade.rename_rule(&key, "api"));
        assert!(fx.runner.calls().is_empty());

        assert!(fx.facade.remove_rule(Direction::Inbound, 8080, Protocol::Tcp));
        assert!(fx.facade.add_rule(Direction::Inbound, 8080, Protocol::Tcp, OutboundTarget::Drop, ""));
        assert_eq!(fx.facade.label(&key), "");
    }

    #[test]
    fn test_failed_add_keeps_no_label() {
        let fx = fixture(ScriptedRunner::new().with_program("firewall-cmd"));
        fx.runner.respond("firewall-cmd --permanent", CommandOutput::new(126, ""));
        assert!(!fx.facade.add_rule(
            Direction::Outbound,
            25,
            Protocol::Tcp,
            OutboundTarget::Reject,
            "smtp"
        ));
        assert_eq!(
            fx.facade.label(&RuleKey::new(Direction::Outbound, 25, Protocol::Tcp)),
            ""
        );
    }

    #[test]
    fn test_install_backend_uses_distro_package_manager() {
        let fx = fixture(ScriptedRunner::new());
        assert_eq!(fx.facade.recommended_backend(), BackendKind::ZoneDaemon);
        assert!(fx.facade.install_backend(BackendKind::ZoneDaemon));
        assert_eq!(fx.runner.privileged_calls(), vec!["dnf install -y firewalld"]);
        assert!(!fx.facade.install_backend(BackendKind::None));
    }

    #[test]
    fn test_zone_on_list_daemon() {
        let fx = fixture(ScriptedRunner::new().with_program("ufw"));
        assert!(!fx.facade.supports_zones());
        assert_eq!(fx.facade.active_zone(), None);
        assert!(!fx.facade.set_active_zone(&Zone::Home));
    }
}
