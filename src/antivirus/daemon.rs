// Sentinel Center - Daemon Lifecycle
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Ordering rules for clamd and the on-access guard.
//!
//! The guard talks to clamd over its control socket, so it may only be
//! started once clamd is running and the socket exists, and clamd may not
//! be stopped while the guard depends on it.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::clamd_conf;
use crate::config::AppSettings;
use crate::privilege::CommandRunner;
use crate::systemd::{ServiceManager, UnitAction};

pub const DAEMON_SERVICE: &str = "clamav-daemon.service";
pub const DAEMON_SOCKET: &str = "clamav-daemon.socket";
pub const GUARD_UNITS: [&str; 2] = ["clamav-clamonacc.service", "clamonacc.service"];

const DAEMON_UNITS: [&str; 2] = [DAEMON_SERVICE, DAEMON_SOCKET];

/// Starts and stops clamd and clamonacc in a safe order.
pub struct DaemonLifecycleCoordinator {
    services: Arc<dyn ServiceManager>,
    runner: Arc<dyn CommandRunner>,
    conf_candidates: Vec<PathBuf>,
    socket_paths: Vec<PathBuf>,
    watch_path: PathBuf,
    ready_attempts: u32,
    ready_interval: Duration,
}

impl DaemonLifecycleCoordinator {
    pub fn new(
        services: Arc<dyn ServiceManager>,
        runner: Arc<dyn CommandRunner>,
        settings: &AppSettings,
    ) -> Self {
        Self {
            services,
            runner,
            conf_candidates: settings.clamd_conf_paths.clone(),
            socket_paths: settings.clamd_socket_paths.clone(),
            watch_path: settings.on_access_watch_path.clone(),
            ready_attempts: settings.daemon_ready_attempts,
            ready_interval: settings.daemon_ready_interval(),
        }
    }

    /// Service or socket unit active.
    pub fn is_daemon_active(&self) -> bool {
        DAEMON_UNITS.iter().any(|u| self.services.is_active(u))
    }

    pub fn is_guard_active(&self) -> bool {
        GUARD_UNITS.iter().any(|u| self.services.is_active(u))
    }

    pub fn set_daemon_state(&self, enable: bool) -> bool {
        if enable {
            if self.is_daemon_active() {
                debug!("clamd already active");
                return true;
            }
            // Masked units cannot be enabled; unmask failure is not fatal.
            self.services.control(UnitAction::Unmask, &DAEMON_UNITS);
            let ok = self.services.control(UnitAction::EnableNow, &DAEMON_UNITS);
            if ok {
                info!("clamd enabled");
            }
            ok
        } else {
            if self.is_guard_active() {
                warn!("Refusing to stop clamd while the on-access guard is running");
                return false;
            }
            if !self.is_daemon_active() {
                debug!("clamd already inactive");
                return true;
            }
            let ok = self.services.control(UnitAction::DisableNow, &DAEMON_UNITS);
            if ok {
                info!("clamd disabled");
            }
            ok
        }
    }

    pub fn set_guard_state(&self, enable: bool) -> bool {
        if enable {
            self.enable_guard()
        } else {
            self.disable_guard()
        }
    }

    fn enable_guard(&self) -> bool {
        if self.is_guard_active() {
            debug!("On-access guard already active");
            return true;
        }

        let Some(conf) = clamd_conf::locate(&self.conf_candidates) else {
            warn!("No clamd configuration found");
            return false;
        };

        if !self.is_daemon_active() && !self.set_daemon_state(true) {
            return false;
        }

        let watch = self.watch_path.clone();
        if let Err(e) = clamd_conf::rewrite(self.runner.as_ref(), &conf, |c| {
            clamd_conf::enable_on_access(c, &watch)
        }) {
            warn!("Failed to configure on-access scanning: {:#}", e);
            return false;
        }

        if !self.services.control(UnitAction::Restart, &[DAEMON_SERVICE]) {
            return false;
        }

        if !self.wait_until_ready() {
            warn!(
                "clamd not ready after {} attempts, on-access guard not started",
                self.ready_attempts
            );
            return false;
        }

        let started = GUARD_UNITS
            .iter()
            .any(|unit| self.services.control(UnitAction::EnableNow, &[*unit]));
        if started {
            info!("On-access guard watching {}", self.watch_path.display());
        }
        started
    }

    fn disable_guard(&self) -> bool {
        for unit in GUARD_UNITS {
            if self.services.is_active(unit) && !self.services.control(UnitAction::DisableNow, &[unit]) {
                return false;
            }
        }

        let Some(conf) = clamd_conf::locate(&self.conf_candidates) else {
            return true;
        };
        if let Err(e) = clamd_conf::rewrite(self.runner.as_ref(), &conf, clamd_conf::disable_on_access) {
            warn!("Failed to remove on-access configuration: {:#}", e);
            return false;
        }

        if self.is_daemon_active() {
            return self.services.control(UnitAction::Restart, &[DAEMON_SERVICE]);
        }
        info!("On-access guard disabled");
        true
    }

    fn socket_present(&self) -> bool {
        self.socket_paths.iter().any(|p| p.exists())
    }

    fn wait_until_ready(&self) -> bool {
        for attempt in 1..=self.ready_attempts {
            if self.services.is_active(DAEMON_SERVICE) && self.socket_present() {
                debug!("clamd ready after {} attempt(s)", attempt);
                return true;
            }
            if attempt < self.ready_attempts {
                thread::sleep(self.ready_interval);
            }
        }
        false
    }
}
