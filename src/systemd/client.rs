// Sentinel Center - Systemd Client
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! systemd access: unit state over D-Bus, unit control through the
//! privilege gateway.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info, warn};
use zbus::blocking::Connection;
use zbus::zvariant::OwnedObjectPath;

use super::{ServiceManager, UnitAction};
use crate::privilege::CommandRunner;

const SYSTEMD_BUS: &str = "org.freedesktop.systemd1";
const SYSTEMD_PATH: &str = "/org/freedesktop/systemd1";
const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";
const UNIT_INTERFACE: &str = "org.freedesktop.systemd1.Unit";
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Client for systemd units.
pub struct SystemdClient {
    connection: Option<Connection>,
    runner: Arc<dyn CommandRunner>,
}

impl SystemdClient {
    /// Create a client. State reads use `systemctl` until [`connect`](Self::connect) succeeds.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            connection: None,
            runner,
        }
    }

    /// Connect to systemd on the system bus.
    pub fn connect(&mut self) -> Result<()> {
        info!("Connecting to systemd...");

        let conn = Connection::system().context("Failed to connect to system D-Bus")?;

        let value: zbus::zvariant::OwnedValue = conn
            .call_method(
                Some(SYSTEMD_BUS),
                SYSTEMD_PATH,
                Some(PROPERTIES_INTERFACE),
                "Get",
                &(MANAGER_INTERFACE, "Version"),
            )?
            .body()
            .deserialize()?;
        let version: String = value.try_into().unwrap_or_default();

        self.connection = Some(conn);
        info!("Connected to systemd {}", version);
        Ok(())
    }

    /// `ActiveState` of a loaded unit. Units that are not loaded are inactive.
    fn active_state(&self, unit: &str) -> Result<String> {
        let conn = self
            .connection
            .as_ref()
            .ok_or_else(|| anyhow!("Not connected to systemd"))?;

        let unit_path: OwnedObjectPath = match conn.call_method(
            Some(SYSTEMD_BUS),
            SYSTEMD_PATH,
            Some(MANAGER_INTERFACE),
            "GetUnit",
            &(unit,),
        ) {
            Ok(reply) => reply.body().deserialize()?,
            Err(zbus::Error::MethodError(name, _, _))
                if name.as_str() == "org.freedesktop.systemd1.NoSuchUnit" =>
            {
                return Ok("inactive".to_string());
            }
            Err(e) => return Err(e.into()),
        };

        let value: zbus::zvariant::OwnedValue = conn
            .call_method(
                Some(SYSTEMD_BUS),
                unit_path.as_str(),
                Some(PROPERTIES_INTERFACE),
                "Get",
                &(UNIT_INTERFACE, "ActiveState"),
            )?
            .body()
            .deserialize()?;

        let state: String = value
            .try_into()
            .map_err(|_| anyhow!("ActiveState is not a string"))?;
        Ok(state)
    }

    fn is_active_via_systemctl(&self, unit: &str) -> bool {
        match self.runner.run(&["systemctl", "is-active", "--quiet", unit]) {
            Ok(out) => out.success(),
            Err(e) => {
                warn!("Failed to query {}: {:#}", unit, e);
                false
            }
        }
    }
}

impl ServiceManager for SystemdClient {
    fn is_active(&self, unit: &str) -> bool {
        if self.connection.is_some() {
            match self.active_state(unit) {
                Ok(state) => {
                    debug!("{} is {}", unit, state);
                    return state == "active";
                }
                Err(e) => debug!("D-Bus query for {} failed, using systemctl: {:#}", unit, e),
            }
        }
        self.is_active_via_systemctl(unit)
    }

    fn control(&self, action: UnitAction, units: &[&str]) -> bool {
        let mut argv = vec!["systemctl"];
        argv.extend_from_slice(action.args());
        argv.extend_from_slice(units);

        match self.runner.run_privileged(&argv, None) {
            Ok(out) if out.success() => {
                info!("systemctl {} {}", action.args().join(" "), units.join(" "));
                true
            }
            Ok(out) => {
                if out.auth_cancelled() {
                    warn!("Authentication cancelled for systemctl {:?}", action);
                } else {
                    warn!(
                        "systemctl {} {} failed: {}",
                        action.args().join(" "),
                        units.join(" "),
                        out.combined().trim()
                    );
                }
                false
            }
            Err(e) => {
                warn!("Failed to run systemctl: {:#}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::CommandOutput;
    use crate::testing::ScriptedRunner;

    #[test]
    fn test_state_falls_back_to_systemctl() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("systemctl is-active --quiet firewalld.service", CommandOutput::new(0, ""));
        runner.respond("systemctl is-active --quiet ufw.service", CommandOutput::new(3, ""));

        let client = SystemdClient::new(runner.clone());
        assert!(client.is_active("firewalld.service"));
        assert!(!client.is_active("ufw.service"));
        assert!(runner.privileged_calls().is_empty());
    }

    #[test]
    fn test_control_goes_through_gateway() {
        let runner = Arc::new(ScriptedRunner::new());
        let client = SystemdClient::new(runner.clone());

        assert!(client.control(
            UnitAction::EnableNow,
            &["clamav-daemon.service", "clamav-daemon.socket"]
        ));
        assert_eq!(
            runner.privileged_calls(),
            vec!["systemctl enable --now clamav-daemon.service clamav-daemon.socket"]
        );

        runner.respond("systemctl stop", CommandOutput::new(126, ""));
        assert!(!client.control(UnitAction::Stop, &["clamav-clamonacc.service"]));
    }
}
