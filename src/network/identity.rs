// Sentinel Center - Network Identity
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Name of the currently active network connection.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};
use zbus::blocking::Connection;
use zbus::zvariant::OwnedObjectPath;

use crate::privilege::CommandRunner;

const NM_BUS: &str = "org.freedesktop.NetworkManager";
const NM_PATH: &str = "/org/freedesktop/NetworkManager";
const NM_INTERFACE: &str = "org.freedesktop.NetworkManager";
const ACTIVE_INTERFACE: &str = "org.freedesktop.NetworkManager.Connection.Active";
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Something that can name the active network.
pub trait NetworkIdentitySource: Send + Sync {
    /// Connection name of the active network, `None` when offline or unknown.
    fn current(&self) -> Option<String>;
}

/// NetworkManager over D-Bus, with `nmcli` as fallback.
pub struct NetworkManagerSource {
    connection: Option<Connection>,
    runner: Arc<dyn CommandRunner>,
}

impl NetworkManagerSource {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            connection: None,
            runner,
        }
    }

    /// Connect to NetworkManager on the system bus.
    pub fn connect(&mut self) -> Result<()> {
        let conn = Connection::system().context("Failed to connect to system D-Bus")?;
        self.connection = Some(conn);
        info!("Connected to NetworkManager");
        Ok(())
    }

    fn property(&self, path: &str, interface: &str, name: &str) -> Result<zbus::zvariant::OwnedValue> {
        let conn = self
            .connection
            .as_ref()
            .ok_or_else(|| anyhow!("Not connected to NetworkManager"))?;

        let value = conn
            .call_method(
                Some(NM_BUS),
                path,
                Some(PROPERTIES_INTERFACE),
                "Get",
                &(interface, name),
            )?
            .body()
            .deserialize()?;
        Ok(value)
    }

    fn primary_connection_id(&self) -> Result<Option<String>> {
        let path: OwnedObjectPath = self
            .property(NM_PATH, NM_INTERFACE, "PrimaryConnection")?
            .try_into()
            .map_err(|_| anyhow!("PrimaryConnection is not an object path"))?;

        if path.as_str() == "/" {
            return Ok(None);
        }

        let id: String = self
            .property(path.as_str(), ACTIVE_INTERFACE, "Id")?
            .try_into()
            .map_err(|_| anyhow!("Id is not a string"))?;
        Ok(Some(id).filter(|s| !s.is_empty()))
    }

    fn from_nmcli(&self) -> Option<String> {
        let out = self
            .runner
            .run(&["nmcli", "-t", "-f", "NAME,TYPE", "connection", "show", "--active"])
            .ok()?;
        if !out.success() {
            return None;
        }
        parse_nmcli_active(&out.stdout)
    }
}

impl NetworkIdentitySource for NetworkManagerSource {
    fn current(&self) -> Option<String> {
        if self.connection.is_some() {
            match self.primary_connection_id() {
                Ok(id) => return id,
                Err(e) => debug!("NetworkManager D-Bus query failed, using nmcli: {:#}", e),
            }
        }
        self.from_nmcli()
    }
}

/// Split one terse `nmcli` line on unescaped colons.
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// First active connection from `nmcli -t -f NAME,TYPE connection show --active`,
/// ignoring the loopback entry newer NetworkManager versions list.
pub(crate) fn parse_nmcli_active(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(split_terse)
        .find(|fields| fields.get(1).map(String::as_str) != Some("loopback"))
        .and_then(|fields| fields.into_iter().next())
        .filter(|name| !name.is_empty())
}
