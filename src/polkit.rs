// Sentinel Center - Polkit Rule
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Installs a polkit rule so administrators are not asked for a password
//! on every firewall or signature-update command.

use tracing::{info, warn};

use crate::privilege::CommandRunner;
use crate::storage::ConfigStore;

/// Where the rule is written.
pub const RULE_PATH: &str = "/etc/polkit-1/rules.d/49-sentinel-center.rules";

/// Bump whenever [`rule_content`] changes.
pub const CURRENT_RULE_VERSION: u32 = 2;

/// Config store key tracking the installed version.
pub const VERSION_KEY: &str = "polkit_rule_version";

const PROGRAMS: &[&str] = &[
    "/usr/bin/firewall-cmd",
    "/usr/sbin/firewall-cmd",
    "/usr/bin/ufw",
    "/usr/sbin/ufw",
    "/usr/bin/freshclam",
];

/// The JavaScript rule body.
pub fn rule_content() -> String {
    let programs = PROGRAMS
        .iter()
        .map(|p| format!("program == \"{}\"", p))
        .collect::<Vec<_>>()
        .join(" ||\n                ");

    format!(
        r#"/* Installed by Sentinel Center (v{version}) */
polkit.addRule(function(action, subject) {{
    var is_admin = subject.isInGroup("wheel") || subject.isInGroup("sudo");
    if (!is_admin) {{
        return;
    }}

    if (action.id.indexOf("org.fedoraproject.FirewallD1") == 0) {{
        return polkit.Result.YES;
    }}

    if (action.id == "org.freedesktop.policykit.exec") {{
        var program = action.lookup("program");
        if ({programs}) {{
            return polkit.Result.YES;
        }}
    }}
}});
"#,
        version = CURRENT_RULE_VERSION,
        programs = programs,
    )
}

/// Whether the stored marker is older than the shipped rule.
pub fn needs_install(store: &ConfigStore) -> bool {
    store.version_marker(VERSION_KEY) < CURRENT_RULE_VERSION
}

/// Install the rule if the stored version is older. Returns true when the
/// rule is current afterwards.
pub fn ensure_rule(store: &ConfigStore, runner: &dyn CommandRunner) -> bool {
    if !needs_install(store) {
        return true;
    }

    info!("Installing polkit rule v{}", CURRENT_RULE_VERSION);
    let content = rule_content();
    match runner.run_privileged(&["tee", RULE_PATH], Some(content.as_bytes())) {
        Ok(out) if out.success() => {}
        Ok(out) => {
            warn!("Failed to install polkit rule: {}", out.combined().trim());
            return false;
        }
        Err(e) => {
            warn!("Failed to install polkit rule: {:#}", e);
            return false;
        }
    }

    // Restart failure is not fatal.
    if let Ok(out) = runner.run_privileged(&["systemctl", "restart", "polkit"], None) {
        if !out.success() {
            warn!("polkit restart exited with {}", out.code);
        }
    }

    store.set_version_marker(VERSION_KEY, CURRENT_RULE_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::CommandOutput;
    use crate::testing::ScriptedRunner;
    use tempfile::TempDir;

    #[test]
    fn test_rule_mentions_every_program() {
        let content = rule_content();
        for program in PROGRAMS {
            assert!(content.contains(program), "{}", program);
        }
        assert!(content.contains("org.fedoraproject.FirewallD1"));
        assert!(content.contains("(v2)"));
    }

    #[test]
    fn test_installs_once() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::at(dir.path().join("store.json"));
        let runner = ScriptedRunner::new();

        assert!(ensure_rule(&store, &runner));
        assert_eq!(runner.privileged_calls()[0], format!("tee {}", RULE_PATH));
        assert_eq!(runner.stdin_of(0).unwrap(), rule_content());
        assert_eq!(store.version_marker(VERSION_KEY), CURRENT_RULE_VERSION);

        runner.clear();
        assert!(ensure_rule(&store, &runner));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_failed_write_keeps_marker() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::at(dir.path().join("store.json"));
        let runner = ScriptedRunner::new();
        runner.respond("tee", CommandOutput::new(126, ""));

        assert!(!ensure_rule(&store, &runner));
        assert!(needs_install(&store));
    }
}
