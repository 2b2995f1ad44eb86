// Sentinel Center - Scan Orchestrator
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Install, signature update and on-demand scans as background tasks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::task::{run_streaming, Outcome, TaskContext, TaskHandle};
use crate::config::AppSettings;
use crate::platform::DistroFamily;
use crate::privilege::CommandRunner;

/// Command lines used to drive the engine.
#[derive(Debug, Clone)]
pub struct EngineCommands {
    /// Prefix for commands that need administrator rights.
    pub elevate: Vec<String>,
    /// Recursive scan; the target path is appended.
    pub scan: Vec<String>,
    /// Signature update.
    pub update: Vec<String>,
    /// Version query.
    pub version: Vec<String>,
}

impl Default for EngineCommands {
    fn default() -> Self {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        Self {
            elevate: owned(&["pkexec"]),
            scan: owned(&["clamscan", "-r"]),
            update: owned(&["freshclam"]),
            version: owned(&["clamscan", "--version"]),
        }
    }
}

/// Result of a completed scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Files reported as infected, in report order.
    pub infected: Vec<PathBuf>,
    /// Scanner exit status (0 clean, 1 infections found).
    pub exit_code: i32,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.infected.is_empty()
    }
}

/// Engine version as reported by `clamscan --version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineVersion {
    /// Text before the first `/`, e.g. `ClamAV 1.3.1`.
    pub label: String,
    pub version: Option<semver::Version>,
    /// Signature database version.
    pub signatures: Option<u32>,
}

/// Path named by a `<path>: <signature> FOUND` line.
pub fn parse_found_line(line: &str) -> Option<PathBuf> {
    let line = line.trim_end();
    if !line.ends_with(" FOUND") {
        return None;
    }
    let (path, _) = line.split_once(": ")?;
    (!path.is_empty()).then(|| PathBuf::from(path))
}

/// Parse `ClamAV 1.3.1/27301/Mon Jun  3 08:26:03 2024`.
pub fn parse_version(output: &str) -> Option<EngineVersion> {
    let line = output.lines().next()?.trim();
    if line.is_empty() {
        return None;
    }
    let mut fields = line.split('/');
    let label = fields.next()?.trim().to_string();
    let signatures = fields.next().and_then(|s| s.trim().parse().ok());
    let version = label
        .split_whitespace()
        .last()
        .and_then(|v| semver::Version::parse(v).ok());
    Some(EngineVersion {
        label,
        version,
        signatures,
    })
}

/// Runs the engine's long operations as cancellable tasks.
pub struct ScanOrchestrator {
    commands: EngineCommands,
    runner: Arc<dyn CommandRunner>,
    os_release: PathBuf,
}

impl ScanOrchestrator {
    pub fn new(runner: Arc<dyn CommandRunner>, settings: &AppSettings) -> Self {
        Self::with_commands(runner, settings, EngineCommands::default())
    }

    pub fn with_commands(
        runner: Arc<dyn CommandRunner>,
        settings: &AppSettings,
        commands: EngineCommands,
    ) -> Self {
        Self {
            commands,
            runner,
            os_release: settings.os_release_path.clone(),
        }
    }

    /// Whether the scanner binary is available.
    pub fn engine_installed(&self) -> bool {
        self.commands
            .scan
            .first()
            .map(|program| self.runner.program_exists(program))
            .unwrap_or(false)
    }

    pub fn engine_version(&self) -> Option<EngineVersion> {
        if !self.engine_installed() {
            return None;
        }
        let argv: Vec<&str> = self.commands.version.iter().map(String::as_str).collect();
        match self.runner.run(&argv) {
            Ok(out) if out.success() => parse_version(&out.stdout),
            Ok(out) => {
                warn!("Version query exited with {}", out.code);
                None
            }
            Err(e) => {
                warn!("Version query failed: {:#}", e);
                None
            }
        }
    }

    fn elevated(&self, argv: &[String]) -> Vec<String> {
        self.commands.elevate.iter().chain(argv).cloned().collect()
    }

    /// Install the engine with the distribution's package manager.
    pub fn install(&self) -> TaskHandle<()> {
        let family = DistroFamily::detect(&self.os_release);
        let argv = family
            .install_command(family.antivirus_packages())
            .map(|cmd| self.elevated(&cmd));

        TaskHandle::spawn(move |ctx| async move {
            let Some(argv) = argv else {
                ctx.log("Unsupported distribution, install ClamAV manually");
                return Outcome::Failure("unsupported distribution".to_string());
            };
            ctx.log(format!("Installing with: {}", argv.join(" ")));
            exit_status_outcome(&ctx, &argv, "Installation").await
        })
    }

    /// Refresh the signature database.
    pub fn update(&self) -> TaskHandle<()> {
        let argv = self.elevated(&self.commands.update);
        TaskHandle::spawn(move |ctx| async move {
            ctx.log("Updating virus signatures...");
            exit_status_outcome(&ctx, &argv, "Signature update").await
        })
    }

    /// Recursively scan `path`.
    pub fn scan(&self, path: &Path) -> TaskHandle<ScanReport> {
        let mut argv = self.commands.scan.clone();
        argv.push(path.to_string_lossy().into_owned());
        let target = path.display().to_string();

        TaskHandle::spawn(move |ctx| async move {
            ctx.log(format!("Scanning {}", target));
            let mut infected = Vec::new();
            let result = run_streaming(&ctx, &argv, |line| {
                if let Some(found) = parse_found_line(line) {
                    infected.push(found);
                }
            })
            .await;

            match result {
                Ok(None) => {
                    info!("Scan of {} cancelled", target);
                    Outcome::Cancelled
                }
                Ok(Some(code @ (0 | 1))) => {
                    ctx.log(format!(
                        "Scan finished: {} infected file(s)",
                        infected.len()
                    ));
                    info!("Scan of {} finished with {} infection(s)", target, infected.len());
                    Outcome::Success(ScanReport {
                        infected,
                        exit_code: code,
                    })
                }
                Ok(Some(code)) => {
                    ctx.log(format!("Scanner failed with status {}", code));
                    Outcome::Failure(format!("scanner exited with status {}", code))
                }
                Err(e) => {
                    ctx.log(format!("Could not run scanner: {:#}", e));
                    Outcome::Failure(format!("{:#}", e))
                }
            }
        })
    }
}

async fn exit_status_outcome(
    ctx: &TaskContext<()>,
    argv: &[String],
    what: &str,
) -> Outcome<()> {
    match run_streaming(ctx, argv, |_| {}).await {
        Ok(None) => Outcome::Cancelled,
        Ok(Some(0)) => {
            ctx.log(format!("{} completed", what));
            info!("{} completed", what);
            Outcome::Success(())
        }
        Ok(Some(code)) => {
            ctx.log(format!("{} failed with status {}", what, code));
            Outcome::Failure(format!("{} exited with status {}", what, code))
        }
        Err(e) => Outcome::Failure(format!("{:#}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::antivirus::TaskEvent;
    use crate::privilege::CommandOutput;
    use crate::testing::ScriptedRunner;
    use std::fs;
    use tempfile::TempDir;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into(), "sh".into()]
    }

    fn orchestrator(commands: EngineCommands, os_release: &Path) -> ScanOrchestrator {
        let settings = AppSettings {
            os_release_path: os_release.to_path_buf(),
            ..AppSettings::default()
        };
        ScanOrchestrator::with_commands(Arc::new(ScriptedRunner::new()), &settings, commands)
    }

    #[test]
    fn test_parse_found_line() {
        assert_eq!(
            parse_found_line("/home/u/eicar.com: Win.Test.EICAR_HDB-1 FOUND"),
            Some(PathBuf::from("/home/u/eicar.com"))
        );
        assert_eq!(
            parse_found_line("/tmp/a: b/c.txt: Eicar-Signature FOUND\n"),
            Some(PathBuf::from("/tmp/a"))
        );
        assert_eq!(parse_found_line("/home/u/notes.txt: OK"), None);
        assert_eq!(parse_found_line("Infected files: 1"), None);
    }

    #[test]
    fn test_parse_version() {
        let v = parse_version("ClamAV 1.3.1/27301/Mon Jun  3 08:26:03 2024\n").unwrap();
        assert_eq!(v.label, "ClamAV 1.3.1");
        assert_eq!(v.version, Some(semver::Version::new(1, 3, 1)));
        assert_eq!(v.signatures, Some(27301));

        let v = parse_version("ClamAV 0.103.11\n").unwrap();
        assert_eq!(v.signatures, None);
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn test_engine_version_uses_runner() {
        let runner = Arc::new(ScriptedRunner::new().with_program("clamscan"));
        runner.respond(
            "clamscan --version",
            CommandOutput::new(0, "ClamAV 1.4.0/27400/Tue Oct  1 2024\n"),
        );
        let orch = ScanOrchestrator::new(runner, &AppSettings::default());
        assert!(orch.engine_installed());
        assert_eq!(orch.engine_version().unwrap().label, "ClamAV 1.4.0");
    }

    #[tokio::test]
    async fn test_eicar_scan_succeeds_with_one_infection() {
        let dir = TempDir::new().unwrap();
        let commands = EngineCommands {
            scan: sh("echo \"$1/eicar.com: Win.Test.EICAR_HDB-1 FOUND\"; \
                      echo \"$1/readme.txt: OK\"; \
                      echo '----------- SCAN SUMMARY -----------'; \
                      echo 'Infected files: 1'; exit 1"),
            ..EngineCommands::default()
        };
        let orch = orchestrator(commands, &dir.path().join("os-release"));

        let mut lines = Vec::new();
        let outcome = orch
            .scan(Path::new("/home/u"))
            .wait(|l| lines.push(l.to_string()))
            .await;

        assert_eq!(
            outcome,
            Outcome::Success(ScanReport {
                infected: vec![PathBuf::from("/home/u/eicar.com")],
                exit_code: 1,
            })
        );
        assert!(lines.contains(&"/home/u/readme.txt: OK".to_string()));
    }

    #[tokio::test]
    async fn test_scanner_error_status_is_failure() {
        let dir = TempDir::new().unwrap();
        let commands = EngineCommands {
            scan: sh("echo 'ERROR: Can not open file or directory' >&2; exit 2"),
            ..EngineCommands::default()
        };
        let orch = orchestrator(commands, &dir.path().join("os-release"));
        let outcome = orch.scan(Path::new("/nope")).wait(|_| {}).await;
        assert!(matches!(outcome, Outcome::Failure(_)));
    }

    #[tokio::test]
    async fn test_cancelled_scan_reports_cancelled_once() {
        let dir = TempDir::new().unwrap();
        let commands = EngineCommands {
            scan: sh("echo \"$1/a: OK\"; sleep 30; echo \"$1/b: Eicar FOUND\""),
            ..EngineCommands::default()
        };
        let orch = orchestrator(commands, &dir.path().join("os-release"));
        let mut handle = orch.scan(Path::new("/data"));

        assert_eq!(handle.next_event().await, Some(TaskEvent::Log("Scanning /data".into())));
        assert_eq!(handle.next_event().await, Some(TaskEvent::Log("/data/a: OK".into())));
        handle.cancel();

        let mut rest = Vec::new();
        while let Some(event) = handle.next_event().await {
            rest.push(event);
        }
        assert_eq!(rest, vec![TaskEvent::Finished(Outcome::Cancelled)]);
    }

    #[tokio::test]
    async fn test_update_success_and_failure() {
        let dir = TempDir::new().unwrap();
        let os_release = dir.path().join("os-release");
        let ok = EngineCommands {
            elevate: Vec::new(),
            update: sh("echo 'daily.cvd updated'"),
            ..EngineCommands::default()
        };
        assert_eq!(
            orchestrator(ok, &os_release).update().wait(|_| {}).await,
            Outcome::Success(())
        );

        let failing = EngineCommands {
            elevate: Vec::new(),
            update: sh("exit 62"),
            ..EngineCommands::default()
        };
        assert!(matches!(
            orchestrator(failing, &os_release).update().wait(|_| {}).await,
            Outcome::Failure(_)
        ));
    }

    #[tokio::test]
    async fn test_install_on_unknown_distro_spawns_nothing() {
        let dir = TempDir::new().unwrap();
        let os_release = dir.path().join("os-release");
        fs::write(&os_release, "ID=gentoo\n").unwrap();
        let commands = EngineCommands {
            elevate: vec!["definitely-not-a-real-binary-xyz".into()],
            ..EngineCommands::default()
        };
        let outcome = orchestrator(commands, &os_release).install().wait(|_| {}).await;
        assert_eq!(outcome, Outcome::Failure("unsupported distribution".into()));
    }

    #[tokio::test]
    async fn test_install_runs_package_manager() {
        let dir = TempDir::new().unwrap();
        let os_release = dir.path().join("os-release");
        fs::write(&os_release, "ID=ubuntu\nID_LIKE=debian\n").unwrap();
        let commands = EngineCommands {
            elevate: vec!["echo".into()],
            ..EngineCommands::default()
        };

        let mut lines = Vec::new();
        let outcome = orchestrator(commands, &os_release)
            .install()
            .wait(|l| lines.push(l.to_string()))
            .await;
        assert_eq!(outcome, Outcome::Success(()));
        assert!(lines.contains(&"apt install -y clamav clamav-daemon".to_string()));
    }
}
