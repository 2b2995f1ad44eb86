// Sentinel Center - Main Entry Point
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Sentinel Center - firewall, zone and antivirus orchestration for Linux.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use sentinel_center::antivirus::{
    DaemonLifecycleCoordinator, Outcome, QuarantineStore, ScanOrchestrator, TaskHandle,
};
use sentinel_center::config::{AppSettings, Settings};
use sentinel_center::firewall::{BackendKind, FirewallFacade};
use sentinel_center::models::{
    parse_port_proto, Direction, OutboundTarget, PortOp, Protocol, RuleKey, ServiceMode, Zone,
    ZoneBucket,
};
use sentinel_center::network::{
    NetworkManagerSource, ZoneEvent, ZonePrompt, ZoneReconciler,
};
use sentinel_center::privilege::{CommandRunner, SystemRunner};
use sentinel_center::storage::ConfigStore;
use sentinel_center::systemd::{ServiceManager, SystemdClient};
use sentinel_center::{polkit, APP_ID};

#[derive(Parser, Debug)]
#[command(name = "sentinel-center", version)]
#[command(about = "Firewall, network zone and antivirus control for Linux")]
struct Args {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Do not install the polkit rule before privileged commands
    #[arg(long)]
    no_polkit: bool,

    /// Program used to run commands as root
    #[arg(long, default_value = "pkexec")]
    elevator: String,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show firewall, zone and antivirus state
    Status,
    /// Firewall backend control
    Firewall {
        #[command(subcommand)]
        action: FirewallCmd,
    },
    /// Port rules
    Port {
        #[command(subcommand)]
        action: PortCmd,
    },
    /// Allowed and blocked services
    Service {
        #[command(subcommand)]
        action: ServiceCmd,
    },
    /// Active firewall zone
    Zone {
        #[command(subcommand)]
        action: ZoneCmd,
    },
    /// Remembered networks
    Network {
        #[command(subcommand)]
        action: NetworkCmd,
    },
    /// Follow network changes and switch zones until interrupted
    Watch,
    /// Scan a file or directory
    Scan {
        path: PathBuf,
        /// Move infected files to quarantine
        #[arg(long)]
        quarantine: bool,
    },
    /// Update virus signatures
    Update,
    /// Install the antivirus engine
    Install,
    /// Start or stop the scanning daemon
    Daemon { state: Toggle },
    /// Start or stop on-access scanning
    Guard { state: Toggle },
    /// Quarantined files
    Quarantine {
        #[command(subcommand)]
        action: QuarantineCmd,
    },
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsCmd,
    },
}

#[derive(Subcommand, Debug)]
enum FirewallCmd {
    Enable {
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
    },
    Disable {
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
    },
    /// Install a backend (the distribution's usual one by default)
    Install {
        #[arg(value_enum)]
        backend: Option<BackendArg>,
    },
}

#[derive(Subcommand, Debug)]
enum PortCmd {
    List {
        #[arg(long)]
        outbound: bool,
    },
    /// Open an inbound port, or block an outbound one with --outbound
    Add {
        #[arg(value_parser = parse_port_arg)]
        port: (u16, Protocol),
        #[arg(long)]
        outbound: bool,
        #[arg(long, default_value = "drop")]
        target: OutboundTarget,
        #[arg(long, default_value = "")]
        label: String,
    },
    Remove {
        #[arg(value_parser = parse_port_arg)]
        port: (u16, Protocol),
        #[arg(long)]
        outbound: bool,
    },
    /// Set or clear (with an empty string) a rule label
    Label {
        #[arg(value_parser = parse_port_arg)]
        port: (u16, Protocol),
        label: String,
        #[arg(long)]
        outbound: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ServiceCmd {
    List {
        #[arg(long)]
        blocked: bool,
    },
    /// Services the backend knows about
    Available,
    Add {
        name: String,
        #[arg(long)]
        blocked: bool,
    },
    Remove {
        name: String,
        #[arg(long)]
        blocked: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ZoneCmd {
    Get,
    Set { zone: Zone },
}

#[derive(Subcommand, Debug)]
enum NetworkCmd {
    List,
    Assign {
        name: String,
        #[arg(value_enum)]
        trust: TrustArg,
    },
    Forget { name: String },
}

#[derive(Subcommand, Debug)]
enum QuarantineCmd {
    List,
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    Restore { id: String },
    Purge { id: String },
}

#[derive(Subcommand, Debug)]
enum SettingsCmd {
    Show,
    /// Directory watched by on-access scanning
    WatchPath { path: PathBuf },
    /// Seconds between network checks in `watch`
    PollInterval { secs: u64 },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Firewalld,
    Ufw,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Firewalld => BackendKind::ZoneDaemon,
            BackendArg::Ufw => BackendKind::ListDaemon,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TrustArg {
    Trusted,
    Untrusted,
}

impl From<TrustArg> for ZoneBucket {
    fn from(arg: TrustArg) -> Self {
        match arg {
            TrustArg::Trusted => ZoneBucket::Trusted,
            TrustArg::Untrusted => ZoneBucket::Untrusted,
        }
    }
}

impl Command {
    /// Commands that change system state through the privilege helper.
    fn is_privileged(&self) -> bool {
        match self {
            Self::Status
            | Self::Network { .. }
            | Self::Quarantine { .. }
            | Self::Scan { .. }
            | Self::Settings { .. } => false,
            Self::Port { action } => !matches!(action, PortCmd::List { .. } | PortCmd::Label { .. }),
            Self::Service { action } => matches!(action, ServiceCmd::Add { .. } | ServiceCmd::Remove { .. }),
            Self::Zone { action } => matches!(action, ZoneCmd::Set { .. }),
            _ => true,
        }
    }
}

fn parse_port_arg(s: &str) -> Result<(u16, Protocol), String> {
    parse_port_proto(s).ok_or_else(|| format!("expected PORT/PROTO such as 8080/tcp, got '{}'", s))
}

fn direction(outbound: bool) -> Direction {
    if outbound {
        Direction::Outbound
    } else {
        Direction::Inbound
    }
}

/// Shared services wired together once per invocation.
struct App {
    settings: AppSettings,
    runner: Arc<dyn CommandRunner>,
    services: Arc<dyn ServiceManager>,
    store: Arc<ConfigStore>,
    facade: Arc<FirewallFacade>,
    runtime: tokio::runtime::Runtime,
}

impl App {
    fn new(settings: AppSettings, elevator: &str) -> Result<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::with_elevator(elevator));

        let mut systemd = SystemdClient::new(runner.clone());
        if let Err(e) = systemd.connect() {
            warn!("systemd D-Bus unavailable, using systemctl: {:#}", e);
        }
        let services: Arc<dyn ServiceManager> = Arc::new(systemd);

        let store = Arc::new(ConfigStore::new());
        let facade = Arc::new(FirewallFacade::new(
            runner.clone(),
            services.clone(),
            store.clone(),
            &settings,
        ));

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;

        Ok(Self {
            settings,
            runner,
            services,
            store,
            facade,
            runtime,
        })
    }

    fn daemons(&self) -> DaemonLifecycleCoordinator {
        DaemonLifecycleCoordinator::new(self.services.clone(), self.runner.clone(), &self.settings)
    }

    fn orchestrator(&self) -> ScanOrchestrator {
        ScanOrchestrator::new(self.runner.clone(), &self.settings)
    }

    fn quarantine(&self) -> QuarantineStore {
        QuarantineStore::new(&self.settings.quarantine_dir)
    }

    /// Drive a task to completion, printing its log. Ctrl-C cancels it.
    fn run_task<T: Send + 'static>(&self, start: impl FnOnce() -> TaskHandle<T>) -> Outcome<T> {
        self.runtime.block_on(async {
            let handle = start();
            let canceller = handle.canceller();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    canceller.cancel();
                }
            });
            handle.wait(|line| println!("{}", line)).await
        })
    }
}

/// Asks on the terminal how far to trust a new network.
struct TerminalPrompt;

impl ZonePrompt for TerminalPrompt {
    fn ask(&self, network: &str) -> Option<ZoneBucket> {
        eprint!(
            "New network \"{}\". Trust it? [t]rusted (home zone) / [u]ntrusted (public zone): ",
            network
        );
        let _ = io::stderr().flush();

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer).ok()?;
        match answer.trim().to_ascii_lowercase().as_str() {
            "t" | "trusted" | "home" => Some(ZoneBucket::Trusted),
            "u" | "untrusted" | "public" => Some(ZoneBucket::Untrusted),
            _ => None,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<bool> {
    let mut settings = match &args.settings {
        Some(path) => Settings::load_from(path),
        None => Settings::new(),
    };
    info!("{} starting, settings at {}", APP_ID, settings.path().display());

    let command = match args.command {
        Command::Settings { action } => return Ok(update_settings(&mut settings, action)),
        other => other,
    };
    let app = App::new(settings.get().clone(), &args.elevator)?;

    if command.is_privileged() && !args.no_polkit && !polkit::ensure_rule(&app.store, app.runner.as_ref()) {
        warn!("polkit rule not installed, expect repeated password prompts");
    }

    match command {
        Command::Status => status(&app),
        Command::Firewall { action } => firewall(&app, action),
        Command::Port { action } => port(&app, action),
        Command::Service { action } => service(&app, action),
        Command::Zone { action } => zone(&app, action),
        Command::Network { action } => network(&app, action),
        Command::Watch => watch(&app),
        Command::Scan { path, quarantine } => scan(&app, path, quarantine),
        Command::Update => {
            let orch = app.orchestrator();
            Ok(app.run_task(|| orch.update()).is_success())
        }
        Command::Install => {
            let orch = app.orchestrator();
            Ok(app.run_task(|| orch.install()).is_success())
        }
        Command::Daemon { state } => Ok(app.daemons().set_daemon_state(matches!(state, Toggle::On))),
        Command::Guard { state } => Ok(app.daemons().set_guard_state(matches!(state, Toggle::On))),
        Command::Quarantine { action } => quarantine(&app, action),
        Command::Settings { .. } => Ok(true),
    }
}

fn update_settings(settings: &mut Settings, action: SettingsCmd) -> bool {
    match action {
        SettingsCmd::Show => {
            let s = settings.get();
            println!("File:             {}", settings.path().display());
            println!("Poll interval:    {}s", s.zone_poll_secs);
            println!("On-access path:   {}", s.on_access_watch_path.display());
            println!("Quarantine dir:   {}", s.quarantine_dir.display());
            println!("Daemon readiness: {} x {}ms", s.daemon_ready_attempts, s.daemon_ready_interval_ms);
        }
        SettingsCmd::WatchPath { path } => settings.set_on_access_watch_path(path),
        SettingsCmd::PollInterval { secs } => settings.set_zone_poll_secs(secs),
    }
    true
}

fn status(app: &App) -> Result<bool> {
    let fw = app.facade.detect();
    println!("Firewall:   {} ({})", fw.kind, if fw.active { "active" } else { "inactive" });
    if !fw.details.is_empty() {
        println!("            {}", fw.details);
    }
    if let Some(zone) = app.facade.active_zone() {
        println!("Zone:       {} ({})", zone, zone.description());
    }

    let orch = app.orchestrator();
    match orch.engine_version() {
        Some(v) => println!("Antivirus:  {}", v.label),
        None if orch.engine_installed() => println!("Antivirus:  installed"),
        None => println!("Antivirus:  not installed"),
    }
    let daemons = app.daemons();
    println!("Daemon:     {}", if daemons.is_daemon_active() { "running" } else { "stopped" });
    println!("On-access:  {}", if daemons.is_guard_active() { "running" } else { "stopped" });
    println!("Quarantine: {} item(s)", app.quarantine().list().len());
    Ok(true)
}

fn backend_or_detected(app: &App, arg: Option<BackendArg>) -> Result<BackendKind> {
    match arg {
        Some(arg) => Ok(arg.into()),
        None => match app.facade.detect().kind {
            BackendKind::None => bail!("No firewall backend installed"),
            kind => Ok(kind),
        },
    }
}

fn firewall(app: &App, action: FirewallCmd) -> Result<bool> {
    match action {
        FirewallCmd::Enable { backend } => Ok(app.facade.set_state(backend_or_detected(app, backend)?, true)),
        FirewallCmd::Disable { backend } => Ok(app.facade.set_state(backend_or_detected(app, backend)?, false)),
        FirewallCmd::Install { backend } => {
            let kind = backend.map(BackendKind::from).unwrap_or_else(|| app.facade.recommended_backend());
            info!("Installing {}", kind);
            Ok(app.facade.install_backend(kind))
        }
    }
}

fn port(app: &App, action: PortCmd) -> Result<bool> {
    match action {
        PortCmd::List { outbound } => {
            let rules = if outbound {
                app.facade.outbound_rules()?
            } else {
                app.facade.inbound_rules()?
            };
            for entry in rules {
                let r = &entry.rule;
                let name = if entry.label.is_empty() {
                    r.well_known_service().unwrap_or("").to_string()
                } else {
                    entry.label.clone()
                };
                println!(
                    "{:>5}/{:<3}  {:<6}  {:<16}  {}",
                    r.port,
                    r.protocol.as_str(),
                    r.action.label(),
                    r.source_label,
                    name
                );
            }
            Ok(true)
        }
        PortCmd::Add { port: (port, protocol), outbound, target, label } => {
            Ok(app.facade.add_rule(direction(outbound), port, protocol, target, &label))
        }
        PortCmd::Remove { port: (port, protocol), outbound } => {
            Ok(app.facade.remove_rule(direction(outbound), port, protocol))
        }
        PortCmd::Label { port: (port, protocol), label, outbound } => {
            Ok(app.facade.rename_rule(&RuleKey::new(direction(outbound), port, protocol), &label))
        }
    }
}

fn service(app: &App, action: ServiceCmd) -> Result<bool> {
    let mode = |blocked: bool| if blocked { ServiceMode::Block } else { ServiceMode::Allow };
    match action {
        ServiceCmd::List { blocked } => {
            for entry in app.facade.services(mode(blocked))? {
                println!("{:<20} {:<8} {}", entry.name, entry.risk_level(), entry.human_description());
            }
            Ok(true)
        }
        ServiceCmd::Available => {
            for name in app.facade.available_services()? {
                println!("{}", name);
            }
            Ok(true)
        }
        ServiceCmd::Add { name, blocked } => Ok(app.facade.manage_service(PortOp::Add, &name, mode(blocked))),
        ServiceCmd::Remove { name, blocked } => Ok(app.facade.manage_service(PortOp::Remove, &name, mode(blocked))),
    }
}

fn zone(app: &App, action: ZoneCmd) -> Result<bool> {
    if !app.facade.supports_zones() {
        bail!("The active firewall backend has no zones");
    }
    match action {
        ZoneCmd::Get => {
            let zone = app.facade.active_zone().ok_or_else(|| anyhow!("Could not read the active zone"))?;
            println!("{}", zone);
            Ok(true)
        }
        ZoneCmd::Set { zone } => Ok(app.facade.set_active_zone(&zone)),
    }
}

fn network(app: &App, action: NetworkCmd) -> Result<bool> {
    match action {
        NetworkCmd::List => {
            for (name, bucket) in app.store.known_networks() {
                println!("{:<32} {}", name, bucket.as_str());
            }
            Ok(true)
        }
        NetworkCmd::Assign { name, trust } => Ok(app.store.set_network_bucket(&name, trust.into())),
        NetworkCmd::Forget { name } => Ok(app.store.forget_network(&name)),
    }
}

fn watch(app: &App) -> Result<bool> {
    let mut identity = NetworkManagerSource::new(app.runner.clone());
    if let Err(e) = identity.connect() {
        warn!("NetworkManager D-Bus unavailable, using nmcli: {:#}", e);
    }

    let reconciler = Arc::new(ZoneReconciler::new(
        app.facade.clone(),
        Arc::new(identity),
        Arc::new(TerminalPrompt),
    ));
    let mut events = reconciler.subscribe();
    let interval = app.settings.zone_poll_interval();
    info!("Watching network changes every {}s", interval.as_secs());
    let handle = reconciler.spawn(interval);

    app.runtime.block_on(async {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(ZoneEvent::Changed { network, zone }) => {
                        println!("{} -> {} zone", network, zone);
                    }
                    Err(RecvError::Lagged(n)) => warn!("Missed {} zone event(s)", n),
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }
    });

    handle.stop();
    Ok(true)
}

fn scan(app: &App, path: PathBuf, quarantine: bool) -> Result<bool> {
    let orch = app.orchestrator();
    if !orch.engine_installed() {
        bail!("ClamAV is not installed, run `sentinel-center install` first");
    }

    match app.run_task(|| orch.scan(&path)) {
        Outcome::Success(report) => {
            if report.is_clean() {
                println!("No threats found");
                return Ok(true);
            }
            println!("{} infected file(s):", report.infected.len());
            for file in &report.infected {
                println!("  {}", file.display());
            }
            if quarantine {
                let moved = app.quarantine().quarantine_all(&report.infected);
                println!("Quarantined {} of {}", moved, report.infected.len());
            }
            Ok(true)
        }
        Outcome::Failure(reason) => Err(anyhow!("Scan failed: {}", reason)),
        Outcome::Cancelled => {
            println!("Scan cancelled");
            Ok(false)
        }
    }
}

fn quarantine(app: &App, action: QuarantineCmd) -> Result<bool> {
    let store = app.quarantine();
    match action {
        QuarantineCmd::List => {
            for item in store.list() {
                let when = item
                    .stored_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("{:<40} {:<16} {}", item.id, when, item.original_path);
            }
            Ok(true)
        }
        QuarantineCmd::Add { paths } => Ok(store.quarantine_all(&paths) == paths.len()),
        QuarantineCmd::Restore { id } => Ok(store.restore(&id)),
        QuarantineCmd::Purge { id } => Ok(store.purge(&id)),
    }
}
