// Sentinel Center - Antivirus Module
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! ClamAV engine, daemon and quarantine management.

pub mod clamd_conf;
mod daemon;
mod orchestrator;
mod quarantine;
mod task;

pub use daemon::{DaemonLifecycleCoordinator, DAEMON_SERVICE, DAEMON_SOCKET, GUARD_UNITS};
pub use orchestrator::{parse_found_line, EngineCommands, EngineVersion, ScanOrchestrator, ScanReport};
pub use quarantine::{QuarantineItem, QuarantineStore, UNKNOWN_ORIGIN};
pub use task::{Canceller, Outcome, TaskContext, TaskEvent, TaskHandle};
