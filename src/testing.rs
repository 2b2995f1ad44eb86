// Sentinel Center - Test Doubles
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Scripted command runner and in-memory service manager for unit tests.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::Result;

use crate::privilege::{CommandOutput, CommandRunner};
use crate::systemd::{ServiceManager, UnitAction};

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub command: String,
    pub privileged: bool,
    pub stdin: Option<String>,
}

/// Answers commands from a script keyed by command-line prefix.
///
/// The longest matching prefix wins; unmatched commands succeed with no
/// output.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<Vec<(String, CommandOutput)>>,
    programs: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `program` as present on `PATH`.
    pub fn with_program(self, program: &str) -> Self {
        self.programs.lock().unwrap().insert(program.to_string());
        self
    }

    pub fn respond(&self, prefix: &str, output: CommandOutput) {
        let mut responses = self.responses.lock().unwrap();
        responses.retain(|(p, _)| p != prefix);
        responses.push((prefix.to_string(), output));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn privileged_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.privileged)
            .map(|c| c.command)
            .collect()
    }

    /// Stdin fed to the `index`-th privileged call.
    pub fn stdin_of(&self, index: usize) -> Option<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.privileged)
            .nth(index)
            .and_then(|c| c.stdin)
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn answer(&self, argv: &[&str], privileged: bool, stdin: Option<&[u8]>) -> CommandOutput {
        let command = argv.join(" ");
        self.calls.lock().unwrap().push(Call {
            command: command.clone(),
            privileged,
            stdin: stdin.map(|s| String::from_utf8_lossy(s).into_owned()),
        });

        self.responses
            .lock()
            .unwrap()
            .iter()
            .filter(|(prefix, _)| command.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, output)| output.clone())
            .unwrap_or_default()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, argv: &[&str]) -> Result<CommandOutput> {
        Ok(self.answer(argv, false, None))
    }

    fn run_privileged(&self, argv: &[&str], stdin: Option<&[u8]>) -> Result<CommandOutput> {
        Ok(self.answer(argv, true, stdin))
    }

    fn program_exists(&self, program: &str) -> bool {
        self.programs.lock().unwrap().contains(program)
    }
}

/// In-memory unit states. Control calls are recorded and applied.
#[derive(Default)]
pub struct FakeServices {
    active: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, unit: &str, active: bool) {
        let mut set = self.active.lock().unwrap();
        if active {
            set.insert(unit.to_string());
        } else {
            set.remove(unit);
        }
    }

    /// Make every control call naming `unit` fail.
    pub fn fail_on(&self, unit: &str) {
        self.failing.lock().unwrap().insert(unit.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ServiceManager for FakeServices {
    fn is_active(&self, unit: &str) -> bool {
        self.active.lock().unwrap().contains(unit)
    }

    fn control(&self, action: UnitAction, units: &[&str]) -> bool {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", action.args().join(" "), units.join(" ")));

        let failing = self.failing.lock().unwrap();
        if units.iter().any(|u| failing.contains(*u)) {
            return false;
        }
        drop(failing);

        for unit in units {
            match action {
                UnitAction::Start | UnitAction::Restart | UnitAction::EnableNow => {
                    self.set_active(unit, true)
                }
                UnitAction::Stop | UnitAction::DisableNow => self.set_active(unit, false),
                _ => {}
            }
        }
        true
    }
}
