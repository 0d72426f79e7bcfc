// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Child process launching.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use crate::types::{ProcessName, Role};

/// Everything needed to start one child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub index: usize,
    pub name: ProcessName,
    pub role: Role,
    /// Full argument list, role subcommand first.
    pub args: Vec<String>,
}

/// Starts child processes for the orchestrator.
pub trait Launcher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<Child>;
}

/// Launches `program` with the slot's argument list.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: PathBuf,
}

impl CommandLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Re-invoke the running executable.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Launcher for CommandLauncher {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<Child> {
        let child = Command::new(&self.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;

        tracing::debug!(
            slot = %spec.name,
            role = %spec.role,
            pid = child.id(),
            program = %self.program.display(),
            "Launched child"
        );
        Ok(child)
    }
}
