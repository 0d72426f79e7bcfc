// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

pub mod publish;
pub mod report;
pub mod run;
pub mod session;
pub mod subscribe;

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use thiserror::Error;
use pulsebench_core::error::{BenchResult, ConfigError};
use pulsebench_core::registry::{ServerEntry, ServerKeyRegistry};
use pulsebench_core::runner::RoleParams;
use pulsebench_core::{CancelToken, ProcessName, Role, Topic};

/// Failures reported by the CLI itself after the core succeeded.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{failed} of {total} benchmark processes failed")]
    ChildFailures { failed: usize, total: usize },

    #[error("No run directories under {root}")]
    NoRuns { root: PathBuf },
}

/// Arguments every child receives from the orchestrator.
#[derive(Args, Debug, Clone)]
pub struct RoleArgs {
    /// Process identity (appN)
    #[arg(long)]
    pub identity: String,

    /// Shared memory signal channel name
    #[arg(long)]
    pub channel: String,

    /// Run directory for the sample file
    #[arg(long)]
    pub run_dir: PathBuf,

    #[arg(long)]
    pub loops: u32,

    #[arg(long)]
    pub message_size: usize,

    /// Total processes in the run
    #[arg(long)]
    pub processes: usize,

    /// Directory holding every endpoint of the run
    #[arg(long)]
    pub socket_dir: PathBuf,

    #[arg(long, default_value_t = 100)]
    pub poll_interval_us: u64,

    /// Topic to publish on or listen to (repeatable)
    #[arg(long = "topic", required = true)]
    pub topics: Vec<String>,
}

impl RoleArgs {
    /// Validate the arguments and locate this process in the addressing
    /// plan. Fails if the identity is unknown or belongs to the other role.
    pub fn resolve(&self, role: Role) -> BenchResult<(RoleParams, ServerKeyRegistry, ServerEntry)> {
        let identity = ProcessName::new(self.identity.clone())?;
        let topics = self
            .topics
            .iter()
            .map(|t| Topic::new(t.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        let registry = ServerKeyRegistry::build(self.processes, &self.socket_dir);
        let entry = registry
            .get(&identity)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownProcess {
                name: identity.to_string(),
            })?;
        if entry.role != role {
            return Err(ConfigError::InvalidProcessName {
                name: identity.to_string(),
                reason: format!("slot belongs to a {}", entry.role),
            }
            .into());
        }

        let params = RoleParams {
            identity,
            run_dir: self.run_dir.clone(),
            loops: self.loops,
            message_size: self.message_size,
            topics,
            poll_interval: Duration::from_micros(self.poll_interval_us),
        };
        Ok((params, registry, entry))
    }
}

/// Cancel `cancel` on SIGINT or SIGTERM.
pub fn spawn_signal_bridge(cancel: CancelToken) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::warn!("Interrupt received"),
            _ = terminate.recv() => tracing::warn!("Termination requested"),
        }
        cancel.cancel();
    });
    Ok(())
}

/// Run blocking core work off the async runtime.
pub async fn blocking<T, F>(work: F) -> Result<T, Box<dyn std::error::Error>>
where
    F: FnOnce() -> BenchResult<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(work).await??)
}
