// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `pulsebench run` command - orchestrate a full benchmark run.
//!
//! Creates the run directory, spawns publishers and subscribers, waits for
//! the run to finish and prints the aggregated statistics.

use std::path::PathBuf;

use pulsebench_core::config::MAX_TOPICS;
use pulsebench_core::error::BenchError;
use pulsebench_core::store;
use pulsebench_core::{
    BenchmarkRun, CancelToken, CommandLauncher, ConfigLoader, ConfigOverrides, Orchestrator,
    RunDirectoryManager,
};

use super::{blocking, CliError};
use crate::report::RunReport;

/// Options of `pulsebench run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub loops: Option<u32>,
    pub message_size: Option<usize>,
    pub topics: Option<usize>,
    pub processes: Option<usize>,
    pub quorum: Option<usize>,
    pub root: Option<PathBuf>,
    pub socket_dir: Option<PathBuf>,
    pub poll_interval_us: Option<u64>,
    pub stop_timeout_secs: Option<u64>,
    pub json: bool,
    pub config: Option<PathBuf>,
}

impl RunOptions {
    fn overrides(&self) -> ConfigOverrides {
        let topics = self.topics.map(|requested| {
            if requested > MAX_TOPICS {
                tracing::warn!(requested, max = MAX_TOPICS, "Topic count capped");
            }
            requested.min(MAX_TOPICS)
        });

        ConfigOverrides {
            loops: self.loops,
            message_size: self.message_size,
            topics,
            processes: self.processes,
            quorum: self.quorum,
            poll_interval_us: self.poll_interval_us,
            stop_timeout_secs: self.stop_timeout_secs,
            root: self.root.clone(),
            socket_dir: self.socket_dir.clone(),
        }
    }
}

pub async fn execute(
    options: RunOptions,
    cancel: CancelToken,
) -> Result<(), Box<dyn std::error::Error>> {
    // Load and validate configuration - fail fast before anything is spawned
    let overrides = options.overrides();
    let config = match &options.config {
        Some(path) => ConfigLoader::load_file(path, &overrides)?,
        None => ConfigLoader::from_overrides(&overrides)?,
    };

    tracing::info!(
        loops = config.run.loops,
        message_size = config.run.message_size,
        topics = config.run.topics.len(),
        processes = config.orchestrator.processes,
        quorum = config.orchestrator.quorum,
        "Configuration validated successfully"
    );

    let report = blocking(move || {
        let dirs = RunDirectoryManager::new(&config.orchestrator.root);
        let run_dir = dirs.create_run_now()?;
        dirs.retire_stale()?;
        let run = BenchmarkRun::new(&config, run_dir.clone());
        run.write_manifest()?;

        let launcher = CommandLauncher::current_exe().map_err(|source| BenchError::Io {
            context: "locating the pulsebench executable",
            source,
        })?;
        let outcome = Orchestrator::new(&config, run_dir.clone(), launcher, cancel).run()?;

        let samples = store::collect_run(&run_dir)?;
        Ok(RunReport::from_samples(&run_dir, &samples)
            .with_run(run)
            .with_exits(outcome.exits))
    })
    .await?;

    report.print();
    if options.json {
        report.write_json()?;
    }

    let failed = report.exits.iter().filter(|e| !e.success).count();
    if failed > 0 {
        return Err(CliError::ChildFailures {
            failed,
            total: report.exits.len(),
        }
        .into());
    }
    Ok(())
}
