// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `pulsebench report` command - statistics of an existing run.

use std::path::PathBuf;

use pulsebench_core::store;
use pulsebench_core::{BenchmarkRun, RunDirectoryManager};

use super::CliError;
use crate::report::RunReport;

pub async fn execute(
    run_dir: Option<PathBuf>,
    root: PathBuf,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let run_dir = match run_dir {
        Some(dir) => dir,
        None => RunDirectoryManager::new(&root)
            .latest_run()?
            .ok_or_else(|| CliError::NoRuns { root: root.clone() })?,
    };
    tracing::info!(run_dir = %run_dir.display(), "Aggregating run");

    let samples = store::collect_run(&run_dir)?;
    let mut report = RunReport::from_samples(&run_dir, &samples);
    if let Some(run) = BenchmarkRun::load_manifest(&run_dir)? {
        report = report.with_run(run);
    }
    report.print();
    if json {
        report.write_json()?;
    }
    Ok(())
}
