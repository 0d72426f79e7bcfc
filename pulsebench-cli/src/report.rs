// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Run report: terminal table and optional JSON file.

use std::path::{Path, PathBuf};

use serde::Serialize;

use pulsebench_core::error::{BenchError, BenchResult};
use pulsebench_core::orchestrator::ChildExit;
use pulsebench_core::stats::{self, Stats};
use pulsebench_core::store::RunSamples;
use pulsebench_core::BenchmarkRun;

/// File name of the JSON report inside a run directory.
pub const JSON_REPORT: &str = "report.json";

/// Aggregated statistics of one run directory.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<BenchmarkRun>,
    pub publish: Option<Stats>,
    pub subscribe: Option<Stats>,
    pub publish_samples: usize,
    pub subscribe_samples: usize,
    pub files: usize,
    pub malformed_lines: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exits: Vec<ChildExit>,
}

impl RunReport {
    pub fn from_samples(run_dir: &Path, samples: &RunSamples) -> Self {
        Self {
            run_dir: run_dir.to_path_buf(),
            run: None,
            publish: stats::compute(&samples.publish),
            subscribe: stats::compute(&samples.subscribe),
            publish_samples: samples.publish.len(),
            subscribe_samples: samples.subscribe.len(),
            files: samples.files.len(),
            malformed_lines: samples.malformed,
            exits: Vec::new(),
        }
    }

    pub fn with_run(mut self, run: BenchmarkRun) -> Self {
        self.run = Some(run);
        self
    }

    pub fn with_exits(mut self, exits: Vec<ChildExit>) -> Self {
        self.exits = exits;
        self
    }

    pub fn print(&self) {
        let title = self
            .run_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        println!();
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║ PULSEBENCH RUN {:<46}║", title);
        println!("╚══════════════════════════════════════════════════════════════╝");
        if let Some(run) = &self.run {
            println!("  Started: {}", run.started_at.format("%Y-%m-%d %H:%M:%S"));
            println!(
                "  Loops: {}  Message: {} B  Topics: {}  Processes: {}",
                run.loop_count, run.message_size, run.topic_count, run.process_count
            );
        }
        println!(
            "  Files: {}  Publish samples: {}  Subscribe samples: {}  Malformed lines: {}",
            self.files, self.publish_samples, self.subscribe_samples, self.malformed_lines
        );
        println!();

        println!("{}", stats::report_header());
        let unset = Stats::default();
        println!(
            "{}",
            stats::report_row("publish", self.publish.as_ref().unwrap_or(&unset))
        );
        println!(
            "{}",
            stats::report_row("subscribe", self.subscribe.as_ref().unwrap_or(&unset))
        );
        println!();

        for (label, computed) in [("publish", &self.publish), ("subscribe", &self.subscribe)] {
            match computed.as_ref().and_then(|s| s.median.zip(s.p99)) {
                Some((median, p99)) => println!(
                    "  ● {:<10} median {:>10}   p99 {:>10}",
                    label,
                    stats::format_seconds(median),
                    stats::format_seconds(p99)
                ),
                None => println!("  ○ {:<10} not enough samples", label),
            }
        }

        for exit in self.exits.iter().filter(|e| !e.success) {
            let status = match exit.code {
                Some(code) => format!("exit code {}", code),
                None => "killed by signal".to_string(),
            };
            println!("  ✗ {} ({}, pid {}) {}", exit.name, exit.role, exit.pid, status);
        }
    }

    /// Write the report as pretty JSON into the run directory.
    pub fn write_json(&self) -> BenchResult<PathBuf> {
        let path = self.run_dir.join(JSON_REPORT);
        let json = serde_json::to_string_pretty(self).map_err(|e| BenchError::Io {
            context: "serializing report",
            source: e.into(),
        })?;
        std::fs::write(&path, json).map_err(|source| BenchError::Io {
            context: "writing report.json",
            source,
        })?;
        tracing::info!(path = %path.display(), "Wrote JSON report");
        Ok(path)
    }
}
