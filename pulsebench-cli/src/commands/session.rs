// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `pulsebench session` command - session setup costs.

use std::path::PathBuf;

use pulsebench_core::config::{ConfigLoader, ConfigOverrides, MAX_TOPICS};
use pulsebench_core::error::BenchError;
use pulsebench_core::runner::SessionBenchmark;
use pulsebench_core::stats::{self, Stats};
use pulsebench_core::CancelToken;

use super::blocking;

pub async fn execute(
    loops: u32,
    message_size: usize,
    topics: usize,
    socket_dir: Option<PathBuf>,
    cancel: CancelToken,
) -> Result<(), Box<dyn std::error::Error>> {
    // Same limits as a full run
    let config = ConfigLoader::from_overrides(&ConfigOverrides {
        loops: Some(loops),
        message_size: Some(message_size),
        topics: Some(topics.min(MAX_TOPICS)),
        socket_dir,
        ..Default::default()
    })?;
    let socket_dir = config
        .orchestrator
        .socket_dir
        .join(format!("session-{}", std::process::id()));

    tracing::info!(
        loops,
        topics = config.run.topics.len(),
        socket_dir = %socket_dir.display(),
        "Starting session benchmark"
    );

    let report = blocking(move || {
        std::fs::create_dir_all(&socket_dir).map_err(|source| BenchError::Io {
            context: "creating socket directory",
            source,
        })?;
        let bench = SessionBenchmark::new(
            &socket_dir,
            config.run.loops,
            config.run.message_size,
            config.run.topics,
        );
        let report = bench.run(&cancel);
        let _ = std::fs::remove_dir_all(&socket_dir);
        report
    })
    .await?;

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              PULSEBENCH SESSION COSTS                        ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!("{}", stats::report_header());
    let unset = Stats::default();
    for (name, computed) in report.stats() {
        println!("{}", stats::report_row(name, computed.as_ref().unwrap_or(&unset)));
    }
    Ok(())
}
