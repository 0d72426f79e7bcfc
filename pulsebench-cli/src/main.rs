// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Pulsebench CLI
//!
//! Command-line interface for the pulsebench latency harness. The same
//! binary is re-invoked by the orchestrator for every child process.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pulsebench_core::CancelToken;

mod commands;
mod report;

use commands::RoleArgs;

/// Pulsebench - multi-process publish/subscribe latency benchmark
#[derive(Parser)]
#[command(name = "pulsebench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a multi-process benchmark and print its statistics
    Run {
        /// Loop iterations per publisher
        loops: Option<u32>,

        /// Payload size in bytes
        message_size: Option<usize>,

        /// Number of topics (capped at 15)
        topics: Option<usize>,

        /// Number of processes, alternating publisher/subscriber
        #[arg(long)]
        processes: Option<usize>,

        /// Publishers that must finish before subscribers are stopped
        #[arg(long)]
        quorum: Option<usize>,

        /// Directory holding run directories
        #[arg(long)]
        root: Option<PathBuf>,

        /// Directory for transport endpoints
        #[arg(long)]
        socket_dir: Option<PathBuf>,

        /// Signal channel poll interval in microseconds
        #[arg(long)]
        poll_interval_us: Option<u64>,

        /// Give up waiting for the publisher quorum after this many seconds
        #[arg(long)]
        stop_timeout_secs: Option<u64>,

        /// Also write report.json into the run directory
        #[arg(long)]
        json: bool,

        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Publisher child entry point
    #[command(hide = true)]
    Publish {
        #[command(flatten)]
        role: RoleArgs,

        /// Pause between loop iterations in microseconds
        #[arg(long, default_value_t = 10)]
        pause_us: u64,
    },

    /// Subscriber child entry point
    #[command(hide = true)]
    Subscribe {
        #[command(flatten)]
        role: RoleArgs,
    },

    /// Measure session open/close, first publish and (un)subscribe costs
    Session {
        /// Loop iterations
        #[arg(default_value_t = 20)]
        loops: u32,

        /// Payload size in bytes
        #[arg(default_value_t = 100)]
        message_size: usize,

        /// Number of topics (capped at 15)
        #[arg(default_value_t = 10)]
        topics: usize,

        /// Directory for the session endpoint
        #[arg(long)]
        socket_dir: Option<PathBuf>,
    },

    /// Print statistics of an existing run
    Report {
        /// Run directory (latest run under --root by default)
        run_dir: Option<PathBuf>,

        /// Directory holding run directories
        #[arg(long, default_value = "benchmarks")]
        root: PathBuf,

        /// Also write report.json into the run directory
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG takes precedence over the flag.
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancelToken::new();
    commands::spawn_signal_bridge(cancel.clone())?;

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            loops,
            message_size,
            topics,
            processes,
            quorum,
            root,
            socket_dir,
            poll_interval_us,
            stop_timeout_secs,
            json,
            config,
        } => {
            let options = commands::run::RunOptions {
                loops,
                message_size,
                topics,
                processes,
                quorum,
                root,
                socket_dir,
                poll_interval_us,
                stop_timeout_secs,
                json,
                config,
            };
            commands::run::execute(options, cancel).await
        }
        Commands::Publish { role, pause_us } => {
            commands::publish::execute(role, pause_us, cancel).await
        }
        Commands::Subscribe { role } => commands::subscribe::execute(role, cancel).await,
        Commands::Session {
            loops,
            message_size,
            topics,
            socket_dir,
        } => commands::session::execute(loops, message_size, topics, socket_dir, cancel).await,
        Commands::Report {
            run_dir,
            root,
            json,
        } => commands::report::execute(run_dir, root, json).await,
    }
}
