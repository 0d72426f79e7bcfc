// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Per-process benchmark loops.
//!
//! A child process runs exactly one of [`Publisher`] or [`Subscriber`]. Both
//! block on their signal channel until the orchestrator writes `Start`, and
//! both leave their samples in the run directory before exiting.
//! [`session`] measures session setup costs in-process.

pub mod payload;
pub mod publisher;
pub mod session;
pub mod subscriber;

use std::path::PathBuf;
use std::time::Duration;

use crate::store;
use crate::types::{ProcessName, Role, Topic};

pub use publisher::{Publisher, PublisherReport};
pub use session::{SessionBenchmark, SessionReport};
pub use subscriber::{Subscriber, SubscriberReport};

/// Inputs shared by both child roles.
#[derive(Debug, Clone)]
pub struct RoleParams {
    pub identity: ProcessName,
    pub run_dir: PathBuf,
    pub loops: u32,
    pub message_size: usize,
    pub topics: Vec<Topic>,
    pub poll_interval: Duration,
}

impl RoleParams {
    /// Sample file this process writes when acting as `role`.
    pub fn sample_path(&self, role: Role) -> PathBuf {
        self.run_dir
            .join(store::sample_file_name(role, &self.identity))
    }
}
