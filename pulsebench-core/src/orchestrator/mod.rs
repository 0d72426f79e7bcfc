// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Process orchestrator.
//!
//! Owns every child of a run from spawn to reap:
//! - one signal channel per child, created before the child starts
//! - wait until every subscriber has bound its endpoint
//! - `Start` to everyone, then poll publisher channels for `Stop`
//! - once the quorum has stopped, `Stop` to every subscriber
//! - join every child and destroy every channel
//!
//! A failed spawn rolls back everything created so far. A failed or
//! cancelled quorum wait still stops, joins and cleans up before the error
//! is returned.

pub mod launcher;
pub mod slot;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;

use crate::cancel::CancelToken;
use crate::config::BenchConfig;
use crate::error::{BenchError, BenchResult, OrchestratorError};
use crate::registry::{ServerEntry, ServerKeyRegistry};
use crate::shm::{SignalChannel, SignalToken};
use crate::types::Role;

pub use launcher::{CommandLauncher, LaunchSpec, Launcher};
pub use slot::{ChildExit, ProcessSlot, SlotState};

/// Poll step while waiting for terminated children.
const REAP_POLL: Duration = Duration::from_millis(10);

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub exits: Vec<ChildExit>,
    /// Publishers that had written `Stop` when subscribers were released.
    pub stopped_publishers: usize,
    pub elapsed: Duration,
}

impl RunOutcome {
    /// Children that exited with a failure status.
    pub fn failures(&self) -> impl Iterator<Item = &ChildExit> {
        self.exits.iter().filter(|exit| !exit.success)
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Spawns, synchronizes and reaps the processes of one run.
pub struct Orchestrator<L: Launcher> {
    config: BenchConfig,
    run_dir: PathBuf,
    registry: ServerKeyRegistry,
    channel_prefix: String,
    launcher: L,
    cancel: CancelToken,
}

impl<L: Launcher> Orchestrator<L> {
    /// Plan a run in `run_dir`.
    ///
    /// Endpoints live in a per-orchestrator directory below the configured
    /// socket directory so concurrent runs never share a socket path.
    pub fn new(config: &BenchConfig, run_dir: PathBuf, launcher: L, cancel: CancelToken) -> Self {
        let pid = std::process::id();
        let socket_dir = config
            .orchestrator
            .socket_dir
            .join(format!("run-{}", pid));
        let registry = ServerKeyRegistry::build(config.orchestrator.processes, socket_dir);

        Self {
            config: config.clone(),
            run_dir,
            registry,
            channel_prefix: format!("pulsebench-{}", pid),
            launcher,
            cancel,
        }
    }

    /// Replace the prefix of every signal channel name.
    pub fn with_channel_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.channel_prefix = prefix.into();
        self
    }

    pub fn registry(&self) -> &ServerKeyRegistry {
        &self.registry
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Shared memory name of the channel for `entry`.
    pub fn channel_name(&self, entry: &ServerEntry) -> String {
        format!(
            "{}-{}-{}",
            self.channel_prefix,
            entry.role.prefix(),
            entry.name
        )
    }

    /// Argument list for the child behind `entry`.
    pub fn child_args(&self, entry: &ServerEntry) -> Vec<String> {
        let run = &self.config.run;
        let orch = &self.config.orchestrator;
        let subcommand = match entry.role {
            Role::Publisher => "publish",
            Role::Subscriber => "subscribe",
        };

        let mut args = vec![
            subcommand.to_string(),
            "--identity".to_string(),
            entry.name.to_string(),
            "--channel".to_string(),
            self.channel_name(entry),
            "--run-dir".to_string(),
            self.run_dir.to_string_lossy().into_owned(),
            "--loops".to_string(),
            run.loops.to_string(),
            "--message-size".to_string(),
            run.message_size.to_string(),
            "--processes".to_string(),
            orch.processes.to_string(),
            "--socket-dir".to_string(),
            self.registry.socket_dir().to_string_lossy().into_owned(),
            "--poll-interval-us".to_string(),
            orch.poll_interval.as_micros().to_string(),
        ];
        if entry.role == Role::Publisher {
            args.push("--pause-us".to_string());
            args.push(self.config.publisher.pause.as_micros().to_string());
        }
        for topic in &run.topics {
            args.push("--topic".to_string());
            args.push(topic.to_string());
        }
        args
    }

    /// Execute the run: spawn, start, wait for the quorum, stop, join,
    /// clean up.
    pub fn run(&self) -> BenchResult<RunOutcome> {
        let started = Instant::now();
        std::fs::create_dir_all(self.registry.socket_dir()).map_err(|source| BenchError::Io {
            context: "creating socket directory",
            source,
        })?;

        let result = self.run_slots(started);

        if let Err(e) = std::fs::remove_dir_all(self.registry.socket_dir()) {
            tracing::debug!(
                dir = %self.registry.socket_dir().display(),
                error = %e,
                "Socket directory not removed"
            );
        }
        result
    }

    fn run_slots(&self, started: Instant) -> BenchResult<RunOutcome> {
        let mut slots = self.spawn_all()?;
        tracing::info!(
            processes = slots.len(),
            quorum = self.config.orchestrator.quorum,
            "All children spawned"
        );

        let phase = self
            .await_subscribers(&mut slots)
            .and_then(|()| self.start_all(&mut slots))
            .and_then(|()| self.await_quorum(&mut slots));

        self.stop_subscribers(&mut slots);
        if phase.is_err() {
            self.terminate(&mut slots);
        }
        let exits = self.join_all(&mut slots);
        let released = self.release_channels(&mut slots);
        tracing::debug!(released, "Channels released");

        let stopped_publishers = phase?;
        let outcome = RunOutcome {
            exits,
            stopped_publishers,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            failures = outcome.failures().count(),
            "Run complete"
        );
        Ok(outcome)
    }

    /// Create a channel and launch a child for every registry entry.
    fn spawn_all(&self) -> Result<Vec<ProcessSlot>, OrchestratorError> {
        let mut slots: Vec<ProcessSlot> = Vec::with_capacity(self.registry.len());

        for entry in self.registry.entries() {
            let channel = match SignalChannel::create(&self.channel_name(entry)) {
                Ok(channel) => channel,
                Err(source) => {
                    let (rolled_back, released) = self.rollback(&mut slots, None);
                    tracing::error!(
                        slot = %entry.name,
                        rolled_back,
                        released,
                        "Channel creation failed"
                    );
                    return Err(OrchestratorError::Channel {
                        index: entry.index,
                        source,
                    });
                }
            };

            let spec = LaunchSpec {
                index: entry.index,
                name: entry.name.clone(),
                role: entry.role,
                args: self.child_args(entry),
            };
            match self.launcher.launch(&spec) {
                Ok(child) => {
                    slots.push(ProcessSlot::new(
                        entry.index,
                        entry.name.clone(),
                        entry.role,
                        child,
                        channel,
                    ));
                }
                Err(e) => {
                    let (rolled_back, channels_released) =
                        self.rollback(&mut slots, Some(channel));
                    tracing::error!(
                        slot = %entry.name,
                        error = %e,
                        rolled_back,
                        channels_released,
                        "Spawn failed, run aborted"
                    );
                    return Err(OrchestratorError::Spawn {
                        index: entry.index,
                        name: entry.name.to_string(),
                        reason: e.to_string(),
                        rolled_back,
                        channels_released,
                    });
                }
            }
        }

        Ok(slots)
    }

    /// Terminate and reap every spawned child, then destroy their channels
    /// plus `pending`. Returns `(children rolled back, channels released)`.
    fn rollback(
        &self,
        slots: &mut Vec<ProcessSlot>,
        pending: Option<SignalChannel>,
    ) -> (usize, usize) {
        self.terminate(slots);
        let rolled_back = self.join_all(slots).len();
        let mut released = self.release_channels(slots);
        if let Some(channel) = pending {
            released += usize::from(destroy_channel(channel));
        }
        slots.clear();
        (rolled_back, released)
    }

    /// Poll until every subscriber endpoint exists, so no publisher sends
    /// into a socket that is not bound yet.
    fn await_subscribers(&self, slots: &mut [ProcessSlot]) -> Result<(), OrchestratorError> {
        let orch = &self.config.orchestrator;
        let keys = self.registry.all_keys_for_role(Role::Subscriber);
        let total = keys.len();
        let started = Instant::now();

        loop {
            let ready = keys.iter().filter(|key| key.as_path().exists()).count();
            if ready == total {
                tracing::info!(
                    subscribers = total,
                    waited_us = started.elapsed().as_micros() as u64,
                    "All subscribers ready"
                );
                return Ok(());
            }

            for slot in slots.iter_mut().filter(|s| s.role() == Role::Subscriber) {
                let bound = self
                    .registry
                    .get(slot.name())
                    .is_some_and(|entry| entry.key.as_path().exists());
                if !bound && slot.has_exited() {
                    return Err(OrchestratorError::SubscriberExited {
                        name: slot.name().to_string(),
                    });
                }
            }
            if self.cancel.is_cancelled() {
                return Err(OrchestratorError::CancelledBeforeStart { ready, total });
            }
            if started.elapsed() >= orch.ready_timeout {
                return Err(OrchestratorError::SubscribersNotReady {
                    ready,
                    total,
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            std::thread::sleep(orch.poll_interval);
        }
    }

    fn start_all(&self, slots: &mut [ProcessSlot]) -> Result<(), OrchestratorError> {
        for slot in slots.iter_mut() {
            if let Some(channel) = slot.channel() {
                channel.write(SignalToken::Start);
            }
            slot.transition_to(SlotState::Running)?;
        }
        tracing::info!("Start written to all channels");
        Ok(())
    }

    /// Poll publisher channels until `quorum` of them read `Stop`.
    fn await_quorum(&self, slots: &mut [ProcessSlot]) -> Result<usize, OrchestratorError> {
        let orch = &self.config.orchestrator;
        let quorum = orch.quorum;
        let started = Instant::now();

        loop {
            let mut stopped = 0;
            let mut exited = 0;
            for slot in slots.iter_mut().filter(|s| s.role() == Role::Publisher) {
                let is_stopped = slot
                    .channel()
                    .is_some_and(|channel| channel.is(SignalToken::Stop));
                if is_stopped {
                    stopped += 1;
                    if slot.state() == SlotState::Running {
                        slot.transition_to(SlotState::Stopping)?;
                        tracing::info!(slot = %slot.name(), "Publisher stopped");
                    }
                } else if slot.has_exited() {
                    exited += 1;
                }
            }

            if stopped >= quorum {
                tracing::info!(stopped, quorum, "Publisher quorum reached");
                return Ok(stopped);
            }
            // Publishers that exited without Stop will never write it.
            if orch.publishers() - exited < quorum {
                return Err(OrchestratorError::QuorumUnreachable {
                    quorum,
                    stopped,
                    exited,
                });
            }
            if self.cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled { quorum, stopped });
            }
            if let Some(limit) = orch.stop_timeout {
                if started.elapsed() >= limit {
                    return Err(OrchestratorError::QuorumTimeout {
                        quorum,
                        stopped,
                        waited_ms: started.elapsed().as_millis() as u64,
                    });
                }
            }
            std::thread::sleep(orch.poll_interval);
        }
    }

    fn stop_subscribers(&self, slots: &mut [ProcessSlot]) {
        for slot in slots.iter_mut().filter(|s| s.role() == Role::Subscriber) {
            if let Some(channel) = slot.channel() {
                channel.write(SignalToken::Stop);
            }
            if slot.state() == SlotState::Running {
                // Running → Stopping is always valid.
                let _ = slot.transition_to(SlotState::Stopping);
            }
        }
        tracing::info!("Stop written to subscriber channels");
    }

    /// SIGTERM every live child, then SIGKILL whatever outlives the grace
    /// period.
    fn terminate(&self, slots: &mut [ProcessSlot]) {
        for slot in slots.iter_mut() {
            slot.signal(Signal::SIGTERM);
        }

        let deadline = Instant::now() + self.config.orchestrator.term_grace;
        while Instant::now() < deadline && slots.iter_mut().any(|s| !s.has_exited()) {
            std::thread::sleep(REAP_POLL);
        }

        for slot in slots.iter_mut() {
            if !slot.has_exited() {
                tracing::warn!(
                    slot = %slot.name(),
                    pid = slot.pid(),
                    "Child ignored SIGTERM, killing"
                );
                slot.signal(Signal::SIGKILL);
            }
        }
    }

    fn join_all(&self, slots: &mut [ProcessSlot]) -> Vec<ChildExit> {
        slots.iter_mut().map(ProcessSlot::wait).collect()
    }

    fn release_channels(&self, slots: &mut [ProcessSlot]) -> usize {
        slots
            .iter_mut()
            .filter_map(ProcessSlot::take_channel)
            .map(destroy_channel)
            .filter(|released| *released)
            .count()
    }
}

fn destroy_channel(channel: SignalChannel) -> bool {
    let name = channel.name().to_string();
    match channel.destroy() {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(channel = %name, error = %e, "Channel destroy failed");
            false
        }
    }
}
