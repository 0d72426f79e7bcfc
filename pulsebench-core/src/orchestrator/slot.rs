// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Process slot with a typed lifecycle.
//!
//! Spawned → Running → Stopping → Exited. Any state may move to Exited
//! once the child has been waited on.

use std::process::{Child, ExitStatus};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::SlotTransitionError;
use crate::shm::SignalChannel;
use crate::types::{ProcessName, Role};

/// Slot lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlotState {
    /// Child launched, waiting for `Start`.
    Spawned,

    /// `Start` written to the slot's channel.
    Running,

    /// `Stop` written or observed on the slot's channel.
    Stopping,

    /// Child waited on.
    Exited,
}

impl SlotState {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Spawned => "Spawned",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Exited => "Exited",
        }
    }

    pub fn can_transition_to(&self, target: SlotState) -> bool {
        matches!(
            (self, target),
            (Self::Spawned, Self::Running)
                | (Self::Running, Self::Stopping)
                | (Self::Spawned | Self::Running | Self::Stopping, Self::Exited)
        )
    }
}

impl std::fmt::Display for SlotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How a child ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildExit {
    pub index: usize,
    pub name: String,
    pub role: Role,
    pub pid: u32,
    /// Exit code, `None` when the child was killed by a signal.
    pub code: Option<i32>,
    pub success: bool,
}

/// One spawned child owned by the orchestrator.
pub struct ProcessSlot {
    index: usize,
    name: ProcessName,
    role: Role,
    child: Child,
    channel: Option<SignalChannel>,
    state: SlotState,
    last_transition: Instant,
}

impl ProcessSlot {
    pub fn new(
        index: usize,
        name: ProcessName,
        role: Role,
        child: Child,
        channel: SignalChannel,
    ) -> Self {
        Self {
            index,
            name,
            role,
            child,
            channel: Some(channel),
            state: SlotState::Spawned,
            last_transition: Instant::now(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &ProcessName {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn time_in_current_state(&self) -> Duration {
        self.last_transition.elapsed()
    }

    /// The slot's signal channel, until it is released.
    pub fn channel(&self) -> Option<&SignalChannel> {
        self.channel.as_ref()
    }

    /// Hand the channel over for destruction.
    pub fn take_channel(&mut self) -> Option<SignalChannel> {
        self.channel.take()
    }

    pub fn transition_to(&mut self, target: SlotState) -> Result<(), SlotTransitionError> {
        if !self.state.can_transition_to(target) {
            return Err(SlotTransitionError::InvalidTransition {
                name: self.name.to_string(),
                from: self.state.name(),
                to: target.name(),
            });
        }

        tracing::debug!(
            slot = %self.name,
            pid = self.pid(),
            from = self.state.name(),
            to = target.name(),
            "Slot transition"
        );

        self.state = target;
        self.last_transition = Instant::now();
        Ok(())
    }

    /// Whether the child has already exited, without blocking.
    pub fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    /// Send `signal` to the child if it is still running.
    pub fn signal(&mut self, signal: nix::sys::signal::Signal) {
        if self.state == SlotState::Exited || self.has_exited() {
            return;
        }
        let pid = nix::unistd::Pid::from_raw(self.pid() as i32);
        if let Err(e) = nix::sys::signal::kill(pid, signal) {
            tracing::warn!(
                slot = %self.name,
                pid = self.pid(),
                signal = ?signal,
                error = %e,
                "Signal delivery failed"
            );
        }
    }

    /// Block until the child exits and record how it ended.
    pub fn wait(&mut self) -> ChildExit {
        let status = self.child.wait();
        if self.state != SlotState::Exited {
            // Every non-Exited state may move to Exited.
            let _ = self.transition_to(SlotState::Exited);
        }
        let (code, success) = match status {
            Ok(status) => {
                if !status.success() {
                    tracing::warn!(
                        slot = %self.name,
                        pid = self.pid(),
                        status = %describe_status(&status),
                        "Child exited unsuccessfully"
                    );
                }
                (status.code(), status.success())
            }
            Err(e) => {
                tracing::error!(slot = %self.name, pid = self.pid(), error = %e, "Wait failed");
                (None, false)
            }
        };
        self.exit_record(code, success)
    }

    fn exit_record(&self, code: Option<i32>, success: bool) -> ChildExit {
        ChildExit {
            index: self.index,
            name: self.name.to_string(),
            role: self.role,
            pid: self.pid(),
            code,
            success,
        }
    }
}

impl std::fmt::Debug for ProcessSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSlot")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("role", &self.role)
            .field("pid", &self.pid())
            .field("state", &self.state)
            .finish()
    }
}

fn describe_status(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exit code {}", code),
        (None, Some(sig)) => format!("killed by signal {}", sig),
        _ => "unknown status".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn sleeper(tag: &str) -> ProcessSlot {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let channel = SignalChannel::create(&format!(
            "pulsebench-slottest-{}-{}",
            std::process::id(),
            tag
        ))
        .unwrap();
        ProcessSlot::new(0, ProcessName::for_index(0), Role::Publisher, child, channel)
    }

    #[test]
    fn test_valid_transitions() {
        assert!(SlotState::Spawned.can_transition_to(SlotState::Running));
        assert!(SlotState::Running.can_transition_to(SlotState::Stopping));
        assert!(SlotState::Spawned.can_transition_to(SlotState::Exited));
        assert!(SlotState::Stopping.can_transition_to(SlotState::Exited));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!SlotState::Spawned.can_transition_to(SlotState::Stopping));
        assert!(!SlotState::Stopping.can_transition_to(SlotState::Running));
        assert!(!SlotState::Exited.can_transition_to(SlotState::Running));
        assert!(!SlotState::Exited.can_transition_to(SlotState::Exited));
    }

    #[test]
    fn test_slot_lifecycle() {
        let mut slot = sleeper("lifecycle");
        assert_eq!(slot.state(), SlotState::Spawned);
        assert!(slot.transition_to(SlotState::Stopping).is_err());

        slot.transition_to(SlotState::Running).unwrap();
        slot.transition_to(SlotState::Stopping).unwrap();
        assert!(!slot.has_exited());

        slot.signal(nix::sys::signal::Signal::SIGKILL);
        let exit = slot.wait();
        assert_eq!(slot.state(), SlotState::Exited);
        assert!(!exit.success);
        assert_eq!(exit.code, None);

        slot.take_channel().unwrap().destroy().unwrap();
        assert!(slot.channel().is_none());
    }
}
