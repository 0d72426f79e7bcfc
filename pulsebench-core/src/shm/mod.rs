// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shared memory phase signalling.
//!
//! Named POSIX shared memory segments carry a polled tri-state token between
//! the orchestrator and its children. No locks, no semaphores.

mod region;
mod signal;

pub use region::SharedMemoryRegion;
pub use signal::{SignalChannel, SignalToken, SIGNAL_SEGMENT_SIZE};
