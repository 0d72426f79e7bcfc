// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Polled tri-state phase signal over a shared memory segment.
//!
//! The token lives in the first 8 bytes of a 128-byte segment as a short
//! NUL-terminated ASCII string. Writes and reads are single aligned 64-bit
//! atomic operations, so a reader never sees half of one token and half of
//! another. There is no lock: a crashed peer leaves a stale value, never a
//! held mutex.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::error::{ChannelError, SignalError};
use crate::shm::SharedMemoryRegion;

/// Size of every signal segment in bytes.
pub const SIGNAL_SEGMENT_SIZE: usize = 128;

/// Phase token stored in a signal channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalToken {
    Idle,
    Start,
    Stop,
}

impl SignalToken {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Start => "Start",
            Self::Stop => "Stop",
        }
    }

    /// Pack the NUL-padded token text into one word.
    pub fn encode(&self) -> u64 {
        let mut bytes = [0u8; 8];
        let text = self.as_str().as_bytes();
        bytes[..text.len()].copy_from_slice(text);
        u64::from_ne_bytes(bytes)
    }

    /// Decode a word read from shared memory.
    ///
    /// A zeroed word is `Idle` (fresh segment). Unrecognized content yields
    /// `None` and the caller re-reads.
    pub fn decode(word: u64) -> Option<Self> {
        let bytes = word.to_ne_bytes();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        match &bytes[..end] {
            b"" | b"Idle" => Some(Self::Idle),
            b"Start" => Some(Self::Start),
            b"Stop" => Some(Self::Stop),
            _ => None,
        }
    }
}

impl fmt::Display for SignalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cross-process phase signal backed by one named segment.
pub struct SignalChannel {
    region: SharedMemoryRegion,
}

impl SignalChannel {
    /// Create (or attach to) the named segment and reset it to `Idle`.
    ///
    /// The returned channel owns the name and unlinks it on destroy/drop.
    pub fn create(name: &str) -> Result<Self, ChannelError> {
        let region = SharedMemoryRegion::create(name, SIGNAL_SEGMENT_SIZE)?;
        let channel = Self { region };
        channel.write(SignalToken::Idle);
        Ok(channel)
    }

    /// Attach to a segment created by another process.
    pub fn attach(name: &str) -> Result<Self, ChannelError> {
        let region = SharedMemoryRegion::open(name, SIGNAL_SEGMENT_SIZE)?;
        Ok(Self { region })
    }

    pub fn name(&self) -> &str {
        self.region.name()
    }

    fn word(&self) -> &AtomicU64 {
        // SAFETY: mmap returns page-aligned memory at least SIGNAL_SEGMENT_SIZE
        // bytes long, so offset 0 is a valid, aligned u64 for the region's
        // lifetime. Every process touches it only through atomics.
        unsafe { &*(self.region.as_ptr() as *const AtomicU64) }
    }

    /// Store `token` with a single atomic write.
    pub fn write(&self, token: SignalToken) {
        self.word().store(token.encode(), Ordering::Release);
        tracing::trace!(channel = %self.name(), token = %token, "Signal written");
    }

    /// Non-blocking read of the current token.
    pub fn read(&self) -> Option<SignalToken> {
        SignalToken::decode(self.word().load(Ordering::Acquire))
    }

    /// Whether the channel currently holds `token`.
    pub fn is(&self, token: SignalToken) -> bool {
        self.read() == Some(token)
    }

    /// Poll until the channel holds `token`.
    ///
    /// Sleeps `poll_interval` between reads. Gives up with
    /// [`SignalError::Timeout`] once `timeout` elapses, or with
    /// [`SignalError::Cancelled`] when `cancel` fires. Without a timeout the
    /// wait is unbounded.
    pub fn wait_for(
        &self,
        token: SignalToken,
        poll_interval: Duration,
        timeout: Option<Duration>,
        cancel: &CancelToken,
    ) -> Result<(), SignalError> {
        self.wait_for_any(&[token], poll_interval, timeout, cancel)
            .map(|_| ())
    }

    /// Poll until the channel holds any of `tokens` and return the one seen.
    pub fn wait_for_any(
        &self,
        tokens: &[SignalToken],
        poll_interval: Duration,
        timeout: Option<Duration>,
        cancel: &CancelToken,
    ) -> Result<SignalToken, SignalError> {
        let start = Instant::now();
        loop {
            if let Some(token) = self.read().filter(|t| tokens.contains(t)) {
                tracing::debug!(
                    channel = %self.name(),
                    token = %token,
                    waited_us = start.elapsed().as_micros() as u64,
                    "Signal observed"
                );
                return Ok(token);
            }
            if cancel.is_cancelled() {
                return Err(SignalError::Cancelled {
                    channel: self.name().to_string(),
                    expected: describe(tokens),
                });
            }
            if let Some(limit) = timeout {
                if start.elapsed() >= limit {
                    return Err(SignalError::Timeout {
                        channel: self.name().to_string(),
                        expected: describe(tokens),
                        waited_ms: start.elapsed().as_millis() as u64,
                    });
                }
            }
            std::thread::sleep(poll_interval);
        }
    }

    /// Unmap and unlink the segment. Consumes the channel so it runs once.
    pub fn destroy(self) -> Result<(), ChannelError> {
        let mut region = self.region;
        if region.is_owner() {
            region.unlink()?;
        }
        Ok(())
    }
}

fn describe(tokens: &[SignalToken]) -> String {
    tokens
        .iter()
        .map(SignalToken::as_str)
        .collect::<Vec<_>>()
        .join("|")
}
