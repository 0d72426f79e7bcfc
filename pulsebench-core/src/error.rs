// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for pulsebench.
//!
//! Explicit enum error types only. No `Box<dyn Error>`, no `anyhow::Result`
//! inside the core - every failure mode is a named variant.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the benchmark harness.
#[derive(Debug, Error)]
pub enum BenchError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Synchronization Errors - No Fallback Without a Channel
    // =========================================================================
    #[error("Signal channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Signal wait error: {0}")]
    Signal(#[from] SignalError),

    // =========================================================================
    // Orchestration Errors - Abort the Whole Run
    // =========================================================================
    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Cancelled during {during}")]
    Cancelled { during: &'static str },

    // =========================================================================
    // Per-Process Errors
    // =========================================================================
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Sample store error: {0}")]
    Store(#[from] StoreError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Invalid configuration values, reported before anything is spawned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid process name: {name} - {reason}")]
    InvalidProcessName { name: String, reason: String },

    #[error("Unknown process identity: {name}")]
    UnknownProcess { name: String },
}

/// Shared memory channel failures - fatal to the owning process.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Failed to create signal channel {name}: {reason}")]
    CreateFailed { name: String, reason: String },

    #[error("Failed to attach signal channel {name}: {reason}")]
    AttachFailed { name: String, reason: String },

    #[error("Failed to map signal channel {name}: {reason}")]
    MapFailed { name: String, reason: String },

    #[error("Failed to unlink signal channel {name}: {reason}")]
    UnlinkFailed { name: String, reason: String },
}

/// Outcome of a bounded or cancelled wait on a signal channel.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("Timed out after {waited_ms}ms waiting for {expected} on {channel}")]
    Timeout {
        channel: String,
        expected: String,
        waited_ms: u64,
    },

    #[error("Wait for {expected} on {channel} cancelled")]
    Cancelled { channel: String, expected: String },
}

/// Orchestration failures. Any of these aborts the run after rollback.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(
        "Failed to spawn {name} (slot {index}): {reason} \
         ({rolled_back} children terminated, {channels_released} channels released)"
    )]
    Spawn {
        index: usize,
        name: String,
        reason: String,
        rolled_back: usize,
        channels_released: usize,
    },

    #[error("Quorum of {quorum} publishers not reached within {waited_ms}ms ({stopped} stopped)")]
    QuorumTimeout {
        quorum: usize,
        stopped: usize,
        waited_ms: u64,
    },

    #[error("Quorum of {quorum} publishers unreachable: {stopped} stopped, {exited} exited without Stop")]
    QuorumUnreachable {
        quorum: usize,
        stopped: usize,
        exited: usize,
    },

    #[error("Run cancelled while waiting for {stopped}/{quorum} publishers")]
    Cancelled { quorum: usize, stopped: usize },

    #[error("Only {ready} of {total} subscribers bound their endpoint within {waited_ms}ms")]
    SubscribersNotReady {
        ready: usize,
        total: usize,
        waited_ms: u64,
    },

    #[error("Subscriber {name} exited before binding its endpoint")]
    SubscriberExited { name: String },

    #[error("Run cancelled while waiting for {ready}/{total} subscribers")]
    CancelledBeforeStart { ready: usize, total: usize },

    #[error("Channel setup failed for slot {index}: {source}")]
    Channel {
        index: usize,
        #[source]
        source: ChannelError,
    },

    #[error("Invalid slot transition: {0}")]
    Transition(#[from] SlotTransitionError),
}

/// Slot lifecycle violations.
#[derive(Debug, Error)]
pub enum SlotTransitionError {
    #[error("Cannot transition slot {name} from {from} to {to}")]
    InvalidTransition {
        name: String,
        from: &'static str,
        to: &'static str,
    },
}

/// Transport collaborator failures - fatal to the process that hits them.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to bind endpoint {endpoint}: {reason}")]
    BindFailed { endpoint: String, reason: String },

    #[error("Send on topic {topic} failed: {reason}")]
    SendFailed { topic: String, reason: String },

    #[error("Message of {size} bytes exceeds frame limit {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Part of the transport contract. The local Unix transport accepts
    /// every registration; a broker-backed transport may not.
    #[error("Register listener on {topic} failed: {reason}")]
    RegisterFailed { topic: String, reason: String },

    #[error("Unregister listener on {topic} failed: {reason}")]
    UnregisterFailed { topic: String, reason: String },
}

/// Malformed received payloads. Recovered locally: the message is dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Payload is empty")]
    Empty,

    #[error("Payload is missing field {field}")]
    MissingField { field: &'static str },

    #[error("Payload timestamp is malformed: {raw}")]
    BadTimestamp { raw: String },

    #[error("Payload counter is malformed: {raw}")]
    BadCounter { raw: String },

    #[error("Payload is not valid UTF-8")]
    NotUtf8,
}

/// Sample file failures. The affected process loses its samples only.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cannot open sample file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write sample file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read run directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias using BenchError.
pub type BenchResult<T> = Result<T, BenchError>;
