// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Message payload layout: `{sec}.{nsec}|{counter}|{identity}|{filler}`.

use nix::time::{clock_gettime, ClockId};

use crate::error::PayloadError;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Filler alphabet appended after the header.
const FILLER: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A point on the system-wide monotonic clock.
///
/// `CLOCK_MONOTONIC` is shared by every process on the host, so stamps taken
/// by a publisher can be compared with receive times in a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    secs: i64,
    nanos: i64,
}

impl Timestamp {
    pub fn new(secs: i64, nanos: i64) -> Option<Self> {
        (0..NANOS_PER_SEC)
            .contains(&nanos)
            .then_some(Self { secs, nanos })
    }

    /// Read the monotonic clock.
    pub fn now() -> std::io::Result<Self> {
        let ts = clock_gettime(ClockId::CLOCK_MONOTONIC)?;
        Ok(Self {
            secs: ts.tv_sec() as i64,
            nanos: ts.tv_nsec() as i64,
        })
    }

    /// Signed seconds elapsed from `earlier` to `self`.
    pub fn seconds_since(&self, earlier: &Timestamp) -> f64 {
        let nanos = (self.secs - earlier.secs) * NANOS_PER_SEC + (self.nanos - earlier.nanos);
        nanos as f64 / NANOS_PER_SEC as f64
    }
}

/// Header fields recovered from a received payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPayload {
    pub sent_at: Timestamp,
    pub counter: u64,
    pub identity: String,
}

/// Build a payload stamped with `sent_at`, padded with filler to
/// `message_size` bytes. The header is never truncated, so the result is
/// longer than `message_size` when the header alone exceeds it.
pub fn format_payload(
    sent_at: Timestamp,
    counter: u64,
    identity: &str,
    message_size: usize,
) -> Vec<u8> {
    let mut payload =
        format!("{}.{:09}|{}|{}|", sent_at.secs, sent_at.nanos, counter, identity).into_bytes();
    let header_len = payload.len();
    if message_size > header_len {
        payload.extend(FILLER.iter().cycle().take(message_size - header_len));
    }
    payload
}

/// Parse the header of a payload built by [`format_payload`].
pub fn parse(payload: &[u8]) -> Result<ParsedPayload, PayloadError> {
    if payload.is_empty() {
        return Err(PayloadError::Empty);
    }

    // The filler is ASCII, but only the header has to be valid text.
    let mut fields = payload.splitn(4, |&b| b == b'|');
    let raw_time = fields.next().ok_or(PayloadError::MissingField { field: "timestamp" })?;
    let raw_counter = fields.next().ok_or(PayloadError::MissingField { field: "counter" })?;
    let raw_identity = fields.next().ok_or(PayloadError::MissingField { field: "identity" })?;
    if fields.next().is_none() {
        return Err(PayloadError::MissingField { field: "terminator" });
    }

    let time = std::str::from_utf8(raw_time).map_err(|_| PayloadError::NotUtf8)?;
    let counter = std::str::from_utf8(raw_counter).map_err(|_| PayloadError::NotUtf8)?;
    let identity = std::str::from_utf8(raw_identity).map_err(|_| PayloadError::NotUtf8)?;

    Ok(ParsedPayload {
        sent_at: parse_timestamp(time)?,
        counter: counter.parse().map_err(|_| PayloadError::BadCounter {
            raw: counter.to_string(),
        })?,
        identity: identity.to_string(),
    })
}

fn parse_timestamp(raw: &str) -> Result<Timestamp, PayloadError> {
    let bad = || PayloadError::BadTimestamp {
        raw: raw.to_string(),
    };

    let (secs, nanos) = raw.split_once('.').ok_or_else(bad)?;
    if secs.is_empty() || nanos.len() != 9 || !nanos.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let secs: i64 = secs.parse().map_err(|_| bad())?;
    let nanos: i64 = nanos.parse().map_err(|_| bad())?;
    Timestamp::new(secs, nanos).ok_or_else(bad)
}
