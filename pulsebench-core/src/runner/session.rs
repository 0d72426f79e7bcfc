// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Session setup costs, measured in-process.
//!
//! Times opening a transport session, the first publish on a fresh
//! session, closing it, and adding/removing topic listeners.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::cancel::CancelToken;
use crate::error::{BenchError, BenchResult, PayloadError};
use crate::runner::payload::{format_payload, Timestamp};
use crate::stats::{self, Stats};
use crate::transport::{Listener, Message, Transport, UnixTransport};
use crate::types::{AddressKey, Topic};

/// Listener that accepts everything; only registration cost matters.
struct NullListener;

impl Listener for NullListener {
    fn on_receive(&self, _message: &Message) -> Result<(), PayloadError> {
        Ok(())
    }
}

/// Raw timings of a session benchmark, in seconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionReport {
    pub open: Vec<f64>,
    pub close: Vec<f64>,
    pub first_publish: Vec<f64>,
    pub subscribe: Vec<f64>,
    pub unsubscribe: Vec<f64>,
}

impl SessionReport {
    /// Statistics per measured operation, in report order.
    pub fn stats(&self) -> Vec<(&'static str, Option<Stats>)> {
        vec![
            ("open", stats::compute(&self.open)),
            ("close", stats::compute(&self.close)),
            ("first-pub", stats::compute(&self.first_publish)),
            ("subscribe", stats::compute(&self.subscribe)),
            ("unsubscr", stats::compute(&self.unsubscribe)),
        ]
    }
}

pub struct SessionBenchmark {
    socket_dir: PathBuf,
    loops: u32,
    message_size: usize,
    topics: Vec<Topic>,
}

impl SessionBenchmark {
    pub fn new(
        socket_dir: impl Into<PathBuf>,
        loops: u32,
        message_size: usize,
        topics: Vec<Topic>,
    ) -> Self {
        Self {
            socket_dir: socket_dir.into(),
            loops,
            message_size,
            topics,
        }
    }

    pub fn run(&self, cancel: &CancelToken) -> BenchResult<SessionReport> {
        let mut report = SessionReport::default();
        let key = AddressKey::new(self.socket_dir.join("session.sock"));

        for _ in 0..self.loops {
            self.check(cancel)?;
            self.measure_lifecycle(&key, &mut report)?;
        }

        let session = UnixTransport::listen(key)?;
        for _ in 0..self.loops {
            self.check(cancel)?;
            self.measure_listeners(&session, &mut report)?;
        }
        session.close();

        tracing::info!(
            loops = self.loops,
            topics = self.topics.len(),
            "Session benchmark finished"
        );
        Ok(report)
    }

    fn check(&self, cancel: &CancelToken) -> BenchResult<()> {
        if cancel.is_cancelled() {
            return Err(BenchError::Cancelled {
                during: "session benchmark",
            });
        }
        Ok(())
    }

    /// Open a loopback session, publish once per topic, close it.
    fn measure_lifecycle(&self, key: &AddressKey, report: &mut SessionReport) -> BenchResult<()> {
        let start = Instant::now();
        let session = UnixTransport::open(Some(key.clone()), vec![key.clone()])?;
        report.open.push(start.elapsed().as_secs_f64());

        for (counter, topic) in self.topics.iter().enumerate() {
            let stamp = Timestamp::now().map_err(|source| BenchError::Io {
                context: "reading monotonic clock",
                source,
            })?;
            let message = Message::new(
                topic.clone(),
                format_payload(stamp, counter as u64, "session", self.message_size),
            );
            let start = Instant::now();
            session.send(&message)?;
            report.first_publish.push(start.elapsed().as_secs_f64());
        }

        let start = Instant::now();
        session.close();
        report.close.push(start.elapsed().as_secs_f64());
        Ok(())
    }

    fn measure_listeners(
        &self,
        session: &UnixTransport,
        report: &mut SessionReport,
    ) -> BenchResult<()> {
        let listener: Arc<dyn Listener> = Arc::new(NullListener);
        for topic in &self.topics {
            let start = Instant::now();
            session.register_listener(topic, Arc::clone(&listener))?;
            report.subscribe.push(start.elapsed().as_secs_f64());
        }
        for topic in &self.topics {
            let start = Instant::now();
            session.unregister_listener(topic, &listener)?;
            report.unsubscribe.push(start.elapsed().as_secs_f64());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_session_benchmark_collects_every_operation() {
        let dir = TempDir::new().unwrap();
        let bench = SessionBenchmark::new(dir.path(), 3, 64, Topic::standard_set(2));
        let report = bench.run(&CancelToken::new()).unwrap();

        assert_eq!(report.open.len(), 3);
        assert_eq!(report.close.len(), 3);
        assert_eq!(report.first_publish.len(), 6);
        assert_eq!(report.subscribe.len(), 6);
        assert_eq!(report.unsubscribe.len(), 6);
        assert!(report.stats().iter().all(|(_, s)| s.is_some()));
        assert!(!dir.path().join("session.sock").exists());
    }

    #[test]
    fn test_single_loop_leaves_open_close_unset() {
        let dir = TempDir::new().unwrap();
        let bench = SessionBenchmark::new(dir.path(), 1, 64, Topic::standard_set(1));
        let report = bench.run(&CancelToken::new()).unwrap();
        let stats = report.stats();
        assert_eq!(stats[0], ("open", None));
        assert_eq!(stats[1], ("close", None));
    }

    #[test]
    fn test_cancelled_session_benchmark() {
        let dir = TempDir::new().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = SessionBenchmark::new(dir.path(), 2, 64, Topic::standard_set(1)).run(&cancel);
        assert!(matches!(result, Err(BenchError::Cancelled { .. })));
    }
}
