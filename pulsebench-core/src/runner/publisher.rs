// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Publisher loop: time every `send` call.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::error::{BenchError, BenchResult};
use crate::runner::payload::{format_payload, Timestamp};
use crate::runner::RoleParams;
use crate::shm::{SignalChannel, SignalToken};
use crate::store;
use crate::transport::{Message, Transport};
use crate::types::Role;

/// Outcome of a completed publisher loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PublisherReport {
    pub sent: u64,
    pub samples: usize,
    pub sample_file: PathBuf,
}

pub struct Publisher {
    params: RoleParams,
    pause: Duration,
    transport: Arc<dyn Transport>,
    channel: SignalChannel,
}

impl Publisher {
    pub fn new(
        params: RoleParams,
        pause: Duration,
        transport: Arc<dyn Transport>,
        channel: SignalChannel,
    ) -> Self {
        Self {
            params,
            pause,
            transport,
            channel,
        }
    }

    /// Wait for `Start`, publish `loops × topics` messages, store the send
    /// latencies and signal `Stop` on the own channel.
    ///
    /// The first iteration is a warm-up and is not recorded. `Stop` is
    /// written even when the loop fails so the orchestrator is not left
    /// waiting on this publisher.
    pub fn run(&self, cancel: &CancelToken) -> BenchResult<PublisherReport> {
        self.channel
            .wait_for(SignalToken::Start, self.params.poll_interval, None, cancel)?;
        tracing::info!(identity = %self.params.identity, "Publisher started");

        let result = self.publish_all(cancel).and_then(|(sent, samples)| {
            let sample_file = self.params.sample_path(Role::Publisher);
            store::append(&sample_file, &samples)?;
            Ok(PublisherReport {
                sent,
                samples: samples.len(),
                sample_file,
            })
        });

        self.channel.write(SignalToken::Stop);
        match &result {
            Ok(report) => tracing::info!(
                identity = %self.params.identity,
                sent = report.sent,
                samples = report.samples,
                "Publisher finished"
            ),
            Err(e) => tracing::error!(
                identity = %self.params.identity,
                error = %e,
                "Publisher failed"
            ),
        }
        result
    }

    fn publish_all(&self, cancel: &CancelToken) -> BenchResult<(u64, Vec<f64>)> {
        let topics = &self.params.topics;
        let mut samples =
            Vec::with_capacity(self.params.loops.saturating_sub(1) as usize * topics.len());
        let mut sent = 0u64;

        for iteration in 0..self.params.loops {
            if cancel.is_cancelled() {
                return Err(BenchError::Cancelled {
                    during: "publish loop",
                });
            }

            for topic in topics {
                let stamp = Timestamp::now().map_err(|source| BenchError::Io {
                    context: "reading monotonic clock",
                    source,
                })?;
                let payload = format_payload(
                    stamp,
                    sent,
                    self.params.identity.as_str(),
                    self.params.message_size,
                );
                let message = Message::new(topic.clone(), payload);

                let start = Instant::now();
                self.transport.send(&message)?;
                let elapsed = start.elapsed();

                sent += 1;
                if iteration != 0 {
                    samples.push(elapsed.as_secs_f64());
                }
            }

            if !self.pause.is_zero() {
                std::thread::sleep(self.pause);
            }
        }

        Ok((sent, samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::Listener;
    use crate::types::{ProcessName, Topic};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;

    /// Counts sends and fails after `fail_after` of them.
    struct CountingTransport {
        sends: AtomicU64,
        fail_after: u64,
    }

    impl Transport for CountingTransport {
        fn send(&self, message: &Message) -> Result<(), TransportError> {
            if self.sends.fetch_add(1, Ordering::SeqCst) >= self.fail_after {
                return Err(TransportError::SendFailed {
                    topic: message.topic.to_string(),
                    reason: "link down".to_string(),
                });
            }
            Ok(())
        }

        fn register_listener(&self, _: &Topic, _: Arc<dyn Listener>) -> Result<(), TransportError> {
            Ok(())
        }

        fn unregister_listener(
            &self,
            _: &Topic,
            _: &Arc<dyn Listener>,
        ) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn params(dir: &TempDir, loops: u32, topics: usize) -> RoleParams {
        RoleParams {
            identity: ProcessName::for_index(0),
            run_dir: dir.path().to_path_buf(),
            loops,
            message_size: 64,
            topics: Topic::standard_set(topics),
            poll_interval: Duration::from_micros(100),
        }
    }

    fn started_channel(tag: &str) -> SignalChannel {
        let channel =
            SignalChannel::create(&format!("pulsebench-pubtest-{}-{}", std::process::id(), tag))
                .unwrap();
        channel.write(SignalToken::Start);
        channel
    }

    #[test]
    fn test_warm_up_iteration_not_recorded() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(CountingTransport {
            sends: AtomicU64::new(0),
            fail_after: u64::MAX,
        });
        let publisher = Publisher::new(
            params(&dir, 4, 3),
            Duration::ZERO,
            transport.clone(),
            started_channel("warmup"),
        );

        let report = publisher.run(&CancelToken::new()).unwrap();
        assert_eq!(report.sent, 12);
        assert_eq!(report.samples, 9);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 12);
        assert!(publisher.channel.is(SignalToken::Stop));

        let stored = store::read_all(&dir.path().join("pub-app0")).unwrap();
        assert_eq!(stored.samples.len(), 9);
        assert!(stored.samples.iter().all(|s| *s >= 0.0));
    }

    #[test]
    fn test_send_failure_aborts_but_signals_stop() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(CountingTransport {
            sends: AtomicU64::new(0),
            fail_after: 2,
        });
        let publisher = Publisher::new(
            params(&dir, 5, 1),
            Duration::ZERO,
            transport,
            started_channel("fail"),
        );

        let result = publisher.run(&CancelToken::new());
        assert!(matches!(
            result,
            Err(BenchError::Transport(TransportError::SendFailed { .. }))
        ));
        assert!(publisher.channel.is(SignalToken::Stop));
        assert!(!dir.path().join("pub-app0").exists());
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let channel = SignalChannel::create(&format!(
            "pulsebench-pubtest-{}-cancel",
            std::process::id()
        ))
        .unwrap();
        let publisher = Publisher::new(
            params(&dir, 5, 1),
            Duration::ZERO,
            Arc::new(CountingTransport {
                sends: AtomicU64::new(0),
                fail_after: u64::MAX,
            }),
            channel,
        );

        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            publisher.run(&cancel),
            Err(BenchError::Signal(_))
        ));
    }
}
