// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Subscriber loop: record one-way latency of every received message.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::{BenchResult, PayloadError, TransportError};
use crate::runner::payload::{self, Timestamp};
use crate::runner::RoleParams;
use crate::shm::{SignalChannel, SignalToken};
use crate::store;
use crate::transport::{Listener, Message, Transport};
use crate::types::{Role, Topic};

/// Bound on waiting for queued messages once `Stop` is seen.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Samples and counters shared by every topic listener of one subscriber.
#[derive(Debug, Default)]
struct SampleSink {
    samples: Mutex<Vec<f64>>,
    bytes: AtomicU64,
    dropped: AtomicU64,
}

struct TopicListener {
    topic: Topic,
    received: AtomicU64,
    sink: Arc<SampleSink>,
}

impl Listener for TopicListener {
    fn on_receive(&self, message: &Message) -> Result<(), PayloadError> {
        // Stamp before parsing so parsing cost is not part of the latency.
        let received_at = Timestamp::now();
        let parsed = match payload::parse(&message.payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.sink.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };
        let Ok(received_at) = received_at else {
            self.sink.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(topic = %self.topic, "Monotonic clock unavailable");
            return Ok(());
        };

        self.received.fetch_add(1, Ordering::Relaxed);
        self.sink
            .bytes
            .fetch_add(message.payload.len() as u64, Ordering::Relaxed);
        self.sink
            .samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(received_at.seconds_since(&parsed.sent_at));
        Ok(())
    }
}

/// Outcome of a subscriber run.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberReport {
    pub messages: u64,
    pub bytes: u64,
    pub dropped: u64,
    pub per_topic: Vec<(Topic, u64)>,
    pub sample_file: PathBuf,
}

pub struct Subscriber {
    params: RoleParams,
    transport: Arc<dyn Transport>,
    channel: SignalChannel,
}

impl Subscriber {
    pub fn new(params: RoleParams, transport: Arc<dyn Transport>, channel: SignalChannel) -> Self {
        Self {
            params,
            transport,
            channel,
        }
    }

    /// Register a listener per topic, then receive until the orchestrator
    /// writes `Stop`. Samples are stored once listeners are removed.
    pub fn run(&self, cancel: &CancelToken) -> BenchResult<SubscriberReport> {
        let sink = Arc::new(SampleSink::default());
        let listeners: Vec<Arc<TopicListener>> = self
            .params
            .topics
            .iter()
            .map(|topic| {
                Arc::new(TopicListener {
                    topic: topic.clone(),
                    received: AtomicU64::new(0),
                    sink: Arc::clone(&sink),
                })
            })
            .collect();

        let mut registered = Vec::with_capacity(listeners.len());
        if let Err(e) = self.register_all(&listeners, &mut registered) {
            self.unregister_all(&registered);
            return Err(e.into());
        }

        // A late subscriber may find Stop already written over Start.
        let waited = self
            .channel
            .wait_for_any(
                &[SignalToken::Start, SignalToken::Stop],
                self.params.poll_interval,
                None,
                cancel,
            )
            .and_then(|seen| {
                tracing::info!(identity = %self.params.identity, "Subscriber started");
                if seen == SignalToken::Stop {
                    return Ok(());
                }
                self.channel
                    .wait_for(SignalToken::Stop, self.params.poll_interval, None, cancel)
            });

        if waited.is_ok() {
            self.transport.drain(DRAIN_TIMEOUT);
        }
        self.unregister_all(&registered);
        waited?;

        let samples = std::mem::take(
            &mut *sink
                .samples
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let sample_file = self.params.sample_path(Role::Subscriber);
        store::append(&sample_file, &samples)?;

        let per_topic: Vec<(Topic, u64)> = listeners
            .iter()
            .map(|l| (l.topic.clone(), l.received.load(Ordering::Relaxed)))
            .collect();
        for (topic, count) in &per_topic {
            tracing::info!(
                identity = %self.params.identity,
                topic = %topic,
                received = count,
                "Topic summary"
            );
        }

        let report = SubscriberReport {
            messages: samples.len() as u64,
            bytes: sink.bytes.load(Ordering::Relaxed),
            dropped: sink.dropped.load(Ordering::Relaxed),
            per_topic,
            sample_file,
        };
        tracing::info!(
            identity = %self.params.identity,
            messages = report.messages,
            bytes = report.bytes,
            dropped = report.dropped,
            "Subscriber finished"
        );
        Ok(report)
    }

    /// Register every listener, then make the endpoint reachable.
    fn register_all(
        &self,
        listeners: &[Arc<TopicListener>],
        registered: &mut Vec<(Topic, Arc<dyn Listener>)>,
    ) -> Result<(), TransportError> {
        for listener in listeners {
            let handle: Arc<dyn Listener> = listener.clone();
            self.transport
                .register_listener(&listener.topic, Arc::clone(&handle))?;
            registered.push((listener.topic.clone(), handle));
        }
        self.transport.announce()
    }

    fn unregister_all(&self, registered: &[(Topic, Arc<dyn Listener>)]) {
        for (topic, handle) in registered {
            if let Err(e) = self.transport.unregister_listener(topic, handle) {
                tracing::warn!(topic = %topic, error = %e, "Unregister failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchError;
    use crate::runner::payload::format_payload;
    use crate::types::ProcessName;
    use dashmap::DashMap;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    /// Delivers synchronously to whatever is registered.
    #[derive(Default)]
    struct DirectTransport {
        listeners: DashMap<Topic, Vec<Arc<dyn Listener>>>,
        /// Registrations accepted before the next one fails.
        accept_only: Option<usize>,
        registrations: AtomicUsize,
        /// Listener count seen by `announce`.
        announced_with: Mutex<Option<usize>>,
        /// Listener count seen by `drain`.
        drained_with: Mutex<Option<usize>>,
    }

    impl DirectTransport {
        fn registered(&self) -> usize {
            self.listeners.iter().map(|e| e.value().len()).sum()
        }
    }

    impl Transport for DirectTransport {
        fn send(&self, message: &Message) -> Result<(), TransportError> {
            let targets = self
                .listeners
                .get(&message.topic)
                .map(|e| e.value().clone())
                .unwrap_or_default();
            for listener in targets {
                let _ = listener.on_receive(message);
            }
            Ok(())
        }

        fn register_listener(
            &self,
            topic: &Topic,
            listener: Arc<dyn Listener>,
        ) -> Result<(), TransportError> {
            let n = self.registrations.fetch_add(1, Ordering::SeqCst);
            if self.accept_only.is_some_and(|limit| n >= limit) {
                return Err(TransportError::RegisterFailed {
                    topic: topic.to_string(),
                    reason: "broker refused".to_string(),
                });
            }
            self.listeners.entry(topic.clone()).or_default().push(listener);
            Ok(())
        }

        fn unregister_listener(
            &self,
            topic: &Topic,
            listener: &Arc<dyn Listener>,
        ) -> Result<(), TransportError> {
            if let Some(mut list) = self.listeners.get_mut(topic) {
                list.retain(|l| !Arc::ptr_eq(l, listener));
            }
            Ok(())
        }

        fn announce(&self) -> Result<(), TransportError> {
            *self.announced_with.lock().unwrap() = Some(self.registered());
            Ok(())
        }

        fn drain(&self, _timeout: Duration) {
            *self.drained_with.lock().unwrap() = Some(self.registered());
        }
    }

    fn channel_name(tag: &str) -> String {
        format!("pulsebench-subtest-{}-{}", std::process::id(), tag)
    }

    #[test]
    fn test_records_latency_and_drops_malformed() {
        let dir = TempDir::new().unwrap();
        let name = channel_name("recv");
        let owner = SignalChannel::create(&name).unwrap();
        let transport = Arc::new(DirectTransport::default());
        let topics = Topic::standard_set(2);

        let subscriber = Subscriber::new(
            RoleParams {
                identity: ProcessName::for_index(1),
                run_dir: dir.path().to_path_buf(),
                loops: 1,
                message_size: 64,
                topics: topics.clone(),
                poll_interval: Duration::from_micros(100),
            },
            transport.clone(),
            SignalChannel::attach(&name).unwrap(),
        );

        let driver = {
            let transport = transport.clone();
            let topics = topics.clone();
            std::thread::spawn(move || {
                while transport.listeners.len() < 2 {
                    std::thread::sleep(Duration::from_millis(1));
                }
                owner.write(SignalToken::Start);
                for (i, topic) in topics.iter().enumerate() {
                    let stamp = Timestamp::now().unwrap();
                    let payload = format_payload(stamp, i as u64, "app0", 64);
                    transport
                        .send(&Message::new(topic.clone(), payload))
                        .unwrap();
                }
                transport
                    .send(&Message::new(topics[0].clone(), b"garbage".to_vec()))
                    .unwrap();
                owner.write(SignalToken::Stop);
                owner
            })
        };

        let report = subscriber.run(&CancelToken::new()).unwrap();
        let owner = driver.join().unwrap();

        assert_eq!(report.messages, 2);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.bytes, 128);
        assert_eq!(report.per_topic, vec![(topics[0].clone(), 1), (topics[1].clone(), 1)]);
        assert_eq!(*transport.announced_with.lock().unwrap(), Some(2));
        // Drained while the listeners were still registered
        assert_eq!(*transport.drained_with.lock().unwrap(), Some(2));
        assert!(transport.listeners.iter().all(|e| e.value().is_empty()));

        let stored = store::read_all(&dir.path().join("sub-app1")).unwrap();
        assert_eq!(stored.samples.len(), 2);
        assert!(stored.samples.iter().all(|s| *s >= 0.0));
        owner.destroy().unwrap();
    }

    #[test]
    fn test_cancel_unregisters_and_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(DirectTransport::default());
        let subscriber = Subscriber::new(
            RoleParams {
                identity: ProcessName::for_index(3),
                run_dir: dir.path().to_path_buf(),
                loops: 1,
                message_size: 64,
                topics: Topic::standard_set(1),
                poll_interval: Duration::from_micros(100),
            },
            transport.clone(),
            SignalChannel::create(&channel_name("cancel")).unwrap(),
        );

        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(subscriber.run(&cancel), Err(BenchError::Signal(_))));
        assert!(transport.listeners.iter().all(|e| e.value().is_empty()));
        assert_eq!(*transport.drained_with.lock().unwrap(), None);
        assert!(!dir.path().join("sub-app3").exists());
    }

    #[test]
    fn test_late_subscriber_finishes_on_stop() {
        let dir = TempDir::new().unwrap();
        let name = channel_name("late");
        let owner = SignalChannel::create(&name).unwrap();
        owner.write(SignalToken::Stop);

        let transport = Arc::new(DirectTransport::default());
        let subscriber = Subscriber::new(
            RoleParams {
                identity: ProcessName::for_index(5),
                run_dir: dir.path().to_path_buf(),
                loops: 1,
                message_size: 64,
                topics: Topic::standard_set(2),
                poll_interval: Duration::from_micros(100),
            },
            transport.clone(),
            SignalChannel::attach(&name).unwrap(),
        );

        let report = subscriber.run(&CancelToken::new()).unwrap();
        assert_eq!(report.messages, 0);
        assert!(dir.path().join("sub-app5").exists());
        assert!(transport.listeners.iter().all(|e| e.value().is_empty()));
        owner.destroy().unwrap();
    }

    #[test]
    fn test_failed_registration_unwinds_listeners() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(DirectTransport {
            accept_only: Some(2),
            ..Default::default()
        });
        let subscriber = Subscriber::new(
            RoleParams {
                identity: ProcessName::for_index(7),
                run_dir: dir.path().to_path_buf(),
                loops: 1,
                message_size: 64,
                topics: Topic::standard_set(4),
                poll_interval: Duration::from_micros(100),
            },
            transport.clone(),
            SignalChannel::create(&channel_name("regfail")).unwrap(),
        );

        let err = subscriber.run(&CancelToken::new()).unwrap_err();
        assert!(matches!(
            err,
            BenchError::Transport(TransportError::RegisterFailed { .. })
        ));
        assert_eq!(transport.registrations.load(Ordering::SeqCst), 3);
        assert_eq!(transport.registered(), 0);
        assert_eq!(*transport.announced_with.lock().unwrap(), None);
        assert!(!dir.path().join("sub-app7").exists());
    }
}
