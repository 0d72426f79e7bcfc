// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Local transport over Unix datagram sockets.
//!
//! A session may listen on one endpoint and may publish to any number of
//! peer endpoints. Publishing to a peer that has not bound its socket yet is
//! not an error: like any pub/sub transport, messages with no subscriber are
//! simply not delivered.
//!
//! A staged listener binds under a temporary name and only appears at its
//! endpoint path on [`Transport::announce`], so a peer that can see the path
//! knows every listener is already in place.

use std::io::ErrorKind;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::TransportError;
use crate::transport::{decode_frame, encode_frame, Listener, Message, Transport, MAX_FRAME_SIZE};
use crate::types::{AddressKey, Topic};

/// How often the receive thread re-checks its shutdown flag.
const RECV_TIMEOUT: Duration = Duration::from_millis(50);

/// Poll step of [`Transport::drain`].
const DRAIN_POLL: Duration = Duration::from_millis(1);

/// Consecutive idle polls before the receive side counts as drained.
const DRAIN_IDLE_POLLS: u32 = 3;

type ListenerTable = DashMap<Topic, Vec<Arc<dyn Listener>>>;

/// Delivery counters of one session.
#[derive(Debug, Default)]
pub struct TransportCounters {
    /// Datagrams handed to the kernel.
    pub sent: AtomicU64,
    /// Frames taken off the listening socket.
    pub received: AtomicU64,
    /// Received frames the receive thread is done with.
    pub processed: AtomicU64,
    /// Sends skipped because the peer endpoint was not bound.
    pub unreachable: AtomicU64,
    /// Messages delivered to at least one listener.
    pub delivered: AtomicU64,
    /// Messages a listener rejected as malformed.
    pub rejected: AtomicU64,
    /// Frames that could not be decoded or had no listener.
    pub discarded: AtomicU64,
}

/// Transport session over Unix datagram sockets.
pub struct UnixTransport {
    sender: UnixDatagram,
    peers: Vec<AddressKey>,
    endpoint: Option<AddressKey>,
    /// Bind path not yet moved to the endpoint.
    staged: Mutex<Option<PathBuf>>,
    /// Second handle on the listening socket, used to inspect its queue.
    inbox: Option<UnixDatagram>,
    listeners: Arc<ListenerTable>,
    counters: Arc<TransportCounters>,
    shutdown: Arc<AtomicBool>,
    receiver: Option<JoinHandle<()>>,
}

impl UnixTransport {
    /// Open a session that optionally listens on `endpoint` and publishes
    /// to every key in `peers`.
    pub fn open(
        endpoint: Option<AddressKey>,
        peers: Vec<AddressKey>,
    ) -> Result<Self, TransportError> {
        Self::open_with(endpoint, peers, false)
    }

    fn open_with(
        endpoint: Option<AddressKey>,
        peers: Vec<AddressKey>,
        staged: bool,
    ) -> Result<Self, TransportError> {
        let sender = UnixDatagram::unbound().map_err(|e| TransportError::BindFailed {
            endpoint: "<unbound>".to_string(),
            reason: e.to_string(),
        })?;

        let listeners: Arc<ListenerTable> = Arc::new(DashMap::new());
        let counters = Arc::new(TransportCounters::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let bind_path = endpoint.as_ref().map(|key| {
            if staged {
                staging_path(key.as_path())
            } else {
                key.as_path().to_path_buf()
            }
        });
        let (receiver, inbox) = match (&endpoint, &bind_path) {
            (Some(key), Some(path)) => {
                let (handle, inbox) = Self::spawn_receiver(
                    key,
                    path,
                    Arc::clone(&listeners),
                    Arc::clone(&counters),
                    Arc::clone(&shutdown),
                )?;
                (Some(handle), Some(inbox))
            }
            _ => (None, None),
        };
        let staged = if staged { bind_path } else { None };

        tracing::debug!(
            endpoint = ?endpoint.as_ref().map(ToString::to_string),
            peers = peers.len(),
            "Opened transport session"
        );

        Ok(Self {
            sender,
            peers,
            endpoint,
            staged: Mutex::new(staged),
            inbox,
            listeners,
            counters,
            shutdown,
            receiver,
        })
    }

    /// Publishing-only session.
    pub fn connect(peers: Vec<AddressKey>) -> Result<Self, TransportError> {
        Self::open(None, peers)
    }

    /// Listening-only session, reachable as soon as it returns.
    pub fn listen(endpoint: AddressKey) -> Result<Self, TransportError> {
        Self::open(Some(endpoint), Vec::new())
    }

    /// Listening-only session that stays unreachable until
    /// [`Transport::announce`].
    pub fn listen_staged(endpoint: AddressKey) -> Result<Self, TransportError> {
        Self::open_with(Some(endpoint), Vec::new(), true)
    }

    pub fn endpoint(&self) -> Option<&AddressKey> {
        self.endpoint.as_ref()
    }

    pub fn counters(&self) -> &TransportCounters {
        &self.counters
    }

    /// Stop the receive thread and remove the endpoint socket.
    pub fn close(mut self) {
        self.shutdown_receiver();
    }

    fn spawn_receiver(
        key: &AddressKey,
        path: &Path,
        listeners: Arc<ListenerTable>,
        counters: Arc<TransportCounters>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<(JoinHandle<()>, UnixDatagram), TransportError> {
        let bind_err = |reason: String| TransportError::BindFailed {
            endpoint: key.to_string(),
            reason,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| bind_err(e.to_string()))?;
        }
        // Remove sockets left behind by a previous run
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(key.as_path());

        let socket = UnixDatagram::bind(path).map_err(|e| bind_err(e.to_string()))?;
        socket
            .set_read_timeout(Some(RECV_TIMEOUT))
            .map_err(|e| bind_err(e.to_string()))?;
        let inbox = socket.try_clone().map_err(|e| bind_err(e.to_string()))?;

        let endpoint = key.to_string();
        let handle = std::thread::Builder::new()
            .name("pulsebench-recv".to_string())
            .spawn(move || receive_loop(socket, endpoint, listeners, counters, shutdown))
            .map_err(|e| bind_err(format!("failed to spawn receive thread: {}", e)))?;
        Ok((handle, inbox))
    }

    fn shutdown_receiver(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.receiver.take() {
            if handle.join().is_err() {
                tracing::error!("Transport receive thread panicked");
            }
        }
        if let Some(path) = self.take_staged() {
            let _ = std::fs::remove_file(path);
        }
        if let Some(key) = self.endpoint.take() {
            let _ = std::fs::remove_file(key.as_path());
        }
    }

    fn take_staged(&self) -> Option<PathBuf> {
        self.staged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

fn staging_path(endpoint: &Path) -> PathBuf {
    let mut name = endpoint.as_os_str().to_owned();
    name.push(".staged");
    PathBuf::from(name)
}

/// Bytes of the next datagram waiting on `socket`, 0 when its queue is empty.
fn queued_bytes(socket: &UnixDatagram) -> usize {
    let mut pending: libc::c_int = 0;
    // SAFETY: the fd is open for the lifetime of `socket` and FIONREAD
    // writes a single c_int through the pointer
    let rc = unsafe {
        libc::ioctl(socket.as_raw_fd(), libc::FIONREAD, &mut pending as *mut libc::c_int)
    };
    if rc < 0 {
        0
    } else {
        pending as usize
    }
}

fn receive_loop(
    socket: UnixDatagram,
    endpoint: String,
    listeners: Arc<ListenerTable>,
    counters: Arc<TransportCounters>,
    shutdown: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; MAX_FRAME_SIZE];
    while !shutdown.load(Ordering::Acquire) {
        let n = match socket.recv(&mut buf) {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::error!(endpoint = %endpoint, error = %e, "Receive failed, stopping");
                break;
            }
        };
        counters.received.fetch_add(1, Ordering::AcqRel);
        dispatch(&buf[..n], &endpoint, &listeners, &counters);
        counters.processed.fetch_add(1, Ordering::AcqRel);
    }
}

fn dispatch(
    frame: &[u8],
    endpoint: &str,
    listeners: &ListenerTable,
    counters: &TransportCounters,
) {
    let Some(message) = decode_frame(frame) else {
        counters.discarded.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(endpoint = %endpoint, bytes = frame.len(), "Discarding undecodable frame");
        return;
    };

    // Clone the handles so no map guard is held while callbacks run.
    let targets: Vec<Arc<dyn Listener>> = listeners
        .get(&message.topic)
        .map(|entry| entry.value().clone())
        .unwrap_or_default();
    if targets.is_empty() {
        counters.discarded.fetch_add(1, Ordering::Relaxed);
        return;
    }

    for listener in &targets {
        if let Err(e) = listener.on_receive(&message) {
            counters.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(topic = %message.topic, error = %e, "Listener dropped message");
        }
    }
    counters.delivered.fetch_add(1, Ordering::Relaxed);
}

impl Transport for UnixTransport {
    fn send(&self, message: &Message) -> Result<(), TransportError> {
        let frame = encode_frame(message)?;
        for peer in &self.peers {
            match self.sender.send_to(&frame, peer.as_path()) {
                Ok(_) => {
                    self.counters.sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) => {
                    self.counters.unreachable.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(peer = %peer, "Peer endpoint not bound");
                }
                Err(e) => {
                    return Err(TransportError::SendFailed {
                        topic: message.topic.to_string(),
                        reason: format!("{}: {}", peer, e),
                    });
                }
            }
        }
        Ok(())
    }

    fn register_listener(
        &self,
        topic: &Topic,
        listener: Arc<dyn Listener>,
    ) -> Result<(), TransportError> {
        self.listeners
            .entry(topic.clone())
            .or_default()
            .push(listener);
        tracing::debug!(topic = %topic, "Registered listener");
        Ok(())
    }

    fn unregister_listener(
        &self,
        topic: &Topic,
        listener: &Arc<dyn Listener>,
    ) -> Result<(), TransportError> {
        let target = Arc::as_ptr(listener) as *const ();
        let removed = match self.listeners.get_mut(topic) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|l| Arc::as_ptr(l) as *const () != target);
                before != entry.len()
            }
            None => false,
        };
        self.listeners.remove_if(topic, |_, list| list.is_empty());

        if !removed {
            return Err(TransportError::UnregisterFailed {
                topic: topic.to_string(),
                reason: "listener not registered".to_string(),
            });
        }
        tracing::debug!(topic = %topic, "Unregistered listener");
        Ok(())
    }

    fn announce(&self) -> Result<(), TransportError> {
        let (Some(key), Some(staged)) = (&self.endpoint, self.take_staged()) else {
            return Ok(());
        };
        std::fs::rename(&staged, key.as_path()).map_err(|e| TransportError::BindFailed {
            endpoint: key.to_string(),
            reason: format!("cannot publish endpoint: {}", e),
        })?;
        tracing::debug!(endpoint = %key, "Endpoint announced");
        Ok(())
    }

    fn drain(&self, timeout: Duration) {
        let Some(inbox) = &self.inbox else {
            return;
        };
        let deadline = Instant::now() + timeout;
        let mut idle_polls = 0;
        loop {
            let in_flight = self.counters.received.load(Ordering::Acquire)
                != self.counters.processed.load(Ordering::Acquire);
            if queued_bytes(inbox) == 0 && !in_flight {
                idle_polls += 1;
                if idle_polls >= DRAIN_IDLE_POLLS {
                    return;
                }
            } else {
                idle_polls = 0;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    endpoint = ?self.endpoint.as_ref().map(ToString::to_string),
                    "Receive queue still busy after drain timeout"
                );
                return;
            }
            std::thread::sleep(DRAIN_POLL);
        }
    }
}

impl Drop for UnixTransport {
    fn drop(&mut self) {
        self.shutdown_receiver();
    }
}
