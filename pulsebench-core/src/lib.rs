//! Pulsebench Core Library
//!
//! Multi-process latency benchmark harness for publish/subscribe
//! transports. Provides the addressing plan, shared memory phase signals,
//! process orchestration, publisher/subscriber loops, sample storage, run
//! directory management and latency statistics.

pub mod cancel;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod rundir;
pub mod runner;
pub mod shm;
pub mod stats;
pub mod store;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use config::{BenchConfig, BenchmarkRun, ConfigLoader, ConfigOverrides, OrchestratorConfig};
pub use error::{BenchError, BenchResult, ConfigError, OrchestratorError, TransportError};
pub use orchestrator::{CommandLauncher, Orchestrator, RunOutcome};
pub use registry::ServerKeyRegistry;
pub use rundir::RunDirectoryManager;
pub use shm::{SignalChannel, SignalToken};
pub use stats::Stats;
pub use types::{AddressKey, ProcessName, Role, Topic};
