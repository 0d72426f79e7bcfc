// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict validation.
//!
//! Every parameter of a benchmark run is validated before anything is
//! spawned. File values are optional; command-line overrides win over the
//! file, and defaults fill whatever neither provides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult, ConfigError};
use crate::types::Topic;

/// Upper bound on topics per run.
pub const MAX_TOPICS: usize = 15;
/// Smallest payload that still fits a typical header.
pub const MIN_MESSAGE_SIZE: usize = 16;
/// Largest payload that fits one local datagram frame.
pub const MAX_MESSAGE_SIZE: usize = 60_000;
/// Upper bound on spawned processes.
pub const MAX_PROCESSES: usize = 1000;

/// Raw run section as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawRunConfig {
    loops: u32,
    message_size: usize,
    topics: usize,
}

impl Default for RawRunConfig {
    fn default() -> Self {
        Self {
            loops: 20,
            message_size: 100,
            topics: 10,
        }
    }
}

/// Raw orchestrator section.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawOrchestratorConfig {
    processes: usize,
    quorum: Option<usize>,
    poll_interval_us: u64,
    stop_timeout_secs: u64,
    ready_timeout_ms: u64,
    term_grace_ms: u64,
    root: String,
    socket_dir: String,
}

impl Default for RawOrchestratorConfig {
    fn default() -> Self {
        Self {
            processes: 2,
            quorum: None,
            poll_interval_us: 100,
            stop_timeout_secs: 0,
            ready_timeout_ms: 10_000,
            term_grace_ms: 500,
            root: "benchmarks".to_string(),
            socket_dir: default_socket_dir(),
        }
    }
}

fn default_socket_dir() -> String {
    std::env::temp_dir()
        .join("pulsebench")
        .to_string_lossy()
        .into_owned()
}

/// Raw publisher section.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawPublisherConfig {
    pause_us: u64,
}

impl Default for RawPublisherConfig {
    fn default() -> Self {
        Self { pause_us: 10 }
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    run: RawRunConfig,
    orchestrator: RawOrchestratorConfig,
    publisher: RawPublisherConfig,
}

/// Command-line values that replace file values when present.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub loops: Option<u32>,
    pub message_size: Option<usize>,
    pub topics: Option<usize>,
    pub processes: Option<usize>,
    pub quorum: Option<usize>,
    pub poll_interval_us: Option<u64>,
    pub stop_timeout_secs: Option<u64>,
    pub root: Option<PathBuf>,
    pub socket_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    fn apply(&self, raw: &mut RawConfig) {
        let run = &mut raw.run;
        let orch = &mut raw.orchestrator;
        if let Some(v) = self.loops {
            run.loops = v;
        }
        if let Some(v) = self.message_size {
            run.message_size = v;
        }
        if let Some(v) = self.topics {
            run.topics = v;
        }
        if let Some(v) = self.processes {
            orch.processes = v;
        }
        if self.quorum.is_some() {
            orch.quorum = self.quorum;
        }
        if let Some(v) = self.poll_interval_us {
            orch.poll_interval_us = v;
        }
        if let Some(v) = self.stop_timeout_secs {
            orch.stop_timeout_secs = v;
        }
        if let Some(v) = &self.root {
            orch.root = v.to_string_lossy().into_owned();
        }
        if let Some(v) = &self.socket_dir {
            orch.socket_dir = v.to_string_lossy().into_owned();
        }
    }
}

/// Validated workload parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub loops: u32,
    pub message_size: usize,
    pub topics: Vec<Topic>,
}

/// Validated orchestrator configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub processes: usize,
    /// Publishers that must report `Stop` before subscribers are stopped.
    pub quorum: usize,
    pub poll_interval: Duration,
    /// `None` waits for the quorum indefinitely.
    pub stop_timeout: Option<Duration>,
    /// Limit on the wait for every subscriber endpoint before `Start`.
    pub ready_timeout: Duration,
    /// Time between SIGTERM and SIGKILL when children are torn down.
    pub term_grace: Duration,
    pub root: PathBuf,
    pub socket_dir: PathBuf,
}

impl OrchestratorConfig {
    /// Number of publisher slots for `processes` processes (even indices).
    pub const fn publishers_for(processes: usize) -> usize {
        processes.div_ceil(2)
    }

    pub fn publishers(&self) -> usize {
        Self::publishers_for(self.processes)
    }
}

/// Validated publisher configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PublisherConfig {
    /// Sleep between loop iterations.
    pub pause: Duration,
}

/// Complete validated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchConfig {
    pub run: RunConfig,
    pub orchestrator: OrchestratorConfig,
    pub publisher: PublisherConfig,
}

/// Manifest file describing a run, stored inside its run directory.
pub const RUN_MANIFEST: &str = "run.json";

/// One benchmark invocation, bound to its run directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRun {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub started_at: DateTime<Local>,
    pub loop_count: u32,
    pub message_size: usize,
    pub topic_count: usize,
    pub process_count: usize,
}

impl BenchmarkRun {
    pub fn new(config: &BenchConfig, run_dir: PathBuf) -> Self {
        let run_id = run_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            run_id,
            run_dir,
            started_at: Local::now(),
            loop_count: config.run.loops,
            message_size: config.run.message_size,
            topic_count: config.run.topics.len(),
            process_count: config.orchestrator.processes,
        }
    }

    /// Write `run.json` into the run directory.
    pub fn write_manifest(&self) -> BenchResult<PathBuf> {
        let path = self.run_dir.join(RUN_MANIFEST);
        let content = serde_json::to_string_pretty(self).map_err(|e| BenchError::ConfigParse {
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|source| BenchError::Io {
            context: "writing run manifest",
            source,
        })?;
        Ok(path)
    }

    /// Read the manifest of `run_dir`. `None` if the run has none.
    pub fn load_manifest(run_dir: &Path) -> BenchResult<Option<Self>> {
        let path = run_dir.join(RUN_MANIFEST);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|source| BenchError::Io {
            context: "reading run manifest",
            source,
        })?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| BenchError::ConfigParse {
                message: format!("{}: {}", path.display(), e),
            })
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a YAML file, apply `overrides`, and validate.
    pub fn load_file(path: impl AsRef<Path>, overrides: &ConfigOverrides) -> BenchResult<BenchConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BenchError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| BenchError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content, overrides)
    }

    /// Load a YAML string, apply `overrides`, and validate.
    pub fn load_string(content: &str, overrides: &ConfigOverrides) -> BenchResult<BenchConfig> {
        let mut raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| BenchError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?;

        overrides.apply(&mut raw);
        Self::validate(raw)
    }

    /// Defaults plus `overrides`, without a file.
    pub fn from_overrides(overrides: &ConfigOverrides) -> BenchResult<BenchConfig> {
        let mut raw = RawConfig::default();
        overrides.apply(&mut raw);
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> BenchResult<BenchConfig> {
        let run = Self::validate_run(raw.run)?;
        let orchestrator = Self::validate_orchestrator(raw.orchestrator)?;
        let publisher = PublisherConfig {
            pause: Duration::from_micros(raw.publisher.pause_us),
        };

        tracing::debug!(
            loops = run.loops,
            message_size = run.message_size,
            topics = run.topics.len(),
            processes = orchestrator.processes,
            quorum = orchestrator.quorum,
            "Configuration validated"
        );

        Ok(BenchConfig {
            run,
            orchestrator,
            publisher,
        })
    }

    fn validate_run(raw: RawRunConfig) -> BenchResult<RunConfig> {
        if raw.loops == 0 {
            return Err(invalid("loops", raw.loops, "Must be at least 1"));
        }

        if !(MIN_MESSAGE_SIZE..=MAX_MESSAGE_SIZE).contains(&raw.message_size) {
            return Err(invalid(
                "message_size",
                raw.message_size,
                format!(
                    "Must be between {} and {} bytes",
                    MIN_MESSAGE_SIZE, MAX_MESSAGE_SIZE
                ),
            ));
        }

        if !(1..=MAX_TOPICS).contains(&raw.topics) {
            return Err(invalid(
                "topics",
                raw.topics,
                format!("Must be between 1 and {}", MAX_TOPICS),
            ));
        }

        Ok(RunConfig {
            loops: raw.loops,
            message_size: raw.message_size,
            topics: Topic::standard_set(raw.topics),
        })
    }

    fn validate_orchestrator(raw: RawOrchestratorConfig) -> BenchResult<OrchestratorConfig> {
        if !(2..=MAX_PROCESSES).contains(&raw.processes) {
            return Err(invalid(
                "processes",
                raw.processes,
                format!(
                    "Must be between 2 and {} (at least one publisher and one subscriber)",
                    MAX_PROCESSES
                ),
            ));
        }

        let publishers = OrchestratorConfig::publishers_for(raw.processes);
        let quorum = raw.quorum.unwrap_or(publishers);
        if quorum == 0 || quorum > publishers {
            return Err(invalid(
                "quorum",
                quorum,
                format!("Must be between 1 and the publisher count {}", publishers),
            ));
        }

        const MAX_POLL_US: u64 = 1_000_000;
        if !(1..=MAX_POLL_US).contains(&raw.poll_interval_us) {
            return Err(invalid(
                "poll_interval_us",
                raw.poll_interval_us,
                "Must be between 1us and 1s",
            ));
        }

        if raw.root.is_empty() {
            return Err(invalid("root", "\"\"", "Run root cannot be empty"));
        }
        if raw.socket_dir.is_empty() {
            return Err(invalid("socket_dir", "\"\"", "Socket directory cannot be empty"));
        }

        if raw.ready_timeout_ms == 0 {
            return Err(invalid(
                "ready_timeout_ms",
                raw.ready_timeout_ms,
                "Must be at least 1ms",
            ));
        }

        Ok(OrchestratorConfig {
            processes: raw.processes,
            quorum,
            poll_interval: Duration::from_micros(raw.poll_interval_us),
            stop_timeout: (raw.stop_timeout_secs > 0)
                .then(|| Duration::from_secs(raw.stop_timeout_secs)),
            ready_timeout: Duration::from_millis(raw.ready_timeout_ms),
            term_grace: Duration::from_millis(raw.term_grace_ms),
            root: PathBuf::from(raw.root),
            socket_dir: PathBuf::from(raw.socket_dir),
        })
    }
}

fn invalid(field: &'static str, value: impl ToString, reason: impl Into<String>) -> BenchError {
    ConfigError::InvalidFieldValue {
        field,
        value: value.to_string(),
        reason: reason.into(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_CONFIG: &str = r#"
run:
  loops: 50
  message_size: 256
  topics: 4

orchestrator:
  processes: 5
  quorum: 2
  poll_interval_us: 200
  stop_timeout_secs: 30
  root: /tmp/bench-runs
  socket_dir: /tmp/bench-sockets

publisher:
  pause_us: 0
"#;

    fn field_of(err: BenchError) -> &'static str {
        match err {
            BenchError::Config(ConfigError::InvalidFieldValue { field, .. }) => field,
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = ConfigLoader::load_string(VALID_CONFIG, &ConfigOverrides::default()).unwrap();
        assert_eq!(config.run.loops, 50);
        assert_eq!(config.run.topics.len(), 4);
        assert_eq!(config.orchestrator.processes, 5);
        assert_eq!(config.orchestrator.publishers(), 3);
        assert_eq!(config.orchestrator.quorum, 2);
        assert_eq!(config.orchestrator.stop_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.publisher.pause, Duration::ZERO);
    }

    #[test]
    fn test_defaults_applied() {
        let config = ConfigLoader::load_string("{}", &ConfigOverrides::default()).unwrap();
        assert_eq!(config.run.loops, 20);
        assert_eq!(config.run.message_size, 100);
        assert_eq!(config.run.topics.len(), 10);
        assert_eq!(config.orchestrator.processes, 2);
        assert_eq!(config.orchestrator.quorum, 1);
        assert_eq!(config.orchestrator.poll_interval, Duration::from_micros(100));
        assert_eq!(config.orchestrator.stop_timeout, None);
        assert_eq!(config.orchestrator.ready_timeout, Duration::from_secs(10));
        assert_eq!(config.publisher.pause, Duration::from_micros(10));
    }

    #[test]
    fn test_zero_ready_timeout_rejected() {
        let err = ConfigLoader::load_string(
            "orchestrator:\n  ready_timeout_ms: 0\n",
            &ConfigOverrides::default(),
        )
        .unwrap_err();
        assert_eq!(field_of(err), "ready_timeout_ms");
    }

    #[test]
    fn test_overrides_win_over_file() {
        let overrides = ConfigOverrides {
            loops: Some(3),
            processes: Some(4),
            quorum: Some(1),
            ..Default::default()
        };
        let config = ConfigLoader::load_string(VALID_CONFIG, &overrides).unwrap();
        assert_eq!(config.run.loops, 3);
        assert_eq!(config.run.message_size, 256);
        assert_eq!(config.orchestrator.processes, 4);
        assert_eq!(config.orchestrator.quorum, 1);
    }

    #[test]
    fn test_quorum_defaults_to_publisher_count() {
        let overrides = ConfigOverrides {
            processes: Some(7),
            ..Default::default()
        };
        let config = ConfigLoader::from_overrides(&overrides).unwrap();
        assert_eq!(config.orchestrator.quorum, 4);
    }

    #[test]
    fn test_quorum_above_publishers_rejected() {
        let overrides = ConfigOverrides {
            processes: Some(3),
            quorum: Some(3),
            ..Default::default()
        };
        let err = ConfigLoader::from_overrides(&overrides).unwrap_err();
        assert_eq!(field_of(err), "quorum");

        let overrides = ConfigOverrides {
            quorum: Some(0),
            ..Default::default()
        };
        let err = ConfigLoader::from_overrides(&overrides).unwrap_err();
        assert_eq!(field_of(err), "quorum");
    }

    #[test]
    fn test_single_process_rejected() {
        let overrides = ConfigOverrides {
            processes: Some(1),
            ..Default::default()
        };
        let err = ConfigLoader::from_overrides(&overrides).unwrap_err();
        assert_eq!(field_of(err), "processes");
    }

    #[test]
    fn test_topic_cap() {
        let ok = ConfigOverrides {
            topics: Some(MAX_TOPICS),
            ..Default::default()
        };
        assert!(ConfigLoader::from_overrides(&ok).is_ok());

        let too_many = ConfigOverrides {
            topics: Some(MAX_TOPICS + 1),
            ..Default::default()
        };
        let err = ConfigLoader::from_overrides(&too_many).unwrap_err();
        assert_eq!(field_of(err), "topics");
    }

    #[test]
    fn test_bad_run_values_rejected() {
        let yaml = "run:\n  loops: 0\n";
        let err = ConfigLoader::load_string(yaml, &ConfigOverrides::default()).unwrap_err();
        assert_eq!(field_of(err), "loops");

        let yaml = "run:\n  message_size: 8\n";
        let err = ConfigLoader::load_string(yaml, &ConfigOverrides::default()).unwrap_err();
        assert_eq!(field_of(err), "message_size");

        let yaml = "orchestrator:\n  poll_interval_us: 0\n";
        let err = ConfigLoader::load_string(yaml, &ConfigOverrides::default()).unwrap_err();
        assert_eq!(field_of(err), "poll_interval_us");
    }

    #[test]
    fn test_parse_error() {
        let result = ConfigLoader::load_string("run: [", &ConfigOverrides::default());
        assert!(matches!(result, Err(BenchError::ConfigParse { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result =
            ConfigLoader::load_file("/nonexistent/pulsebench.yaml", &ConfigOverrides::default());
        assert!(matches!(result, Err(BenchError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_benchmark_run_takes_directory_name() {
        let config = ConfigLoader::from_overrides(&ConfigOverrides::default()).unwrap();
        let run = BenchmarkRun::new(&config, PathBuf::from("benchmarks/26-10-19_08-30-00"));
        assert_eq!(run.run_id, "26-10-19_08-30-00");
        assert_eq!(run.topic_count, 10);
        assert_eq!(run.process_count, 2);
    }

    #[test]
    fn test_manifest_written_and_loaded() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ConfigLoader::from_overrides(&ConfigOverrides {
            loops: Some(7),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(BenchmarkRun::load_manifest(dir.path()).unwrap(), None);

        let run = BenchmarkRun::new(&config, dir.path().to_path_buf());
        let path = run.write_manifest().unwrap();
        assert!(path.ends_with(RUN_MANIFEST));

        let loaded = BenchmarkRun::load_manifest(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.loop_count, 7);
        assert_eq!(loaded.run_id, run.run_id);
        assert_eq!(loaded.started_at, run.started_at);
    }
}
