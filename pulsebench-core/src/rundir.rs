// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Timestamped run directories and their retention policy.
//!
//! Run directories are named `YY-MM-DD_HH-MM-SS`, so lexicographic order is
//! chronological order. Once more than [`RETENTION_LIMIT`] runs exist the
//! oldest [`RETIRE_BATCH`] are removed.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::{BenchError, BenchResult};

/// Number of runs that may exist before retirement kicks in.
pub const RETENTION_LIMIT: usize = 8;

/// Number of oldest runs removed per retirement pass.
pub const RETIRE_BATCH: usize = 5;

/// Timestamp format of run directory names.
const RUN_NAME_FORMAT: &str = "%y-%m-%d_%H-%M-%S";

/// Manages run directories under a fixed benchmarks root.
#[derive(Debug, Clone)]
pub struct RunDirectoryManager {
    root: PathBuf,
}

impl RunDirectoryManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name for a run started at `at`.
    pub fn run_name(at: &DateTime<Local>) -> String {
        at.format(RUN_NAME_FORMAT).to_string()
    }

    /// Create the directory for a run started now.
    pub fn create_run_now(&self) -> BenchResult<PathBuf> {
        self.create_run(&Local::now())
    }

    /// Create the directory for a run started at `at`.
    ///
    /// An existing directory with the same name is reported and reused: two
    /// runs inside the same second share a directory rather than failing.
    pub fn create_run(&self, at: &DateTime<Local>) -> BenchResult<PathBuf> {
        fs::create_dir_all(&self.root).map_err(|source| BenchError::Io {
            context: "creating benchmarks root",
            source,
        })?;

        let path = self.root.join(Self::run_name(at));
        match fs::create_dir(&path) {
            Ok(()) => {
                tracing::info!(run_dir = %path.display(), "Created run directory");
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::error!(run_dir = %path.display(), "Run directory already exists");
            }
            Err(source) => {
                return Err(BenchError::Io {
                    context: "creating run directory",
                    source,
                })
            }
        }

        Ok(path)
    }

    /// Existing run directories, oldest first.
    ///
    /// Only directories whose names start with a digit count as runs.
    pub fn list_runs(&self) -> BenchResult<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.root).map_err(|source| BenchError::Io {
            context: "listing benchmarks root",
            source,
        })?;

        let mut runs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.chars().next())
                    .map(|c| c.is_ascii_digit())
                    .unwrap_or(false)
            })
            .map(|entry| entry.path())
            .collect();
        runs.sort();
        Ok(runs)
    }

    /// Most recent run directory, if any.
    pub fn latest_run(&self) -> BenchResult<Option<PathBuf>> {
        Ok(self.list_runs()?.pop())
    }

    /// Apply the retention policy. Returns the directories that were removed.
    ///
    /// Removal failures are logged and skipped; they never fail the run.
    pub fn retire_stale(&self) -> BenchResult<Vec<PathBuf>> {
        let runs = self.list_runs()?;
        if runs.len() <= RETENTION_LIMIT {
            return Ok(Vec::new());
        }

        let mut removed = Vec::with_capacity(RETIRE_BATCH);
        for dir in runs.into_iter().take(RETIRE_BATCH) {
            match fs::remove_dir_all(&dir) {
                Ok(()) => {
                    tracing::info!(run_dir = %dir.display(), "Retired stale run directory");
                    removed.push(dir);
                }
                Err(e) => {
                    tracing::error!(
                        run_dir = %dir.display(),
                        error = %e,
                        "Failed to retire run directory"
                    );
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(day: u32, second: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 5, day, 10, 0, second)
            .single()
            .unwrap()
    }

    #[test]
    fn test_run_name_format() {
        assert_eq!(RunDirectoryManager::run_name(&at(7, 9)), "24-05-07_10-00-09");
    }

    #[test]
    fn test_create_run_and_reuse() {
        let temp = TempDir::new().unwrap();
        let manager = RunDirectoryManager::new(temp.path().join("benchmarks"));

        let first = manager.create_run(&at(1, 0)).unwrap();
        assert!(first.is_dir());

        let again = manager.create_run(&at(1, 0)).unwrap();
        assert_eq!(first, again);
        assert_eq!(manager.list_runs().unwrap().len(), 1);
    }

    #[test]
    fn test_retention_removes_oldest_five() {
        let temp = TempDir::new().unwrap();
        let manager = RunDirectoryManager::new(temp.path());

        for day in 1..=9 {
            let dir = manager.create_run(&at(day, 0)).unwrap();
            fs::write(dir.join("pub-app0"), "0.1\n").unwrap();
        }
        let newest = manager.create_run(&at(10, 0)).unwrap();

        let removed = manager.retire_stale().unwrap();
        assert_eq!(removed.len(), 5);

        let remaining = manager.list_runs().unwrap();
        assert_eq!(remaining.len(), 5);
        assert_eq!(remaining.last(), Some(&newest));
        assert!(remaining[0].ends_with("24-05-06_10-00-00"));
    }

    #[test]
    fn test_retention_below_limit_is_noop() {
        let temp = TempDir::new().unwrap();
        let manager = RunDirectoryManager::new(temp.path());
        for day in 1..=8 {
            manager.create_run(&at(day, 0)).unwrap();
        }
        assert!(manager.retire_stale().unwrap().is_empty());
        assert_eq!(manager.list_runs().unwrap().len(), 8);
    }

    #[test]
    fn test_non_run_entries_are_ignored() {
        let temp = TempDir::new().unwrap();
        let manager = RunDirectoryManager::new(temp.path());
        fs::create_dir(temp.path().join("scratch")).unwrap();
        fs::write(temp.path().join("1-not-a-dir"), "").unwrap();
        let run = manager.create_run(&at(3, 4)).unwrap();

        assert_eq!(manager.list_runs().unwrap(), vec![run.clone()]);
        assert_eq!(manager.latest_run().unwrap(), Some(run));
    }

    #[test]
    fn test_missing_root_lists_nothing() {
        let temp = TempDir::new().unwrap();
        let manager = RunDirectoryManager::new(temp.path().join("absent"));
        assert!(manager.list_runs().unwrap().is_empty());
        assert!(manager.latest_run().unwrap().is_none());
    }
}
