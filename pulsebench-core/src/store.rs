// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Per-process latency sample files.
//!
//! Each benchmark process owns exactly one file in the run directory, named
//! `{role-prefix}-{identity}`. Values are written one per line with nine
//! decimal digits so the aggregator can classify and parse them without
//! any shared schema.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::types::{ProcessName, Role};

/// Samples parsed from one file plus the number of rejected lines.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SampleFile {
    pub samples: Vec<f64>,
    pub malformed: usize,
}

/// All samples of a run, merged by role.
#[derive(Debug, Default, Clone)]
pub struct RunSamples {
    pub publish: Vec<f64>,
    pub subscribe: Vec<f64>,
    /// Sample files that were read.
    pub files: Vec<PathBuf>,
    /// Lines rejected across all files.
    pub malformed: usize,
}

/// File name for the samples of `identity` acting as `role`.
pub fn sample_file_name(role: Role, identity: &ProcessName) -> String {
    format!("{}-{}", role.prefix(), identity)
}

/// Classify a sample file by the first character of its name.
pub fn classify(file_name: &str) -> Option<Role> {
    file_name.chars().next().and_then(Role::from_prefix_char)
}

/// Append `samples` to `path`, one fixed-precision value per line.
///
/// The file is created if missing. Open or write failures are returned
/// immediately; nothing is retried.
pub fn append(path: &Path, samples: &[f64]) -> Result<(), StoreError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    let mut writer = BufWriter::new(file);
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    for value in samples {
        writeln!(writer, "{:.9}", value).map_err(write_err)?;
    }
    writer.flush().map_err(write_err)?;

    tracing::debug!(path = %path.display(), count = samples.len(), "Appended samples");
    Ok(())
}

/// Read every sample from `path`.
///
/// Blank lines are skipped. Lines that do not parse as a float are logged
/// and counted in [`SampleFile::malformed`] instead of aborting the read.
pub fn read_all(path: &Path) -> Result<SampleFile, StoreError> {
    let file = fs::File::open(path).map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut result = SampleFile::default();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => result.samples.push(value),
            _ => {
                tracing::warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    value = %trimmed,
                    "Skipping malformed sample"
                );
                result.malformed += 1;
            }
        }
    }

    Ok(result)
}

/// Read every sample file in a run directory and merge them by role.
///
/// Files whose names do not start with a role prefix are ignored; files
/// that cannot be opened are logged and skipped.
pub fn collect_run(dir: &Path) -> Result<RunSamples, StoreError> {
    let entries = fs::read_dir(dir).map_err(|source| StoreError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut run = RunSamples::default();
    for path in paths {
        let Some(role) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(classify)
        else {
            continue;
        };

        match read_all(&path) {
            Ok(file) => {
                run.malformed += file.malformed;
                match role {
                    Role::Publisher => run.publish.extend(file.samples),
                    Role::Subscriber => run.subscribe.extend(file.samples),
                }
                run.files.push(path);
            }
            Err(e) => {
                tracing::error!(error = %e, "Skipping unreadable sample file");
            }
        }
    }

    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_nine_digits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pub-app0");
        let samples = vec![0.000012345, 1.5, 0.123456789, 42.0];

        append(&path, &samples).unwrap();
        let read = read_all(&path).unwrap();

        assert_eq!(read.samples.len(), samples.len());
        assert_eq!(read.malformed, 0);
        for (a, b) in read.samples.iter().zip(&samples) {
            assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
        }
    }

    #[test]
    fn test_append_accumulates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub-app1");

        append(&path, &[1.0, 2.0]).unwrap();
        append(&path, &[3.0]).unwrap();

        assert_eq!(read_all(&path).unwrap().samples, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub-app1");
        fs::write(&path, "0.5\nnot-a-number\n\n0.25\nNaN\n").unwrap();

        let read = read_all(&path).unwrap();
        assert_eq!(read.samples, vec![0.5, 0.25]);
        assert_eq!(read.malformed, 2);
    }

    #[test]
    fn test_open_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("pub-app0");
        assert!(matches!(
            append(&path, &[1.0]),
            Err(StoreError::Open { .. })
        ));
        assert!(matches!(read_all(&path), Err(StoreError::Open { .. })));
    }

    #[test]
    fn test_file_names_and_classification() {
        let name = ProcessName::for_index(3);
        assert_eq!(sample_file_name(Role::Publisher, &name), "pub-app3");
        assert_eq!(sample_file_name(Role::Subscriber, &name), "sub-app3");
        assert_eq!(classify("pub-app3"), Some(Role::Publisher));
        assert_eq!(classify("sub-app3"), Some(Role::Subscriber));
        assert_eq!(classify("report.json"), None);
        assert_eq!(classify(""), None);
    }

    #[test]
    fn test_collect_run_merges_by_role() {
        let dir = TempDir::new().unwrap();
        append(&dir.path().join("pub-app0"), &[0.1, 0.2]).unwrap();
        append(&dir.path().join("pub-app2"), &[0.3]).unwrap();
        append(&dir.path().join("sub-app1"), &[1.0, 2.0, 3.0]).unwrap();
        fs::write(dir.path().join("report.json"), "{}").unwrap();
        fs::create_dir(dir.path().join("stray")).unwrap();

        let run = collect_run(dir.path()).unwrap();
        assert_eq!(run.publish, vec![0.1, 0.2, 0.3]);
        assert_eq!(run.subscribe, vec![1.0, 2.0, 3.0]);
        assert_eq!(run.files.len(), 3);
    }
}
