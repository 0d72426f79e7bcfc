// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Deterministic addressing plan for a benchmark run.
//!
//! The orchestrator and every child compute the plan independently from the
//! same inputs, so it must be a pure function of `(process_count, socket_dir)`.

use std::path::{Path, PathBuf};

use crate::types::{AddressKey, ProcessName, Role};

/// One process in the addressing plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    pub index: usize,
    pub name: ProcessName,
    pub role: Role,
    pub key: AddressKey,
}

/// Mapping of process identity to role and endpoint, ordered by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKeyRegistry {
    socket_dir: PathBuf,
    entries: Vec<ServerEntry>,
}

impl ServerKeyRegistry {
    /// Build the plan for `process_count` processes.
    ///
    /// Even indices publish, odd indices subscribe. Each process gets the
    /// endpoint `{socket_dir}/app{i}.sock`.
    pub fn build(process_count: usize, socket_dir: impl AsRef<Path>) -> Self {
        let socket_dir = socket_dir.as_ref().to_path_buf();
        let entries = (0..process_count)
            .map(|index| {
                let name = ProcessName::for_index(index);
                let key = AddressKey::new(socket_dir.join(format!("{}.sock", name)));
                ServerEntry {
                    index,
                    role: Role::for_index(index),
                    name,
                    key,
                }
            })
            .collect();

        Self {
            socket_dir,
            entries,
        }
    }

    pub fn socket_dir(&self) -> &Path {
        &self.socket_dir
    }

    pub fn entries(&self) -> &[ServerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a process by identity.
    pub fn get(&self, name: &ProcessName) -> Option<&ServerEntry> {
        self.entries.iter().find(|entry| &entry.name == name)
    }

    /// Endpoints of every process with `role`, in index order.
    pub fn all_keys_for_role(&self, role: Role) -> Vec<AddressKey> {
        self.entries
            .iter()
            .filter(|entry| entry.role == role)
            .map(|entry| entry.key.clone())
            .collect()
    }

    /// Number of processes with `role`.
    pub fn count_role(&self, role: Role) -> usize {
        self.entries.iter().filter(|entry| entry.role == role).count()
    }
}
