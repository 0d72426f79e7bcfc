// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! Process identities, roles, addressing keys and topics are validated at
//! construction so the rest of the harness never sees malformed values.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Role a benchmark process plays in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Publisher,
    Subscriber,
}

impl Role {
    /// Role assigned to the process at `index`: even indices publish.
    pub const fn for_index(index: usize) -> Self {
        if index % 2 == 0 {
            Self::Publisher
        } else {
            Self::Subscriber
        }
    }

    /// Short prefix used in sample file names and channel names.
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Publisher => "pub",
            Self::Subscriber => "sub",
        }
    }

    /// Recover the role from the first character of a prefixed name.
    pub fn from_prefix_char(c: char) -> Option<Self> {
        match c {
            'p' => Some(Self::Publisher),
            's' => Some(Self::Subscriber),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Publisher => write!(f, "publisher"),
            Self::Subscriber => write!(f, "subscriber"),
        }
    }
}

/// Validated process identity such as `app3`.
/// Must be non-empty, alphanumeric with hyphens/underscores, max 64 chars.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProcessName(String);

impl ProcessName {
    /// Create a new ProcessName with validation.
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();

        if name.is_empty() {
            return Err(ConfigError::InvalidProcessName {
                name,
                reason: "Process name cannot be empty".to_string(),
            });
        }

        if name.len() > 64 {
            return Err(ConfigError::InvalidProcessName {
                reason: format!("Process name too long: {} chars (max 64)", name.len()),
                name,
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::InvalidProcessName {
                name,
                reason: "Process name must contain only ASCII alphanumerics, hyphens, and underscores"
                    .to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Canonical identity for the slot at `index`.
    pub fn for_index(index: usize) -> Self {
        Self(format!("app{}", index))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ProcessName {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProcessName> for String {
    fn from(name: ProcessName) -> Self {
        name.0
    }
}

/// Transport endpoint assigned to a process: a local IPC socket path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AddressKey(PathBuf);

impl AddressKey {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for AddressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Validated topic name. Topics travel inside datagram frames with a u16
/// length prefix, so they are capped well below that.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    /// Maximum topic length in bytes.
    pub const MAX_LEN: usize = 256;

    pub fn new(topic: impl Into<String>) -> Result<Self, ConfigError> {
        let topic = topic.into();
        if topic.is_empty() || topic.len() > Self::MAX_LEN {
            return Err(ConfigError::InvalidFieldValue {
                field: "topic",
                value: topic,
                reason: format!("Topic must be 1..={} bytes", Self::MAX_LEN),
            });
        }
        if topic.contains('|') {
            return Err(ConfigError::InvalidFieldValue {
                field: "topic",
                value: topic,
                reason: "Topic must not contain the payload delimiter '|'".to_string(),
            });
        }
        Ok(Self(topic))
    }

    /// Topic used for the `index`-th benchmark stream.
    pub fn for_index(index: usize) -> Self {
        Self(format!("/test.app{}/1/dummy", index + 1))
    }

    /// The standard topic set for a run with `count` topics.
    pub fn standard_set(count: usize) -> Vec<Self> {
        (0..count).map(Self::for_index).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Topic {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_alternates() {
        assert_eq!(Role::for_index(0), Role::Publisher);
        assert_eq!(Role::for_index(1), Role::Subscriber);
        assert_eq!(Role::for_index(2), Role::Publisher);
    }

    #[test]
    fn test_role_prefix_round_trip() {
        for role in [Role::Publisher, Role::Subscriber] {
            let first = role.prefix().chars().next().unwrap();
            assert_eq!(Role::from_prefix_char(first), Some(role));
        }
        assert_eq!(Role::from_prefix_char('x'), None);
    }

    #[test]
    fn test_valid_process_name() {
        assert!(ProcessName::new("app0").is_ok());
        assert!(ProcessName::new("pub_worker-2").is_ok());
        assert_eq!(ProcessName::for_index(7).as_str(), "app7");
    }

    #[test]
    fn test_invalid_process_name() {
        assert!(ProcessName::new("").is_err());
        assert!(ProcessName::new("app 1").is_err());
        assert!(ProcessName::new("../app").is_err());
        assert!(ProcessName::new("a".repeat(65)).is_err());
    }

    #[test]
    fn test_topic_validation() {
        assert!(Topic::new("/test.app1/1/dummy").is_ok());
        assert!(Topic::new("").is_err());
        assert!(Topic::new("a|b").is_err());
        assert_eq!(Topic::standard_set(3).len(), 3);
        assert_eq!(Topic::for_index(0).as_str(), "/test.app1/1/dummy");
    }
}
