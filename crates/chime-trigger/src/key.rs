//! Trigger and job identities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Group used when none is given.
pub const DEFAULT_GROUP: &str = "DEFAULT";

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

/// Identity of a trigger: name plus group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TriggerKey {
    pub name: String,
    #[serde(default = "default_group")]
    pub group: String,
}

impl TriggerKey {
    /// Create a key in the given group.
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }

    /// Create a key in the default group.
    pub fn in_default_group(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_GROUP)
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// The job a trigger fires: job name plus job group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub name: String,
    #[serde(default = "default_group")]
    pub group: String,
}

impl JobKey {
    /// Create a key in the given group.
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }

    /// Create a key in the default group.
    pub fn in_default_group(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_GROUP)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}
