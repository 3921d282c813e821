//! Work-item identifiers.
//!
//! A work item is one generation request. The backend routes push events for
//! it to whichever connection registered its id, and embeds the id in every
//! classified payload so consumers can tell whose result arrived.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An opaque work-item identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkItemId(String);

impl WorkItemId {
    /// Create a work-item id, rejecting blank values.
    pub fn new(id: impl Into<String>) -> Result<Self, WorkItemIdError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(WorkItemIdError::Empty);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether a payload's embedded `id` refers to this work item.
    ///
    /// Backends are inconsistent about emitting ids as strings or numbers,
    /// so a JSON number is compared by its decimal text.
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match value.get("id") {
            Some(serde_json::Value::String(s)) => s == &self.0,
            Some(serde_json::Value::Number(n)) => n.to_string() == self.0,
            _ => false,
        }
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorkItemId {
    type Err = WorkItemIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for WorkItemId {
    type Error = WorkItemIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<WorkItemId> for String {
    fn from(id: WorkItemId) -> Self {
        id.0
    }
}

/// Error constructing a work-item id.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkItemIdError {
    #[error("work-item id cannot be empty")]
    Empty,
}
