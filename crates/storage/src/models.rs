//! Storage models shared between the strategy and its collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;

/// File name of the JSON descriptor stored alongside every content instance.
pub const CONTENT_DESCRIPTOR: &str = "content.json";

/// Opaque content identifier supplied by the caller.
///
/// Usually a database row ID, sometimes a slug. It is used as one path segment
/// under `content/`, and is validated as such before the strategy touches the
/// disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);
impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
impl From<String> for ContentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
impl From<u64> for ContentId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}
