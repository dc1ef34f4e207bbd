//! Core identifier types for the dialog system
//!
//! Dialog types name a registered content component; dialog keys identify one
//! live instance. Keys are generated once at creation and never reused.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of a registered dialog kind, unique across the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogType(pub String);

impl DialogType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DialogType {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for DialogType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl std::fmt::Display for DialogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one live dialog instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogKey(pub String);

impl DialogKey {
    /// Generate a fresh process-unique key.
    pub fn generate() -> Self {
        Self(format!(
            "DIALOG_{}",
            Uuid::new_v4().simple().to_string().to_ascii_uppercase()
        ))
    }

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DialogKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
