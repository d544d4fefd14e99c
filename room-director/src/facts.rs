//! Facts: keyed, pinnable pieces of information about an entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a fact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactSource {
    /// Edited by a player through a command.
    User,
    /// Set by world logic.
    System,
    /// Produced by automated inference.
    Inferred,
}

impl FactSource {
    /// Get the display name for this source.
    pub fn name(&self) -> &'static str {
        match self {
            FactSource::User => "user",
            FactSource::System => "system",
            FactSource::Inferred => "inferred",
        }
    }
}

/// Authority a caller holds over pinned facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    /// Pinned facts may not be removed or overwritten by inference.
    #[default]
    Normal,
    /// Explicitly authorized to touch pinned facts.
    Override,
}

/// A single fact about an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    /// Unique per entity.
    pub key: String,
    pub value: String,
    pub source: FactSource,
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Fact {
    /// Create a new fact stamped at `now`.
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        source: FactSource,
        pinned: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            source,
            pinned,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the value in place, keeping `created_at`.
    pub fn update(&mut self, value: impl Into<String>, source: FactSource, now: DateTime<Utc>) {
        self.value = value.into();
        self.source = source;
        self.updated_at = now;
    }

    /// `key: value`, as fed to the model.
    pub fn render(&self) -> String {
        format!("{}: {}", self.key, self.value)
    }
}
