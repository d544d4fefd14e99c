//! Change log: pending mutations since the last committed regeneration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kinds of world events that can be logged without touching a fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Something happened that the description may want to reflect.
    Note,
    /// Regenerate regardless of thresholds and cooldown.
    ForceRefresh,
}

/// What a change record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    FactAdded,
    FactUpdated,
    FactRemoved,
    Event(EventKind),
}

impl ChangeKind {
    /// Short prefix used when summarizing changes for the model.
    pub fn prefix(&self) -> &'static str {
        match self {
            ChangeKind::FactAdded => "added",
            ChangeKind::FactUpdated => "updated",
            ChangeKind::FactRemoved => "removed",
            ChangeKind::Event(EventKind::Note) => "event",
            ChangeKind::Event(EventKind::ForceRefresh) => "refresh",
        }
    }
}

/// One mutation since the last commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    pub summary: String,
    /// The mutated fact was pinned before or after the change.
    #[serde(default)]
    pub pinned: bool,
    pub at: DateTime<Utc>,
}

impl ChangeRecord {
    pub fn new(kind: ChangeKind, summary: impl Into<String>, pinned: bool, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            summary: summary.into(),
            pinned,
            at,
        }
    }

    /// `<kind>: <summary>`
    pub fn render(&self) -> String {
        format!("{}: {}", self.kind.prefix(), self.summary)
    }

    pub fn is_forced(&self) -> bool {
        self.kind == ChangeKind::Event(EventKind::ForceRefresh)
    }
}

/// Ordered, append-only sequence of change records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeLog {
    records: Vec<ChangeRecord>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ChangeRecord) -> &ChangeRecord {
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.records.iter()
    }

    /// Drop the oldest `count` records, i.e. those a committed request consumed.
    ///
    /// Records appended after the request was built stay for the next cycle.
    pub fn consume(&mut self, count: usize) {
        let count = count.min(self.records.len());
        self.records.drain(..count);
    }
}
