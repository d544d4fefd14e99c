//! Entities (rooms and objects) and the fact store they carry.
//!
//! Facts and the change log live on the entity itself; every mutating
//! operation here appends exactly one [`ChangeRecord`] when it changes state.

use crate::change_log::{ChangeKind, ChangeLog, ChangeRecord, EventKind};
use crate::error::{DirectorError, DirectorResult};
use crate::facts::{Authority, Fact, FactSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a room or object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Create a new unique entity ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A room or object with facts and a generated description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    facts: BTreeMap<String, Fact>,
    pub description: String,
    /// Short scene anchors returned alongside the last description.
    #[serde(default)]
    pub anchors: Vec<String>,
    change_log: ChangeLog,
    pub created_at: DateTime<Utc>,
    pub last_regenerated_at: Option<DateTime<Utc>>,
    /// Mirrors the director's lock; never persisted.
    #[serde(skip)]
    pub regeneration_in_progress: bool,
}

impl Entity {
    /// Create a new entity with a starting description.
    pub fn new(name: impl Into<String>, description: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            facts: BTreeMap::new(),
            description: description.into(),
            anchors: Vec::new(),
            change_log: ChangeLog::new(),
            created_at: now,
            last_regenerated_at: None,
            regeneration_in_progress: false,
        }
    }

    pub fn change_log(&self) -> &ChangeLog {
        &self.change_log
    }

    pub(crate) fn change_log_mut(&mut self) -> &mut ChangeLog {
        &mut self.change_log
    }

    pub fn fact(&self, key: &str) -> Option<&Fact> {
        self.facts.get(key)
    }

    pub fn fact_count(&self) -> usize {
        self.facts.len()
    }

    /// Pinned facts ordered by key.
    pub fn pinned_facts(&self) -> impl Iterator<Item = &Fact> {
        self.facts.values().filter(|f| f.pinned)
    }

    // =========================================================================
    // Fact store
    // =========================================================================

    /// Insert or update a fact.
    ///
    /// Inference may not overwrite a pinned fact without [`Authority::Override`].
    /// `pin = false` never unpins an existing fact.
    pub fn set_fact(
        &mut self,
        key: &str,
        value: &str,
        source: FactSource,
        pin: bool,
        authority: Authority,
        now: DateTime<Utc>,
    ) -> DirectorResult<&ChangeRecord> {
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() {
            return Err(DirectorError::InvalidFact("fact key is empty".to_string()));
        }

        let record = match self.facts.get_mut(key) {
            Some(fact) => {
                if fact.pinned && source == FactSource::Inferred && authority != Authority::Override
                {
                    return Err(DirectorError::PinnedFact {
                        key: key.to_string(),
                    });
                }
                let was_pinned = fact.pinned;
                let old = std::mem::take(&mut fact.value);
                fact.update(value, source, now);
                fact.pinned |= pin;
                ChangeRecord::new(
                    ChangeKind::FactUpdated,
                    format!("{key}: {old} -> {value}"),
                    was_pinned || fact.pinned,
                    now,
                )
            }
            None => {
                self.facts
                    .insert(key.to_string(), Fact::new(key, value, source, pin, now));
                ChangeRecord::new(ChangeKind::FactAdded, format!("{key}: {value}"), pin, now)
            }
        };

        Ok(self.append(record))
    }

    /// Remove a fact. Pinned facts need [`Authority::Override`].
    pub fn remove_fact(
        &mut self,
        key: &str,
        authority: Authority,
        now: DateTime<Utc>,
    ) -> DirectorResult<&ChangeRecord> {
        let key = key.trim();
        let removed = match self.facts.entry(key.to_string()) {
            Entry::Vacant(_) => {
                return Err(DirectorError::NotFound {
                    key: key.to_string(),
                })
            }
            Entry::Occupied(entry) => {
                if entry.get().pinned && authority != Authority::Override {
                    return Err(DirectorError::PinnedFact {
                        key: key.to_string(),
                    });
                }
                entry.remove()
            }
        };

        Ok(self.append(ChangeRecord::new(
            ChangeKind::FactRemoved,
            removed.render(),
            removed.pinned,
            now,
        )))
    }

    /// Pin or unpin a fact. Returns `None` when the flag already had that value.
    pub fn set_pinned(
        &mut self,
        key: &str,
        pinned: bool,
        now: DateTime<Utc>,
    ) -> DirectorResult<Option<&ChangeRecord>> {
        let key = key.trim();
        let fact = self.facts.get_mut(key).ok_or_else(|| DirectorError::NotFound {
            key: key.to_string(),
        })?;
        if fact.pinned == pinned {
            return Ok(None);
        }

        fact.pinned = pinned;
        fact.updated_at = now;
        let verb = if pinned { "pinned" } else { "unpinned" };
        let summary = format!("{} ({verb})", fact.render());
        Ok(Some(self.append(ChangeRecord::new(
            ChangeKind::FactUpdated,
            summary,
            true,
            now,
        ))))
    }

    /// Log a world event that is not tied to a fact.
    pub fn record_event(&mut self, summary: &str, force: bool, now: DateTime<Utc>) -> &ChangeRecord {
        let kind = if force {
            EventKind::ForceRefresh
        } else {
            EventKind::Note
        };
        self.append(ChangeRecord::new(
            ChangeKind::Event(kind),
            summary.trim(),
            false,
            now,
        ))
    }

    /// Facts ordered by `updated_at` descending, ties broken by key.
    pub fn list_facts(&self, include_unpinned: bool) -> Vec<Fact> {
        let mut facts: Vec<Fact> = self
            .facts
            .values()
            .filter(|f| include_unpinned || f.pinned)
            .cloned()
            .collect();
        facts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.key.cmp(&b.key)));
        facts
    }

    fn append(&mut self, record: ChangeRecord) -> &ChangeRecord {
        self.change_log.push(record)
    }
}
