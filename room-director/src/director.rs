//! The room director.
//!
//! Drives the pipeline fact store → change detector → prompt builder →
//! model → validation → commit, one regeneration at a time per entity.
//!
//! ```text
//!            trigger / forced             success + valid
//!   Idle ───────────────────────▶ Locked ─────────────────▶ Idle (committed)
//!    ▲                              │
//!    └──────────────────────────────┘
//!          failure (log kept, description untouched)
//! ```
//!
//! Locking is a compare-and-set on a per-entity flag: a trigger that finds
//! the entity locked returns [`DirectorError::AlreadyInProgress`] at once
//! instead of queuing. Changes that arrive while a model call is in flight
//! stay in the change log for the next cycle.

use crate::clock::{Clock, SystemClock};
use crate::config::DirectorConfig;
use crate::detector::{ChangeDetector, Trigger};
use crate::entity::{Entity, EntityId};
use crate::error::{DirectorError, DirectorResult, ModelError};
use crate::facts::{Authority, Fact, FactSource};
use crate::model::{FallbackModel, ModelBackend};
use crate::prompt::{Generation, GenerationRequest, PromptBuilder, SYSTEM_PROMPT_HEADER};
use crate::store::EntityStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// A change to an entity's facts or event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    SetFact {
        key: String,
        value: String,
        source: FactSource,
        #[serde(default)]
        pin: bool,
        #[serde(default)]
        authority: Authority,
    },
    RemoveFact {
        key: String,
        #[serde(default)]
        authority: Authority,
    },
    Pin {
        key: String,
    },
    Unpin {
        key: String,
    },
    Event {
        summary: String,
        #[serde(default)]
        force: bool,
    },
}

impl Mutation {
    pub fn set_fact(key: impl Into<String>, value: impl Into<String>, source: FactSource) -> Self {
        Mutation::SetFact {
            key: key.into(),
            value: value.into(),
            source,
            pin: false,
            authority: Authority::Normal,
        }
    }

    pub fn set_pinned_fact(
        key: impl Into<String>,
        value: impl Into<String>,
        source: FactSource,
    ) -> Self {
        Mutation::SetFact {
            key: key.into(),
            value: value.into(),
            source,
            pin: true,
            authority: Authority::Normal,
        }
    }

    pub fn remove_fact(key: impl Into<String>) -> Self {
        Mutation::RemoveFact {
            key: key.into(),
            authority: Authority::Normal,
        }
    }

    pub fn pin(key: impl Into<String>) -> Self {
        Mutation::Pin { key: key.into() }
    }

    pub fn unpin(key: impl Into<String>) -> Self {
        Mutation::Unpin { key: key.into() }
    }

    pub fn event(summary: impl Into<String>) -> Self {
        Mutation::Event {
            summary: summary.into(),
            force: false,
        }
    }

    /// Grant override authority over pinned facts.
    pub fn with_override(mut self) -> Self {
        match &mut self {
            Mutation::SetFact { authority, .. } | Mutation::RemoveFact { authority, .. } => {
                *authority = Authority::Override;
            }
            _ => {}
        }
        self
    }

    fn apply(self, entity: &mut Entity, now: DateTime<Utc>) -> DirectorResult<()> {
        match self {
            Mutation::SetFact {
                key,
                value,
                source,
                pin,
                authority,
            } => entity
                .set_fact(&key, &value, source, pin, authority, now)
                .map(|_| ()),
            Mutation::RemoveFact { key, authority } => {
                entity.remove_fact(&key, authority, now).map(|_| ())
            }
            Mutation::Pin { key } => entity.set_pinned(&key, true, now).map(|_| ()),
            Mutation::Unpin { key } => entity.set_pinned(&key, false, now).map(|_| ()),
            Mutation::Event { summary, force } => {
                entity.record_event(&summary, force, now);
                Ok(())
            }
        }
    }
}

/// Regeneration state of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegenState {
    Idle,
    Locked,
}

/// Snapshot reported by [`Director::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub state: RegenState,
    /// Error of the most recent failed attempt, cleared by a success.
    pub last_error: Option<String>,
    pub pending_changes: usize,
    pub last_regenerated_at: Option<DateTime<Utc>>,
}

/// What happened to a proposed change after it was applied.
#[derive(Debug)]
pub enum Outcome {
    /// The detector did not call for a regeneration.
    NotTriggered,
    /// A new description was committed.
    Committed(String),
    /// Another regeneration of this entity was already running.
    AlreadyInProgress,
    /// The regeneration attempt failed; the entity is unchanged.
    Failed(DirectorError),
}

/// Result of [`Director::propose_change`].
#[derive(Debug)]
pub struct Proposal {
    pub trigger: Trigger,
    pub outcome: Outcome,
}

impl Proposal {
    pub fn committed(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Committed(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Slot {
    busy: AtomicBool,
    /// Serializes load-modify-save sections; never held across an await.
    edit: Mutex<()>,
    last_error: Mutex<Option<String>>,
}

/// Held for the duration of one regeneration attempt.
struct Lease {
    slot: Arc<Slot>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.slot.busy.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Orchestrates fact changes and description regeneration.
pub struct Director {
    config: DirectorConfig,
    detector: ChangeDetector,
    store: Arc<dyn EntityStore>,
    model: Arc<dyn ModelBackend>,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<EntityId, Arc<Slot>>>,
    /// Serializes name checks in `create_entity`.
    names: Mutex<()>,
}

impl Director {
    /// Create a director over an entity store and a model.
    pub fn new(
        config: DirectorConfig,
        store: Arc<dyn EntityStore>,
        model: Arc<dyn ModelBackend>,
    ) -> Self {
        Self {
            detector: ChangeDetector::new(&config),
            config,
            store,
            model,
            clock: Arc::new(SystemClock),
            slots: Mutex::new(HashMap::new()),
            names: Mutex::new(()),
        }
    }

    /// Create a director using the HTTP models described by `config`.
    pub fn from_config(
        config: DirectorConfig,
        store: Arc<dyn EntityStore>,
    ) -> Result<Self, ModelError> {
        let model = FallbackModel::from_config(&config)?;
        if !model.has_remote() {
            info!("no remote credential configured, running local-only");
        }
        Ok(Self::new(config, store, Arc::new(model)))
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // =========================================================================
    // Entities and facts
    // =========================================================================

    /// Create a room or object and persist it.
    ///
    /// Names are unique, compared case-insensitively.
    pub fn create_entity(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> DirectorResult<EntityId> {
        let entity = Entity::new(name, description, self.clock.now());
        let _guard = lock(&self.names);
        if self.store.find_by_name(&entity.name).is_some() {
            return Err(DirectorError::NameTaken { name: entity.name });
        }
        self.store.save_entity(&entity)?;
        info!(entity = %entity.id, name = %entity.name, "entity created");
        Ok(entity.id)
    }

    /// Load an entity; `regeneration_in_progress` reflects the live lock.
    pub fn entity(&self, id: EntityId) -> DirectorResult<Entity> {
        let mut entity = self.store.load_entity(id)?;
        entity.regeneration_in_progress = self.is_locked(id);
        Ok(entity)
    }

    /// Every entity in the store, ordered by name.
    pub fn entities(&self) -> DirectorResult<Vec<Entity>> {
        let mut entities = self
            .store
            .entity_ids()
            .into_iter()
            .map(|id| self.entity(id))
            .collect::<DirectorResult<Vec<_>>>()?;
        entities.sort_by_key(|e| e.name.to_lowercase());
        Ok(entities)
    }

    pub fn find_entity(&self, name: &str) -> Option<EntityId> {
        self.store.find_by_name(name)
    }

    /// Facts ordered by `updated_at` descending.
    pub fn list_facts(&self, id: EntityId, include_unpinned: bool) -> DirectorResult<Vec<Fact>> {
        Ok(self.store.load_entity(id)?.list_facts(include_unpinned))
    }

    pub async fn set_fact(
        &self,
        id: EntityId,
        key: &str,
        value: &str,
        source: FactSource,
        pin: bool,
    ) -> DirectorResult<Proposal> {
        let mutation = if pin {
            Mutation::set_pinned_fact(key, value, source)
        } else {
            Mutation::set_fact(key, value, source)
        };
        self.propose_change(id, mutation).await
    }

    pub async fn remove_fact(&self, id: EntityId, key: &str) -> DirectorResult<Proposal> {
        self.propose_change(id, Mutation::remove_fact(key)).await
    }

    pub async fn pin(&self, id: EntityId, key: &str) -> DirectorResult<Proposal> {
        self.propose_change(id, Mutation::pin(key)).await
    }

    pub async fn unpin(&self, id: EntityId, key: &str) -> DirectorResult<Proposal> {
        self.propose_change(id, Mutation::unpin(key)).await
    }

    /// Log a world event; `force` requests a regeneration that skips the cooldown.
    pub async fn record_event(
        &self,
        id: EntityId,
        summary: &str,
        force: bool,
    ) -> DirectorResult<Proposal> {
        let mutation = Mutation::Event {
            summary: summary.to_string(),
            force,
        };
        self.propose_change(id, mutation).await
    }

    // =========================================================================
    // Public director API
    // =========================================================================

    /// Apply a mutation, evaluate the change log and regenerate if warranted.
    ///
    /// Fact-store errors are returned as `Err`; regeneration results,
    /// including failures, are reported in [`Proposal::outcome`].
    pub async fn propose_change(
        &self,
        id: EntityId,
        mutation: Mutation,
    ) -> DirectorResult<Proposal> {
        let now = self.clock.now();
        let trigger = self.edit(id, |entity| {
            mutation.apply(entity, now)?;
            let log = entity.change_log();
            let trigger =
                self.detector
                    .evaluate(log, entity.last_regenerated_at, entity.created_at, now);
            debug!(entity = %id, pending = log.len(), ?trigger, "change applied");
            Ok(trigger)
        })?;

        let outcome = if trigger.fires() {
            match self.regenerate(id).await {
                Ok(text) => Outcome::Committed(text),
                Err(DirectorError::AlreadyInProgress(_)) => Outcome::AlreadyInProgress,
                Err(e) => Outcome::Failed(e),
            }
        } else {
            Outcome::NotTriggered
        };

        Ok(Proposal { trigger, outcome })
    }

    /// Regenerate now, ignoring thresholds and the cooldown.
    pub async fn force_refresh(&self, id: EntityId) -> DirectorResult<String> {
        self.store.load_entity(id)?;
        self.regenerate(id).await
    }

    /// Current regeneration state and last error of an entity.
    pub fn status(&self, id: EntityId) -> DirectorResult<Status> {
        let entity = self.store.load_entity(id)?;
        let state = if self.is_locked(id) {
            RegenState::Locked
        } else {
            RegenState::Idle
        };
        let last_error = self
            .peek(id)
            .and_then(|slot| lock(&slot.last_error).clone());

        Ok(Status {
            state,
            last_error,
            pending_changes: entity.change_log().len(),
            last_regenerated_at: entity.last_regenerated_at,
        })
    }

    // =========================================================================
    // Regeneration
    // =========================================================================

    async fn regenerate(&self, id: EntityId) -> DirectorResult<String> {
        let Some(lease) = self.try_lock(id)? else {
            debug!(entity = %id, "regeneration already in progress, dropping trigger");
            return Err(DirectorError::AlreadyInProgress(id));
        };

        let result = self.attempt(id).await;

        match &result {
            Ok(text) => {
                *lock(&lease.slot.last_error) = None;
                info!(entity = %id, chars = text.len(), "description regenerated");
            }
            Err(e) => {
                *lock(&lease.slot.last_error) = Some(e.to_string());
                warn!(entity = %id, error = %e, "regeneration failed, keeping previous description");
            }
        }

        drop(lease);
        result
    }

    async fn attempt(&self, id: EntityId) -> DirectorResult<String> {
        let request = PromptBuilder::build(&self.store.load_entity(id)?)?;

        let generation = self
            .model
            .generate(&request)
            .await
            .map_err(DirectorError::from)
            .and_then(|generation| self.validate(&request, generation))?;

        let now = self.clock.now();
        self.edit(id, |entity| {
            entity.description = generation.text.clone();
            if !generation.anchors.is_empty() {
                entity.anchors = generation.anchors.clone();
            }
            entity.last_regenerated_at = Some(now);
            entity
                .change_log_mut()
                .consume(request.consumed_changes());
            Ok(generation.text.clone())
        })
    }

    /// Reject empty, echoed or oversized output.
    fn validate(
        &self,
        request: &GenerationRequest,
        generation: Generation,
    ) -> DirectorResult<Generation> {
        let text = generation.text.trim();
        if text.is_empty() {
            return Err(unavailable("model returned an empty description"));
        }

        let prompt = PromptBuilder::render(request);
        let payload = prompt.user.trim();
        if text == payload || text.contains(payload) || text.contains(SYSTEM_PROMPT_HEADER) {
            return Err(unavailable("model echoed the prompt"));
        }

        if text.chars().count() > self.config.max_description_chars {
            return Err(unavailable("model description exceeds length limit"));
        }

        Ok(Generation {
            text: text.to_string(),
            anchors: generation.anchors,
        })
    }

    // =========================================================================
    // Per-entity slots
    // =========================================================================

    fn peek(&self, id: EntityId) -> Option<Arc<Slot>> {
        lock(&self.slots).get(&id).cloned()
    }

    fn is_locked(&self, id: EntityId) -> bool {
        self.peek(id)
            .is_some_and(|slot| slot.busy.load(Ordering::Acquire))
    }

    /// The slot of a stored entity; unknown ids get none.
    fn slot(&self, id: EntityId) -> DirectorResult<Arc<Slot>> {
        if let Some(slot) = self.peek(id) {
            return Ok(slot);
        }
        self.store.load_entity(id)?;
        Ok(lock(&self.slots).entry(id).or_default().clone())
    }

    fn try_lock(&self, id: EntityId) -> DirectorResult<Option<Lease>> {
        let slot = self.slot(id)?;
        Ok(slot
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Lease { slot }))
    }

    /// Load, mutate and save an entity under its edit lock.
    ///
    /// Nothing is saved when `f` fails.
    fn edit<R>(
        &self,
        id: EntityId,
        f: impl FnOnce(&mut Entity) -> DirectorResult<R>,
    ) -> DirectorResult<R> {
        let slot = self.slot(id)?;
        let _guard = lock(&slot.edit);
        let mut entity = self.store.load_entity(id)?;
        let result = f(&mut entity)?;
        self.store.save_entity(&entity)?;
        Ok(result)
    }
}

fn unavailable(reason: &str) -> DirectorError {
    DirectorError::GenerationUnavailable {
        reason: reason.to_string(),
    }
}
