//! Testing utilities for the room director.
//!
//! This module provides tools for integration testing:
//! - `ScriptedModel` for deterministic model output without HTTP calls
//! - `GatedModel` for holding a regeneration open while a test pokes at it
//! - `ManualClock` for driving cooldown and staleness by hand
//! - `TestHarness` wiring them to a [`Director`] over a [`MemoryStore`]

use crate::clock::Clock;
use crate::config::DirectorConfig;
use crate::director::Director;
use crate::entity::EntityId;
use crate::error::ModelError;
use crate::model::ModelBackend;
use crate::prompt::{parse_generation, Generation, GenerationRequest, PromptBuilder};
use crate::store::{EntityStore, MemoryStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
enum Reply {
    Fixed(Result<Generation, ModelError>),
    Raw(String),
    Echo,
}

/// A model that returns scripted replies.
///
/// Scripted replies are returned in order; once exhausted, the fallback
/// reply repeats forever.
pub struct ScriptedModel {
    label: String,
    script: Mutex<VecDeque<Result<Generation, ModelError>>>,
    fallback: Reply,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedModel {
    /// Create a model with scripted replies. After the script runs out every
    /// call fails with `Unavailable`.
    pub fn new(
        label: impl Into<String>,
        script: impl IntoIterator<Item = Result<Generation, ModelError>>,
    ) -> Self {
        Self::with_fallback(
            label,
            script,
            Reply::Fixed(Err(ModelError::Unavailable("script exhausted".into()))),
        )
    }

    /// Always answer with `text`.
    pub fn always_ok(label: impl Into<String>, text: &str) -> Self {
        Self::with_fallback(label, [], Reply::Fixed(Ok(Generation::new(text))))
    }

    /// Always fail with `err`.
    pub fn always_err(label: impl Into<String>, err: ModelError) -> Self {
        Self::with_fallback(label, [], Reply::Fixed(Err(err)))
    }

    /// Always answer with the raw reply `text`, parsed the way an HTTP model
    /// parses its reply body.
    pub fn raw(label: impl Into<String>, text: &str) -> Self {
        Self::with_fallback(label, [], Reply::Raw(text.to_string()))
    }

    /// Answer with the rendered user prompt, as a misbehaving model would.
    pub fn echo(label: impl Into<String>) -> Self {
        Self::with_fallback(label, [], Reply::Echo)
    }

    fn with_fallback(
        label: impl Into<String>,
        script: impl IntoIterator<Item = Result<Generation, ModelError>>,
        fallback: Reply,
    ) -> Self {
        Self {
            label: label.into(),
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of calls started, including ones cut short by a timeout.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedModel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match scripted {
            Some(reply) => reply,
            None => match &self.fallback {
                Reply::Fixed(reply) => reply.clone(),
                Reply::Raw(text) => parse_generation(text),
                Reply::Echo => Ok(Generation::new(PromptBuilder::render(request).user)),
            },
        }
    }
}

/// A model that blocks inside `generate` until released.
pub struct GatedModel {
    text: String,
    entered: Notify,
    gate: Notify,
    calls: AtomicUsize,
}

impl GatedModel {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            entered: Notify::new(),
            gate: Notify::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Wait until a call is parked inside `generate`.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let one parked (or the next) call finish.
    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelBackend for GatedModel {
    fn label(&self) -> &str {
        "gated"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<Generation, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(Generation::new(self.text.clone()))
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Test harness for running director scenarios.
pub struct TestHarness {
    pub director: Arc<Director>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl TestHarness {
    /// Create a director over an empty store, a manual clock and `model`.
    pub fn new(config: DirectorConfig, model: Arc<dyn ModelBackend>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let director = Director::new(config, store.clone(), model).with_clock(clock.clone());
        Self {
            director: Arc::new(director),
            store,
            clock,
        }
    }

    /// Create an entity and return its id.
    ///
    /// Panics if the store rejects it.
    pub fn room(&self, name: &str, description: &str) -> EntityId {
        match self.director.create_entity(name, description) {
            Ok(id) => id,
            Err(e) => panic!("failed to create {name}: {e}"),
        }
    }

    /// Current description of an entity.
    pub fn description(&self, id: EntityId) -> String {
        self.store
            .load_entity(id)
            .map(|e| e.description)
            .unwrap_or_default()
    }

    /// Number of change records waiting for the next regeneration.
    pub fn pending(&self, id: EntityId) -> usize {
        self.store
            .load_entity(id)
            .map(|e| e.change_log().len())
            .unwrap_or_default()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

/// Assert the entity's description equals `expected`.
#[track_caller]
pub fn assert_description(harness: &TestHarness, id: EntityId, expected: &str) {
    let actual = harness.description(id);
    assert_eq!(actual, expected, "unexpected description for {id}");
}

/// Assert the number of pending change records.
#[track_caller]
pub fn assert_pending(harness: &TestHarness, id: EntityId, expected: usize) {
    let actual = harness.pending(id);
    assert_eq!(actual, expected, "unexpected pending change count for {id}");
}
