//! Room Director: keeps prose descriptions of rooms and objects in a text
//! world consistent with their structured facts.
//!
//! This crate provides:
//! - A per-entity fact store with pinning and authority rules
//! - A change log and detector that decide when a description is stale
//! - Prompt building and a local-first model client with remote fallback
//! - A director that regenerates descriptions, at most one at a time per entity
//! - World snapshots for save/load
//!
//! # Quick Start
//!
//! ```ignore
//! use room_director::{Director, DirectorConfig, FactSource, MemoryStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let director = Director::from_config(DirectorConfig::from_env()?, store)?;
//!
//!     let hall = director.create_entity("Great Hall", "A long hall of grey stone.")?;
//!     director.set_fact(hall, "banners", "crimson", FactSource::User, true).await?;
//!
//!     let text = director.force_refresh(hall).await?;
//!     println!("{text}");
//!     Ok(())
//! }
//! ```

pub mod change_log;
pub mod clock;
pub mod config;
pub mod detector;
pub mod director;
pub mod entity;
pub mod error;
pub mod facts;
pub mod model;
pub mod persist;
pub mod prompt;
pub mod store;
pub mod testing;

// Primary public API
pub use change_log::{ChangeKind, ChangeLog, ChangeRecord, EventKind};
pub use clock::{Clock, SystemClock};
pub use config::{Credential, DirectorConfig};
pub use detector::{ChangeDetector, Trigger};
pub use director::{Director, Mutation, Outcome, Proposal, RegenState, Status};
pub use entity::{Entity, EntityId};
pub use error::{ConfigError, DirectorError, DirectorResult, ModelError, StoreError};
pub use facts::{Authority, Fact, FactSource};
pub use model::{FallbackModel, LocalModel, ModelBackend, RemoteModel, RetryPolicy};
pub use persist::WorldSnapshot;
pub use prompt::{Generation, GenerationRequest, PromptBuilder, RenderedPrompt};
pub use store::{EntityStore, MemoryStore};
pub use testing::{GatedModel, ManualClock, ScriptedModel, TestHarness};
