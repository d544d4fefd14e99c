//! Behavioural tests for the director pipeline.
//!
//! All of these run against scripted models and a manual clock; no network.

use room_director::testing::{assert_description, assert_pending};
use room_director::{
    Clock, DirectorConfig, DirectorError, EntityStore, FactSource, FallbackModel, GatedModel,
    ModelError, Mutation, Outcome, RegenState, RetryPolicy, ScriptedModel, TestHarness, Trigger,
};
use std::sync::Arc;
use std::time::Duration;

fn config() -> DirectorConfig {
    DirectorConfig::default()
}

// =============================================================================
// Change log and detection
// =============================================================================

#[tokio::test]
async fn test_log_length_counts_mutations_since_commit() {
    let model = Arc::new(ScriptedModel::always_ok("local", "Unused."));
    let h = TestHarness::new(config().with_change_threshold(100), model.clone());
    let room = h.room("Pantry", "Shelves of jars.");

    let d = &h.director;
    d.set_fact(room, "jars", "pickles", FactSource::User, false)
        .await
        .unwrap();
    d.set_fact(room, "jars", "jam", FactSource::User, false)
        .await
        .unwrap();
    d.set_fact(room, "light", "dim", FactSource::System, false)
        .await
        .unwrap();
    d.remove_fact(room, "light").await.unwrap();
    d.propose_change(room, Mutation::event("a mouse scurries past"))
        .await
        .unwrap();

    assert_pending(&h, room, 5);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_threshold_five_regenerates_on_fifth_update() {
    let model = Arc::new(ScriptedModel::always_ok("local", "A quiet study lit by a green lamp."));
    let h = TestHarness::new(config().with_change_threshold(5), model.clone());
    let room = h.room("Study", "A quiet study.");

    for i in 0..4 {
        let p = h
            .director
            .set_fact(room, "lamp", &format!("state {i}"), FactSource::User, false)
            .await
            .unwrap();
        assert_eq!(p.trigger, Trigger::NoTrigger);
        assert!(matches!(p.outcome, Outcome::NotTriggered));
    }
    let status = h.director.status(room).unwrap();
    assert_eq!(status.state, RegenState::Idle);
    assert_eq!(status.pending_changes, 4);
    assert_eq!(status.last_regenerated_at, None);
    assert_eq!(model.calls(), 0);

    h.advance(Duration::from_secs(1));
    let p = h
        .director
        .set_fact(room, "lamp", "green", FactSource::User, false)
        .await
        .unwrap();
    assert_eq!(p.trigger, Trigger::Trigger);
    assert_eq!(p.committed(), Some("A quiet study lit by a green lamp."));

    let status = h.director.status(room).unwrap();
    assert_eq!(status.last_regenerated_at, Some(h.clock.now()));
    assert_eq!(status.pending_changes, 0);
    assert_eq!(status.last_error, None);
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_pinned_mutation_triggers_regardless_of_threshold() {
    let model = Arc::new(ScriptedModel::always_ok("local", "A throne of bone."));
    let h = TestHarness::new(config().with_change_threshold(50), model.clone());
    let room = h.room("Throne Room", "A cold throne room.");

    let p = h
        .director
        .set_fact(room, "throne", "bone", FactSource::User, true)
        .await
        .unwrap();
    assert!(p.trigger.fires());
    assert_eq!(p.committed(), Some("A throne of bone."));
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_cooldown_suppresses_but_forced_event_bypasses() {
    let model = Arc::new(ScriptedModel::always_ok("local", "Rain on the window."));
    let cfg = config()
        .with_change_threshold(1)
        .with_cooldown(Duration::from_secs(3));
    let h = TestHarness::new(cfg, model.clone());
    let room = h.room("Attic", "A low attic.");

    let p = h
        .director
        .set_fact(room, "weather", "rain", FactSource::System, false)
        .await
        .unwrap();
    assert!(p.committed().is_some());

    let p = h
        .director
        .set_fact(room, "window", "cracked", FactSource::User, false)
        .await
        .unwrap();
    assert_eq!(p.trigger, Trigger::NoTrigger);
    assert_pending(&h, room, 1);

    let p = h
        .director
        .propose_change(
            room,
            Mutation::Event {
                summary: "lightning strikes the roof".to_string(),
                force: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(p.trigger, Trigger::Forced);
    assert!(p.committed().is_some());
    assert_pending(&h, room, 0);
    assert_eq!(model.calls(), 2);

    h.advance(Duration::from_secs(4));
    let p = h
        .director
        .set_fact(room, "window", "boarded", FactSource::User, false)
        .await
        .unwrap();
    assert_eq!(p.trigger, Trigger::Trigger);
}

#[tokio::test]
async fn test_staleness_triggers_small_change() {
    let model = Arc::new(ScriptedModel::always_ok("local", "Dust everywhere."));
    let cfg = config()
        .with_change_threshold(10)
        .with_max_staleness(Duration::from_secs(600));
    let h = TestHarness::new(cfg, model.clone());
    let room = h.room("Vault", "A sealed vault.");

    h.advance(Duration::from_secs(601));
    let p = h
        .director
        .set_fact(room, "dust", "thick", FactSource::System, false)
        .await
        .unwrap();
    assert_eq!(p.trigger, Trigger::Trigger);
    assert_description(&h, room, "Dust everywhere.");
}

#[tokio::test]
async fn test_unpin_unpinned_fact_appends_nothing() {
    let h = TestHarness::new(
        config().with_change_threshold(100),
        Arc::new(ScriptedModel::always_ok("local", "Unused.")),
    );
    let room = h.room("Cellar", "Casks line the walls.");

    h.director
        .set_fact(room, "casks", "oak", FactSource::User, false)
        .await
        .unwrap();
    assert_pending(&h, room, 1);

    h.director.unpin(room, "casks").await.unwrap();
    assert_pending(&h, room, 1);
}

// =============================================================================
// Facts
// =============================================================================

#[tokio::test]
async fn test_list_facts_has_single_pinned_entry() {
    let h = TestHarness::new(
        config(),
        Arc::new(ScriptedModel::always_ok("local", "A mirror hangs here.")),
    );
    let room = h.room("Gallery", "Paintings in gilt frames.");

    h.director
        .set_fact(room, "mirror", "silvered", FactSource::User, true)
        .await
        .unwrap();

    let facts = h.director.list_facts(room, true).unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].key, "mirror");
    assert_eq!(facts[0].value, "silvered");
    assert!(facts[0].pinned);
    assert_eq!(h.director.list_facts(room, false).unwrap().len(), 1);
}

#[tokio::test]
async fn test_inferred_write_cannot_overwrite_pinned() {
    let h = TestHarness::new(
        config(),
        Arc::new(ScriptedModel::always_ok("local", "A red door.")),
    );
    let room = h.room("Hallway", "A narrow hallway.");
    h.director
        .set_fact(room, "door", "red", FactSource::User, true)
        .await
        .unwrap();

    let err = h
        .director
        .set_fact(room, "door", "blue", FactSource::Inferred, false)
        .await
        .unwrap_err();
    assert!(matches!(err, DirectorError::PinnedFact { .. }));

    h.director
        .propose_change(
            room,
            Mutation::set_fact("door", "blue", FactSource::Inferred).with_override(),
        )
        .await
        .unwrap();
    let facts = h.director.list_facts(room, true).unwrap();
    assert_eq!(facts[0].value, "blue");
    assert!(facts[0].pinned);
}

// =============================================================================
// Model fallback
// =============================================================================

#[tokio::test]
async fn test_local_success_never_calls_remote() {
    let local = Arc::new(ScriptedModel::always_ok("local", "Local prose."));
    let remote = Arc::new(ScriptedModel::always_ok("remote", "Remote prose."));
    let model = FallbackModel::new(local.clone(), Duration::from_secs(1))
        .with_remote(remote.clone(), Duration::from_secs(1));
    let h = TestHarness::new(config(), Arc::new(model));
    let room = h.room("Kitchen", "Pots and pans.");

    let text = h.director.force_refresh(room).await.unwrap();
    assert_eq!(text, "Local prose.");
    assert_eq!(local.calls(), 1);
    assert_eq!(remote.calls(), 0);
}

#[tokio::test]
async fn test_local_unavailable_without_remote_keeps_description() {
    let local = Arc::new(ScriptedModel::always_err(
        "local",
        ModelError::Unavailable("connection refused".into()),
    ));
    let model = FallbackModel::new(local.clone(), Duration::from_secs(1));
    let h = TestHarness::new(config(), Arc::new(model));
    let room = h.room("Chapel", "Candles gutter on the altar.");

    let p = h
        .director
        .set_fact(room, "candles", "out", FactSource::User, true)
        .await
        .unwrap();
    assert!(matches!(
        p.outcome,
        Outcome::Failed(DirectorError::GenerationUnavailable { .. })
    ));

    assert_description(&h, room, "Candles gutter on the altar.");
    assert_pending(&h, room, 1);
    let status = h.director.status(room).unwrap();
    assert_eq!(status.state, RegenState::Idle);
    assert!(status.last_error.unwrap().contains("connection refused"));
    assert_eq!(local.calls(), 1);
}

#[tokio::test]
async fn test_local_unavailable_falls_back_to_remote() {
    let local = Arc::new(ScriptedModel::always_err(
        "local",
        ModelError::Unavailable("down".into()),
    ));
    let remote = Arc::new(ScriptedModel::always_ok("remote", "Remote prose."));
    let model = FallbackModel::new(local.clone(), Duration::from_secs(1))
        .with_remote(remote.clone(), Duration::from_secs(1));
    let h = TestHarness::new(config(), Arc::new(model));
    let room = h.room("Stable", "Straw and horses.");

    assert_eq!(h.director.force_refresh(room).await.unwrap(), "Remote prose.");
    assert_eq!(local.calls(), 1);
    assert_eq!(remote.calls(), 1);
}

#[tokio::test]
async fn test_timeouts_retry_then_fail() {
    let local = Arc::new(
        ScriptedModel::always_ok("local", "Too slow.").with_delay(Duration::from_millis(500)),
    );
    let model = FallbackModel::new(local.clone(), Duration::from_millis(20))
        .with_retry(RetryPolicy::new(2, Duration::from_millis(1)));
    let h = TestHarness::new(config(), Arc::new(model));
    let room = h.room("Tower", "Wind howls at the top.");

    let err = h.director.force_refresh(room).await.unwrap_err();
    assert!(matches!(err, DirectorError::GenerationUnavailable { .. }));
    assert_eq!(local.calls(), 3);
    assert_description(&h, room, "Wind howls at the top.");
}

#[tokio::test]
async fn test_local_and_remote_unavailable_keeps_entity_intact() {
    let local = Arc::new(ScriptedModel::always_err(
        "local",
        ModelError::Unavailable("connection refused".into()),
    ));
    let remote = Arc::new(ScriptedModel::always_err(
        "remote",
        ModelError::Unavailable("HTTP 503: overloaded".into()),
    ));
    let model = FallbackModel::new(local.clone(), Duration::from_secs(1))
        .with_remote(remote.clone(), Duration::from_secs(1));
    let h = TestHarness::new(config(), Arc::new(model));
    let original = "Salt crusts the walls of the brine cellar.\n  Barrels lean.";
    let room = h.room("Brine Cellar", original);

    let p = h
        .director
        .set_fact(room, "barrels", "split open", FactSource::User, true)
        .await
        .unwrap();
    assert!(p.trigger.fires());
    assert!(matches!(
        p.outcome,
        Outcome::Failed(DirectorError::GenerationUnavailable { .. })
    ));

    let entity = h.director.entity(room).unwrap();
    assert_eq!(entity.description.as_bytes(), original.as_bytes());
    assert!(entity.last_regenerated_at.is_none());
    assert_pending(&h, room, 1);

    let status = h.director.status(room).unwrap();
    assert_eq!(status.state, RegenState::Idle);
    assert!(status.last_error.unwrap().contains("overloaded"));
    assert_eq!(local.calls(), 1);
    assert_eq!(remote.calls(), 1);
}

#[tokio::test]
async fn test_truncated_json_reply_is_not_committed() {
    let model = Arc::new(ScriptedModel::raw(
        "local",
        r#"{"desc": "A mossy cave where water drips from"#,
    ));
    let h = TestHarness::new(config(), model.clone());
    let room = h.room("Cave", "Dry rock.");

    let p = h
        .director
        .set_fact(room, "water", "dripping", FactSource::User, true)
        .await
        .unwrap();
    match p.outcome {
        Outcome::Failed(DirectorError::GenerationUnavailable { reason }) => {
            assert!(reason.contains("invalid model response"));
        }
        other => panic!("expected a failed regeneration, got {other:?}"),
    }

    assert_description(&h, room, "Dry rock.");
    assert_pending(&h, room, 1);
    assert!(h.director.status(room).unwrap().last_error.is_some());
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_malformed_json_reply_is_not_committed() {
    let model = Arc::new(ScriptedModel::raw(
        "local",
        r#"{"desc": "Quiet room", "facts": ["a" "b"]}"#,
    ));
    let h = TestHarness::new(config(), model.clone());
    let room = h.room("Study", "Books everywhere.");

    let err = h.director.force_refresh(room).await.unwrap_err();
    assert!(matches!(err, DirectorError::GenerationUnavailable { .. }));
    assert_description(&h, room, "Books everywhere.");
    assert!(h.director.entity(room).unwrap().anchors.is_empty());
}

#[tokio::test]
async fn test_invalid_local_reply_does_not_fall_back() {
    let local = Arc::new(ScriptedModel::raw("local", "Just some prose, no JSON."));
    let remote = Arc::new(ScriptedModel::always_ok("remote", "Remote prose."));
    let model = FallbackModel::new(local.clone(), Duration::from_secs(1))
        .with_remote(remote.clone(), Duration::from_secs(1));
    let h = TestHarness::new(config(), Arc::new(model));
    let room = h.room("Gallery", "Paintings.");

    assert!(h.director.force_refresh(room).await.is_err());
    assert_description(&h, room, "Paintings.");
    assert_eq!(remote.calls(), 0);
}

// =============================================================================
// Forced refresh and concurrency
// =============================================================================

#[tokio::test]
async fn test_force_refresh_twice_within_cooldown() {
    let model = Arc::new(ScriptedModel::always_ok("local", "Fresh words."));
    let h = TestHarness::new(
        config().with_cooldown(Duration::from_secs(60)),
        model.clone(),
    );
    let room = h.room("Library", "Shelves and ladders.");

    h.director.force_refresh(room).await.unwrap();
    h.director.force_refresh(room).await.unwrap();
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn test_concurrent_trigger_is_rejected_and_late_records_survive() {
    let model = Arc::new(GatedModel::new("Lanterns sway over the dock."));
    let h = TestHarness::new(config(), model.clone());
    let room = h.room("Dock", "Wet planks and rope.");

    let director = h.director.clone();
    let first = tokio::spawn(async move { director.force_refresh(room).await });
    model.entered().await;

    assert_eq!(h.director.status(room).unwrap().state, RegenState::Locked);
    let err = h.director.force_refresh(room).await.unwrap_err();
    assert!(matches!(err, DirectorError::AlreadyInProgress(id) if id == room));

    // Arrives mid-flight: fires but finds the entity locked.
    let p = h
        .director
        .set_fact(room, "lanterns", "lit", FactSource::User, true)
        .await
        .unwrap();
    assert!(p.trigger.fires());
    assert!(matches!(p.outcome, Outcome::AlreadyInProgress));
    h.director
        .set_fact(room, "fog", "rolling in", FactSource::System, false)
        .await
        .unwrap();

    model.release();
    let text = first.await.unwrap().unwrap();
    assert_eq!(text, "Lanterns sway over the dock.");
    assert_eq!(model.calls(), 1);

    assert_description(&h, room, "Lanterns sway over the dock.");
    assert_pending(&h, room, 2);
    let status = h.director.status(room).unwrap();
    assert_eq!(status.state, RegenState::Idle);
    assert!(!h.director.entity(room).unwrap().regeneration_in_progress);
}

#[tokio::test]
async fn test_lock_is_per_entity() {
    let model = Arc::new(GatedModel::new("Held."));
    let h = TestHarness::new(config(), model.clone());
    let a = h.room("North Room", "Cold.");
    let b = h.room("South Room", "Warm.");

    let director = h.director.clone();
    let first = tokio::spawn(async move { director.force_refresh(a).await });
    model.entered().await;

    assert_eq!(h.director.status(b).unwrap().state, RegenState::Idle);

    let director = h.director.clone();
    let second = tokio::spawn(async move { director.force_refresh(b).await });
    model.entered().await;
    assert_eq!(h.director.status(b).unwrap().state, RegenState::Locked);

    model.release();
    model.release();
    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn test_cancelled_regeneration_releases_lock() {
    let model = Arc::new(GatedModel::new("Never committed."));
    let h = TestHarness::new(config(), model.clone());
    let room = h.room("Crypt", "Dust and bones.");

    let director = h.director.clone();
    let task = tokio::spawn(async move { director.force_refresh(room).await });
    model.entered().await;

    assert!(h.director.entity(room).unwrap().regeneration_in_progress);
    assert_eq!(h.director.status(room).unwrap().state, RegenState::Locked);

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    let status = h.director.status(room).unwrap();
    assert_eq!(status.state, RegenState::Idle);
    assert!(!h.director.entity(room).unwrap().regeneration_in_progress);
    assert!(!h.store.load_entity(room).unwrap().regeneration_in_progress);
    assert_description(&h, room, "Dust and bones.");

    // The entity can be regenerated again.
    let director = h.director.clone();
    let retry = tokio::spawn(async move { director.force_refresh(room).await });
    model.entered().await;
    model.release();
    assert_eq!(retry.await.unwrap().unwrap(), "Never committed.");
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn test_room_names_are_unique() {
    let h = TestHarness::new(
        config(),
        Arc::new(ScriptedModel::always_ok("local", "Unused.")),
    );
    let first = h.room("Armory", "Racks of spears.");

    let err = h.director.create_entity("ARMORY", "Empty racks.").unwrap_err();
    assert!(matches!(err, DirectorError::NameTaken { ref name } if name == "ARMORY"));
    assert_eq!(h.director.find_entity("armory"), Some(first));
    assert_eq!(h.director.entities().unwrap().len(), 1);
}
