//! Integration tests that call a real chat-completions endpoint.
//!
//! These tests need a local model server reachable at LOCAL_LLM_BASE_URL
//! (via .env file or environment).
//! Run with: `cargo test -p room-director --test live_model -- --ignored --nocapture`

use room_director::{Director, DirectorConfig, FactSource, MemoryStore};
use std::sync::Arc;

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

fn has_local_model() -> bool {
    std::env::var("LOCAL_LLM_BASE_URL").is_ok()
}

#[tokio::test]
#[ignore]
async fn test_live_regeneration_after_pinned_fact() {
    setup();
    if !has_local_model() {
        eprintln!("Skipping test: LOCAL_LLM_BASE_URL not set");
        return;
    }

    let config = DirectorConfig::from_env().expect("valid config");
    let director = Director::from_config(config, Arc::new(MemoryStore::new()))
        .expect("Failed to build director");

    let hall = director
        .create_entity("Great Hall", "A long hall of grey stone with a cold hearth.")
        .expect("create entity");
    director
        .set_fact(hall, "hearth", "roaring fire", FactSource::User, true)
        .await
        .expect("set fact");

    let entity = director.entity(hall).expect("entity exists");
    println!("Description: {}", entity.description);
    println!("Anchors: {:?}", entity.anchors);
    println!("Status: {:?}", director.status(hall).expect("status"));

    assert!(!entity.description.is_empty());
}
