//! Room Director shell.
//!
//! A line-oriented interface for building rooms, editing their facts and
//! watching descriptions regenerate.
//!
//! ```bash
//! cargo run -p director-cli -- --world world.json
//! ```

mod headless;

use room_director::{DirectorConfig, FallbackModel, MemoryStore};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use headless::{run_headless, Shell};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let config = match DirectorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let model = FallbackModel::from_config(&config)?;
    info!(
        local = %config.local_model,
        remote = model.has_remote(),
        "model client ready"
    );

    let store = match world_path(&args) {
        Some(path) => {
            let store = MemoryStore::load_json(path).await?;
            info!(path, rooms = store.len(), "world loaded");
            store
        }
        None => MemoryStore::new(),
    };

    let shell = Shell::new(config, Arc::new(model), store);
    run_headless(shell).await?;
    Ok(())
}

/// Value of `--world <path>`, if given.
fn world_path(args: &[String]) -> Option<&str> {
    args.iter()
        .position(|a| a == "--world")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn print_help() {
    println!("Room Director - fact-driven room descriptions");
    println!();
    println!("USAGE:");
    println!("  director [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help        Show this help message");
    println!("  --world <PATH>    Load a saved world on startup");
    println!();
    println!("ENVIRONMENT:");
    println!("  LOCAL_LLM_BASE_URL   Local endpoint (default: http://127.0.0.1:1234/v1)");
    println!("  LOCAL_LLM_MODEL      Local model (default: gpt-oss-120b)");
    println!("  OPENAI_API_KEY       Enables the remote fallback");
    println!("  OPENAI_BASE_URL      Remote endpoint (default: https://api.openai.com/v1)");
    println!("  OPENAI_MODEL         Remote model (default: gpt-5-mini)");
    println!("  RUST_LOG             Log filter (default: info)");
    println!();
    println!("EXAMPLES:");
    println!("  director");
    println!("  director --world saves/keep.json");
}
