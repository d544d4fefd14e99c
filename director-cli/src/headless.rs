//! Headless shell for the room director.
//!
//! A simple line-oriented protocol suitable for scripting and AI agents:
//! - Lines starting with `#` are session commands (save, load, quit, status, help)
//! - Every other line is a world command acting on the current room

use room_director::{
    Director, DirectorConfig, EntityId, FactSource, MemoryStore, ModelBackend, Mutation, Outcome,
    Proposal,
};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

const HELP: &str = "\
[HELP]
  dig <name> [= <description>]  - Create a room and enter it
  go <name>                     - Enter an existing room
  rooms                         - List rooms
  look                          - Show the current description
  facts                         - List facts of the current room
  set <key> = <value>           - Set a fact (player edit)
  world <key> = <value>         - Set a fact (world logic)
  pin <key> [= <value>]         - Pin a fact, setting it first if a value is given
  unpin <key>                   - Unpin a fact
  unset <key>                   - Remove an unpinned fact
  unset! <key>                  - Remove a fact even if pinned
  event <summary>               - Record a world event
  refresh                       - Regenerate the description now
  #status                       - Show director status for the current room
  #save <path>                  - Save the world
  #load <path>                  - Load a saved world
  #quit                         - Exit
  #help                         - Show this help";

/// One parsed line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Dig { name: String, description: String },
    Go(String),
    Rooms,
    Look,
    Facts,
    Change(Mutation),
    Refresh,
    Status,
    Save(String),
    Load(String),
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        if let Some(meta) = line.strip_prefix('#') {
            let (head, rest) = split_head(meta);
            return match head {
                "quit" | "exit" => Ok(Command::Quit),
                "status" => Ok(Command::Status),
                "help" => Ok(Command::Help),
                "save" => required(rest, "#save <path>").map(Command::Save),
                "load" => required(rest, "#load <path>").map(Command::Load),
                _ => Err("Unknown command. Type #help for help.".to_string()),
            };
        }

        let (head, rest) = split_head(line);
        match head {
            "dig" => {
                let (name, description) = match rest.split_once('=') {
                    Some((name, desc)) => (name.trim(), desc.trim()),
                    None => (rest, ""),
                };
                let name = required(name, "dig <name> [= <description>]")?;
                Ok(Command::Dig {
                    name,
                    description: description.to_string(),
                })
            }
            "go" => required(rest, "go <name>").map(Command::Go),
            "rooms" => Ok(Command::Rooms),
            "look" => Ok(Command::Look),
            "facts" => Ok(Command::Facts),
            "refresh" => Ok(Command::Refresh),
            "set" => {
                let (key, value) = assignment(rest, "set <key> = <value>")?;
                Ok(Command::Change(Mutation::set_fact(key, value, FactSource::User)))
            }
            "world" => {
                let (key, value) = assignment(rest, "world <key> = <value>")?;
                Ok(Command::Change(Mutation::set_fact(key, value, FactSource::System)))
            }
            "pin" => match rest.split_once('=') {
                Some(_) => {
                    let (key, value) = assignment(rest, "pin <key> [= <value>]")?;
                    Ok(Command::Change(Mutation::set_pinned_fact(
                        key,
                        value,
                        FactSource::User,
                    )))
                }
                None => required(rest, "pin <key> [= <value>]")
                    .map(|key| Command::Change(Mutation::pin(key))),
            },
            "unpin" => required(rest, "unpin <key>").map(|key| Command::Change(Mutation::unpin(key))),
            "unset" => required(rest, "unset <key>")
                .map(|key| Command::Change(Mutation::remove_fact(key))),
            "unset!" => required(rest, "unset! <key>")
                .map(|key| Command::Change(Mutation::remove_fact(key).with_override())),
            "event" => required(rest, "event <summary>")
                .map(|summary| Command::Change(Mutation::event(summary))),
            _ => Err("Unknown command. Type #help for help.".to_string()),
        }
    }
}

fn split_head(line: &str) -> (&str, &str) {
    match line.trim().split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line.trim(), ""),
    }
}

fn required(value: &str, usage: &str) -> Result<String, String> {
    if value.is_empty() {
        Err(format!("Usage: {usage}"))
    } else {
        Ok(value.to_string())
    }
}

fn assignment(rest: &str, usage: &str) -> Result<(String, String), String> {
    match rest.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("Usage: {usage}")),
    }
}

/// Result of executing one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Output(String),
    Quit,
}

/// Shell state: the world, its director and the room being edited.
pub struct Shell {
    config: DirectorConfig,
    model: Arc<dyn ModelBackend>,
    store: Arc<MemoryStore>,
    director: Director,
    current: Option<EntityId>,
}

impl Shell {
    pub fn new(config: DirectorConfig, model: Arc<dyn ModelBackend>, store: MemoryStore) -> Self {
        let store = Arc::new(store);
        let director = Director::new(config.clone(), store.clone(), model.clone());
        Self {
            config,
            model,
            store,
            director,
            current: None,
        }
    }

    /// Parse and run one line.
    pub async fn execute(&mut self, line: &str) -> Step {
        match Command::parse(line) {
            Ok(Command::Quit) => Step::Quit,
            Ok(command) => Step::Output(self.run(command).await),
            Err(message) => Step::Output(format!("[ERROR] {message}")),
        }
    }

    async fn run(&mut self, command: Command) -> String {
        match command {
            Command::Help => HELP.to_string(),
            Command::Quit => String::new(),
            Command::Dig { name, description } => {
                match self.director.create_entity(&name, description) {
                    Ok(id) => {
                        self.current = Some(id);
                        format!("[DUG] {name}")
                    }
                    Err(e) => format!("[ERROR] {e}"),
                }
            }
            Command::Go(name) => match self.director.find_entity(&name) {
                Some(id) => {
                    self.current = Some(id);
                    self.look(id)
                }
                None => format!("[ERROR] No room named '{name}'"),
            },
            Command::Rooms => {
                let rooms = match self.director.entities() {
                    Ok(rooms) => rooms,
                    Err(e) => return format!("[ERROR] {e}"),
                };
                if rooms.is_empty() {
                    return "[ROOMS] none".to_string();
                }
                let mut out = String::from("[ROOMS]");
                for room in rooms {
                    let marker = if Some(room.id) == self.current { "*" } else { " " };
                    out.push_str(&format!("\n {marker} {}", room.name));
                }
                out
            }
            Command::Look => self.with_room(|shell, id| shell.look(id)),
            Command::Facts => self.with_room(|shell, id| shell.facts(id)),
            Command::Status => self.with_room(|shell, id| shell.status(id)),
            Command::Change(mutation) => {
                let Some(id) = self.current else {
                    return no_room();
                };
                match self.director.propose_change(id, mutation).await {
                    Ok(proposal) => render_proposal(&proposal),
                    Err(e) => format!("[ERROR] {e}"),
                }
            }
            Command::Refresh => {
                let Some(id) = self.current else {
                    return no_room();
                };
                match self.director.force_refresh(id).await {
                    Ok(text) => format!("[REGENERATED]\n{text}"),
                    Err(e) if e.is_benign() => format!("[OK] {e}"),
                    Err(e) => format!("[ERROR] {e}"),
                }
            }
            Command::Save(path) => match self.store.save_json(&path).await {
                Ok(()) => format!("[SAVED] World saved to {path}"),
                Err(e) => format!("[ERROR] Save failed: {e}"),
            },
            Command::Load(path) => match MemoryStore::load_json(&path).await {
                Ok(store) => {
                    self.replace_store(store);
                    format!("[LOADED] {} rooms from {path}", self.store.len())
                }
                Err(e) => format!("[ERROR] Load failed: {e}"),
            },
        }
    }

    fn replace_store(&mut self, store: MemoryStore) {
        self.store = Arc::new(store);
        self.director = Director::new(self.config.clone(), self.store.clone(), self.model.clone());
        self.current = None;
    }

    fn with_room(&self, f: impl FnOnce(&Self, EntityId) -> String) -> String {
        match self.current {
            Some(id) => f(self, id),
            None => no_room(),
        }
    }

    fn look(&self, id: EntityId) -> String {
        match self.director.entity(id) {
            Ok(entity) => {
                let mut out = format!("[{}]\n{}", entity.name, entity.description);
                if !entity.anchors.is_empty() {
                    out.push_str(&format!("\n  ({})", entity.anchors.join("; ")));
                }
                out
            }
            Err(e) => format!("[ERROR] {e}"),
        }
    }

    fn facts(&self, id: EntityId) -> String {
        match self.director.list_facts(id, true) {
            Ok(facts) if facts.is_empty() => "[FACTS] none".to_string(),
            Ok(facts) => {
                let mut out = String::from("[FACTS]");
                for fact in facts {
                    let pin = if fact.pinned { " (pinned)" } else { "" };
                    out.push_str(&format!(
                        "\n  {}{pin} [{}]",
                        fact.render(),
                        fact.source.name()
                    ));
                }
                out
            }
            Err(e) => format!("[ERROR] {e}"),
        }
    }

    fn status(&self, id: EntityId) -> String {
        match self.director.status(id) {
            Ok(status) => {
                let mut out = String::from("[STATUS]");
                out.push_str(&format!("\n  State: {:?}", status.state));
                out.push_str(&format!("\n  Pending changes: {}", status.pending_changes));
                match status.last_regenerated_at {
                    Some(at) => out.push_str(&format!("\n  Last regenerated: {}", at.to_rfc3339())),
                    None => out.push_str("\n  Last regenerated: never"),
                }
                if let Some(err) = status.last_error {
                    out.push_str(&format!("\n  Last error: {err}"));
                }
                out
            }
            Err(e) => format!("[ERROR] {e}"),
        }
    }
}

fn no_room() -> String {
    "[ERROR] No current room. Use 'dig' or 'go' first.".to_string()
}

fn render_proposal(proposal: &Proposal) -> String {
    match &proposal.outcome {
        Outcome::NotTriggered => "[OK]".to_string(),
        Outcome::Committed(text) => format!("[REGENERATED]\n{text}"),
        Outcome::AlreadyInProgress => "[OK] regeneration already in progress".to_string(),
        Outcome::Failed(e) => format!("[OK] description unchanged: {e}"),
    }
}

/// Run the shell over stdin/stdout until EOF or `#quit`.
pub async fn run_headless(mut shell: Shell) -> io::Result<()> {
    println!("=== Room Director Headless Mode ===");
    println!("Rooms: {}", shell.store.len());
    println!("Type #help for commands.");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;

        if line.trim().is_empty() {
            continue;
        }

        match shell.execute(&line).await {
            Step::Quit => {
                println!("Goodbye!");
                break;
            }
            Step::Output(out) => println!("{out}"),
        }
        stdout.flush().ok();
    }

    Ok(())
}
