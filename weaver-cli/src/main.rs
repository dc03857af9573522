//! weaver-cli: terminal client for the Weaver HTTP API
//!
//! # Subcommands
//! - `status`                      show server health
//! - `start [--json]`              start a session and list its characters
//! - `select <session> <name>`     pick a character
//! - `act <session> <choice>`      pick a numbered action
//! - `history <session>`           print the turn history
//! - `play`                        interactive loop on stdin until the story ends

use std::io::{BufRead, Write};

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8770";
const TERMINAL_STATE: &str = "TERMINAL";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "weaver-cli", version, about = "Play Weaver stories from the terminal")]
struct Cli {
    /// Weaver HTTP server URL (overrides WEAVER_HTTP_URL env var)
    #[arg(long, env = "WEAVER_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show Weaver server status
    Status,

    /// Start a new session
    Start {
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Select a character by name
    Select { session: String, name: String },

    /// Choose a numbered action
    Act { session: String, choice: String },

    /// Print the session's turn history
    History { session: String },

    /// Play a whole story interactively
    Play,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CharacterView {
    #[serde(rename = "character_name")]
    pub name: String,
    #[serde(rename = "character_abilities")]
    pub abilities: String,
    #[serde(rename = "character_weaknesses")]
    pub weaknesses: String,
}

#[derive(Debug, Deserialize)]
pub struct StartView {
    pub session_id: String,
    pub remaining_steps: u32,
    pub characters: Vec<CharacterView>,
}

#[derive(Debug, Deserialize)]
pub struct SceneView {
    pub description: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TurnView {
    pub session_id: String,
    pub state: String,
    pub remaining_steps: u32,
    pub character: Option<String>,
    pub scene: SceneView,
}

impl TurnView {
    pub fn is_over(&self) -> bool {
        self.state == TERMINAL_STATE
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryView {
    pub entries: Vec<HistoryEntry>,
}

/// Outcome of one API call that reached the server.
#[derive(Debug)]
pub enum Reply {
    Ok(Value),
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },
}

impl Reply {
    fn from_parts(status: u16, body: Value) -> Self {
        if (200..300).contains(&status) {
            return Reply::Ok(body);
        }
        Reply::Rejected {
            status,
            code: body["code"].as_str().map(str::to_string),
            message: body["error"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string(),
        }
    }

    fn into_result(self) -> anyhow::Result<Value> {
        match self {
            Reply::Ok(v) => Ok(v),
            Reply::Rejected {
                status, message, ..
            } => Err(anyhow::anyhow!("server returned {}: {}", status, message)),
        }
    }
}

// ============================================================================
// Rendering
// ============================================================================

pub fn render_characters(characters: &[CharacterView]) -> String {
    characters
        .iter()
        .map(|c| {
            format!(
                "- {}\n    abilities:  {}\n    weaknesses: {}",
                c.name, c.abilities, c.weaknesses
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_turn(turn: &TurnView) -> String {
    let mut out = String::new();
    out.push_str(&turn.scene.description);
    out.push('\n');
    if turn.is_over() {
        return out;
    }
    out.push('\n');
    for (i, action) in turn.scene.actions.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, action));
    }
    out.push_str(&format!("\n[{} steps left]", turn.remaining_steps));
    out
}

pub fn render_history(history: &HistoryView) -> String {
    history
        .entries
        .iter()
        .map(|e| format!("{:>9}: {}", e.role, e.content))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// HTTP Client
// ============================================================================

struct Api {
    server: String,
    client: reqwest::blocking::Client,
}

impl Api {
    fn new(server: &str) -> anyhow::Result<Self> {
        // Completion calls can take a while; the server applies its own retries.
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()?;
        Ok(Self {
            server: server.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn get(&self, path: &str) -> anyhow::Result<Reply> {
        let url = format!("{}{}", self.server, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| anyhow::anyhow!("cannot reach {}: {}", url, e))?;
        let status = resp.status().as_u16();
        Ok(Reply::from_parts(status, resp.json().unwrap_or_default()))
    }

    fn post(&self, path: &str, body: Value) -> anyhow::Result<Reply> {
        let url = format!("{}{}", self.server, path);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| anyhow::anyhow!("cannot reach {}: {}", url, e))?;
        let status = resp.status().as_u16();
        Ok(Reply::from_parts(status, resp.json().unwrap_or_default()))
    }

    fn start(&self) -> anyhow::Result<Reply> {
        self.post("/sessions", json!({}))
    }

    fn select(&self, session: &str, name: &str) -> anyhow::Result<Reply> {
        self.post(
            &format!("/sessions/{}/character", session),
            json!({ "name": name }),
        )
    }

    fn act(&self, session: &str, choice: &str) -> anyhow::Result<Reply> {
        self.post(
            &format!("/sessions/{}/action", session),
            json!({ "choice": choice }),
        )
    }
}

// ============================================================================
// Commands
// ============================================================================

fn do_status(api: &Api) -> anyhow::Result<()> {
    let body = api.get("/health")?.into_result()?;
    println!("Weaver server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:       {}", body["version"].as_str().unwrap_or("?"));
    println!("Sessions:      {}", body["sessions"]);
    println!("Fragments:     {}", body["backends"]["fragments"].as_str().unwrap_or("?"));
    println!("Completion:    {}", body["backends"]["completion"].as_str().unwrap_or("?"));
    if let Some(pg) = body["postgresql"].as_str() {
        println!("PostgreSQL:    {}", pg);
    }
    Ok(())
}

fn do_start(api: &Api, json_output: bool) -> anyhow::Result<()> {
    let body = api.start()?.into_result()?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }
    let start: StartView = serde_json::from_value(body)?;
    println!("Session {} ({} steps)", start.session_id, start.remaining_steps);
    println!("{}", render_characters(&start.characters));
    Ok(())
}

fn do_turn(reply: Reply) -> anyhow::Result<()> {
    let turn: TurnView = serde_json::from_value(reply.into_result()?)?;
    println!("{}", render_turn(&turn));
    Ok(())
}

fn do_history(api: &Api, session: &str) -> anyhow::Result<()> {
    let body = api
        .get(&format!("/sessions/{}/history", session))?
        .into_result()?;
    let history: HistoryView = serde_json::from_value(body)?;
    println!("{}", render_history(&history));
    Ok(())
}

fn prompt(input: &mut impl BufRead, label: &str) -> anyhow::Result<Option<String>> {
    print!("{}", label);
    std::io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Re-prompt on recoverable rejections; give up on anything else.
fn retryable(code: Option<&str>) -> bool {
    matches!(
        code,
        Some("character_not_found") | Some("invalid_action_index") | Some("malformed_response")
    )
}

fn do_play(api: &Api) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();

    println!("Reading the story...");
    let start: StartView = serde_json::from_value(api.start()?.into_result()?)?;
    println!("Choose your character:\n{}\n", render_characters(&start.characters));

    let mut turn = loop {
        let Some(name) = prompt(&mut input, "Character: ")? else {
            return Ok(());
        };
        match api.select(&start.session_id, &name)? {
            Reply::Ok(body) => break serde_json::from_value::<TurnView>(body)?,
            Reply::Rejected { code, message, .. } if retryable(code.as_deref()) => {
                println!("{}", message);
            }
            rejected => return rejected.into_result().map(|_| ()),
        }
    };
    if let Some(name) = &turn.character {
        println!("\nYou are {}.", name);
    }
    println!("\n{}", render_turn(&turn));

    while !turn.is_over() {
        let label = format!("Your choice (1-{}): ", turn.scene.actions.len());
        let Some(choice) = prompt(&mut input, &label)? else {
            return Ok(());
        };
        match api.act(&turn.session_id, &choice)? {
            Reply::Ok(body) => {
                turn = serde_json::from_value(body)?;
                println!("\n{}", render_turn(&turn));
            }
            Reply::Rejected { code, message, .. } if retryable(code.as_deref()) => {
                println!("{}", message);
            }
            rejected => return rejected.into_result().map(|_| ()),
        }
    }

    println!("THE END");
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();

    let result = Api::new(&cli.server).and_then(|api| match cli.command {
        Commands::Status => do_status(&api),
        Commands::Start { json } => do_start(&api, json),
        Commands::Select { session, name } => api.select(&session, &name).and_then(do_turn),
        Commands::Act { session, choice } => api.act(&session, &choice).and_then(do_turn),
        Commands::History { session } => do_history(&api, &session),
        Commands::Play => do_play(&api),
    });

    if let Err(e) = result {
        eprintln!("weaver-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(state: &str, actions: &[&str], remaining: u32) -> TurnView {
        TurnView {
            session_id: "s".to_string(),
            state: state.to_string(),
            remaining_steps: remaining,
            character: Some("Alice".to_string()),
            scene: SceneView {
                description: "Fog over the river.".to_string(),
                actions: actions.iter().map(|a| a.to_string()).collect(),
            },
        }
    }

    #[test]
    fn test_render_turn_numbers_actions_from_one() {
        let out = render_turn(&turn("AWAITING_ACTION", &["cross", "wait"], 9));
        assert!(out.starts_with("Fog over the river."));
        assert!(out.contains("  1. cross\n"));
        assert!(out.contains("  2. wait\n"));
        assert!(out.ends_with("[9 steps left]"));
    }

    #[test]
    fn test_render_terminal_turn_has_no_menu() {
        let t = turn(TERMINAL_STATE, &[], 0);
        assert!(t.is_over());
        assert_eq!(render_turn(&t), "Fog over the river.\n");
    }

    #[test]
    fn test_render_characters() {
        let characters = vec![CharacterView {
            name: "Alice".to_string(),
            abilities: "stealth".to_string(),
            weaknesses: "pride".to_string(),
        }];
        let out = render_characters(&characters);
        assert!(out.starts_with("- Alice"));
        assert!(out.contains("abilities:  stealth"));
        assert!(out.contains("weaknesses: pride"));
    }

    #[test]
    fn test_turn_view_parses_server_body() {
        let body = json!({
            "session_id": "0b8f",
            "state": "TERMINAL",
            "remaining_steps": 0,
            "character": "Bob",
            "scene": {"description": "Home at last."}
        });
        let t: TurnView = serde_json::from_value(body).unwrap();
        assert!(t.is_over());
        assert!(t.scene.actions.is_empty());
    }

    #[test]
    fn test_reply_from_parts() {
        assert!(matches!(Reply::from_parts(201, json!({})), Reply::Ok(_)));

        let rejected = Reply::from_parts(
            422,
            json!({"error": "choose 1-3", "code": "invalid_action_index"}),
        );
        match rejected {
            Reply::Rejected {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 422);
                assert_eq!(code.as_deref(), Some("invalid_action_index"));
                assert_eq!(message, "choose 1-3");
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        let bare = Reply::from_parts(500, Value::Null);
        assert!(bare.into_result().is_err());
    }

    #[test]
    fn test_retryable_codes() {
        assert!(retryable(Some("invalid_action_index")));
        assert!(retryable(Some("character_not_found")));
        assert!(!retryable(Some("completion_unavailable")));
        assert!(!retryable(None));
    }

    #[test]
    fn test_render_history() {
        let history = HistoryView {
            entries: vec![
                HistoryEntry {
                    role: "human".to_string(),
                    content: "Alice".to_string(),
                },
                HistoryEntry {
                    role: "assistant".to_string(),
                    content: "{}".to_string(),
                },
            ],
        };
        assert_eq!(render_history(&history), "    human: Alice\nassistant: {}");
    }
}
