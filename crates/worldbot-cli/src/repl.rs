//! REPL – the worldbot operator console.
//!
//! Plain lines are answered locally by the knowledge engine.  Slash-commands:
//!   /send <text>                    – send a chat request over OSC
//!   /interact <item_id> <item name> – report an item interaction
//!   /history [sender_id]            – print a sender's conversation
//!   /status                         – bridge and knowledge base status
//!   /schema                         – JSON schema of the knowledge file
//!   /help                           – show this list
//!   /quit | /exit                   – gracefully exit

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;

use worldbot_knowledge::KnowledgeFile;
use worldbot_runtime::{LOCAL_SENDER_ID, ServiceHandle};
use worldbot_types::LinkState;

/// Name used for requests typed at the console.
pub const CONSOLE_SENDER_NAME: &str = "Console";

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Empty,
    Say(String),
    Send(String),
    Interact { item_id: String, item_name: String },
    History(i32),
    Status,
    Schema,
    Help,
    Quit,
    Usage(&'static str),
    Unknown(String),
}

/// Parse one input line.
pub fn parse(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    if !line.starts_with('/') {
        return ReplCommand::Say(line.to_string());
    }

    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };
    match cmd {
        "/send" if rest.is_empty() => ReplCommand::Usage("/send <text>"),
        "/send" => ReplCommand::Send(rest.to_string()),
        "/interact" => match rest.split_once(char::is_whitespace) {
            Some((id, name)) if !name.trim().is_empty() => ReplCommand::Interact {
                item_id: id.to_string(),
                item_name: name.trim().to_string(),
            },
            _ => ReplCommand::Usage("/interact <item_id> <item name>"),
        },
        "/history" if rest.is_empty() => ReplCommand::History(LOCAL_SENDER_ID),
        "/history" => match rest.parse::<i32>() {
            Ok(id) => ReplCommand::History(id),
            Err(_) => ReplCommand::Usage("/history [sender_id]"),
        },
        "/status" => ReplCommand::Status,
        "/schema" => ReplCommand::Schema,
        "/help" => ReplCommand::Help,
        "/quit" | "/exit" => ReplCommand::Quit,
        other => ReplCommand::Unknown(other.to_string()),
    }
}

/// Entry point for the interactive REPL.
///
/// Blocks the calling thread; service calls are driven on `rt`.  Returns
/// when the operator quits, input ends, or `shutdown` is set.
pub fn run(service: ServiceHandle, rt: Handle, shutdown: Arc<AtomicBool>) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{}: {}", "Console unavailable".red(), e);
            return;
        }
    };
    let prompt = format!("{} ", "worldbot>".bold().cyan());

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let line = match editor.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };
        if !line.trim().is_empty() {
            let _ = editor.add_history_entry(line.as_str());
        }

        match parse(&line) {
            ReplCommand::Empty => {}
            // The reply is printed by the console display.
            ReplCommand::Say(text) => {
                if let Err(e) = rt.block_on(service.local_chat(text)) {
                    println!("{}: {}", "Error".red(), e);
                }
            }
            ReplCommand::Send(text) => {
                match rt.block_on(service.submit_chat_message(
                    text,
                    LOCAL_SENDER_ID,
                    CONSOLE_SENDER_NAME,
                )) {
                    Ok(()) => println!("  {} chat request sent", "→".dimmed()),
                    Err(e) => println!("{}: {}", "Error".red(), e),
                }
            }
            ReplCommand::Interact { item_id, item_name } => {
                match rt.block_on(service.notify_interaction(
                    item_id,
                    item_name,
                    CONSOLE_SENDER_NAME,
                    LOCAL_SENDER_ID,
                )) {
                    Ok(()) => println!("  {} interaction sent", "→".dimmed()),
                    Err(e) => println!("{}: {}", "Error".red(), e),
                }
            }
            ReplCommand::History(sender_id) => {
                match rt.block_on(service.history_text(sender_id)) {
                    Ok(text) if text.is_empty() => {
                        println!("  {}", "(no conversation yet)".dimmed())
                    }
                    Ok(text) => println!("{}", text),
                    Err(e) => println!("{}: {}", "Error".red(), e),
                }
            }
            ReplCommand::Status => cmd_status(&service),
            ReplCommand::Schema => cmd_schema(),
            ReplCommand::Help => cmd_help(),
            ReplCommand::Quit => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            ReplCommand::Usage(usage) => {
                println!("{} {}", "Usage:".yellow(), usage.bold());
            }
            ReplCommand::Unknown(other) => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "worldbot Commands".bold().underline());
    println!("  {}            – ask the bot locally", "<text>".bold().cyan());
    println!("  {}       – send a chat request over OSC", "/send <text>".bold().cyan());
    println!("  {} – report an item interaction", "/interact <id> <name>".bold().cyan());
    println!("  {}  – show a conversation", "/history [sender]".bold().cyan());
    println!("  {}           – bridge status", "/status".bold().cyan());
    println!("  {}           – knowledge file JSON schema", "/schema".bold().cyan());
    println!("  {}     – exit", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_status(service: &ServiceHandle) {
    let s = service.status();
    let link = match s.link_state {
        LinkState::Degraded | LinkState::Uninitialized => s.link_state.to_string().yellow(),
        _ => s.link_state.to_string().green(),
    };
    println!();
    println!("{}", "Bridge Status".bold().underline());
    println!("  Listening on   : {}", s.listening_on.bold());
    println!("  Sending to     : {}", s.sending_to.bold());
    println!("  Link           : {}", link);
    println!("  Simulated      : {}", if s.simulated { "yes" } else { "no" });
    println!(
        "  Notifications  : {}",
        if s.notifications_enabled { "on".green() } else { "off".dimmed() }
    );
    println!("  Entries        : {}", s.knowledge_entries);
    if s.knowledge_topics.is_empty() {
        println!("  Topics         : {}", "-".dimmed());
    } else {
        println!("  Topics         : {}", s.knowledge_topics.join(", "));
    }
    println!("  Sessions       : {}", s.active_sessions);
    println!();
}

fn cmd_schema() {
    let schema = schemars::schema_for!(KnowledgeFile);
    match serde_json::to_string_pretty(&schema) {
        Ok(json) => println!("{}", json),
        Err(e) => println!("{}: {}", "Error".red(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_local_chat() {
        assert_eq!(parse("  where is the cafe?  "), ReplCommand::Say("where is the cafe?".into()));
        assert_eq!(parse("   "), ReplCommand::Empty);
    }

    #[test]
    fn send_requires_text() {
        assert_eq!(parse("/send hello there"), ReplCommand::Send("hello there".into()));
        assert!(matches!(parse("/send"), ReplCommand::Usage(_)));
        assert!(matches!(parse("/send   "), ReplCommand::Usage(_)));
    }

    #[test]
    fn interact_splits_id_from_name() {
        assert_eq!(
            parse("/interact door_01 Front Door"),
            ReplCommand::Interact {
                item_id: "door_01".into(),
                item_name: "Front Door".into(),
            }
        );
        assert!(matches!(parse("/interact door_01"), ReplCommand::Usage(_)));
        assert!(matches!(parse("/interact"), ReplCommand::Usage(_)));
    }

    #[test]
    fn history_defaults_to_console_sender() {
        assert_eq!(parse("/history"), ReplCommand::History(LOCAL_SENDER_ID));
        assert_eq!(parse("/history 42"), ReplCommand::History(42));
        assert!(matches!(parse("/history bob"), ReplCommand::Usage(_)));
    }

    #[test]
    fn simple_commands_and_unknown() {
        assert_eq!(parse("/status"), ReplCommand::Status);
        assert_eq!(parse("/schema"), ReplCommand::Schema);
        assert_eq!(parse("/help"), ReplCommand::Help);
        assert_eq!(parse("/quit"), ReplCommand::Quit);
        assert_eq!(parse("/exit"), ReplCommand::Quit);
        assert_eq!(parse("/dance now"), ReplCommand::Unknown("/dance".into()));
    }
}
