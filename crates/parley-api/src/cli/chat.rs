//! `parley chat`: one-shot sends and the interactive line loop.
//!
//! A failed generation is shown as a failure, never as a reply. The loop
//! does not resend anything on its own; the user decides whether to retry.

use std::io::Write;

use anyhow::Context;
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};

use parley_core::chat::exchange::{ExchangeError, ExchangeOutcome, SubmitMessage};
use parley_types::chat::ConversationId;
use parley_types::identity::Principal;

use super::Actor;
use crate::http::handlers::message::SubmitMessageResponse;
use crate::state::AppState;

/// Slash commands understood by the interactive loop.
#[derive(Debug, PartialEq, Eq)]
pub enum ChatCommand {
    /// Start a fresh conversation with the next message.
    New,
    /// Print the current conversation id.
    Id,
    Help,
    Exit,
    Unknown(String),
}

impl ChatCommand {
    /// `None` when the line is an ordinary message.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        let name = trimmed.strip_prefix('/')?;
        Some(match name.split_whitespace().next().unwrap_or("") {
            "new" => ChatCommand::New,
            "id" => ChatCommand::Id,
            "help" | "?" => ChatCommand::Help,
            "exit" | "quit" | "q" => ChatCommand::Exit,
            other => ChatCommand::Unknown(other.to_string()),
        })
    }
}

fn parse_handle(raw: Option<String>) -> anyhow::Result<Option<ConversationId>> {
    raw.map(|id| {
        id.parse::<ConversationId>()
            .map_err(|e| anyhow::anyhow!("invalid conversation id: {e}"))
    })
    .transpose()
}

/// Send one message and print the reply.
pub async fn send_once(
    state: &AppState,
    actor: &Actor,
    conversation: Option<String>,
    request_id: Option<String>,
    message: String,
    json: bool,
) -> anyhow::Result<()> {
    let principal = actor.principal();
    let mut request = SubmitMessage::new(message);
    request.conversation_id = parse_handle(conversation)?;
    request.request_id = request_id;

    match state.chat_service.submit_message(&principal, request).await {
        Ok(outcome) => {
            if json {
                let response = SubmitMessageResponse::from(outcome);
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_reply(&outcome);
                println!(
                    "  {} {}",
                    style("conversation:").dim(),
                    style(&outcome.conversation.id).dim()
                );
                println!();
            }
            Ok(())
        }
        Err(err) => {
            print_failure(&err);
            Err(err).context("message exchange failed")
        }
    }
}

/// Interactive loop over stdin lines.
pub async fn run_chat_loop(
    state: &AppState,
    actor: &Actor,
    conversation: Option<String>,
) -> anyhow::Result<()> {
    let principal = actor.principal();
    let mut current = parse_handle(conversation)?;
    if let Some(id) = &current {
        // Fail early on a conversation the user cannot continue.
        state.chat_service.get_conversation(&principal, id).await?;
    }

    print_banner(state, &principal, current.as_ref());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", style("you ›").green().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        if let Some(command) = ChatCommand::parse(&line) {
            match command {
                ChatCommand::New => {
                    current = None;
                    println!("  {}", style("Next message starts a new conversation.").dim());
                }
                ChatCommand::Id => match &current {
                    Some(id) => println!("  {id}"),
                    None => println!("  {}", style("(no conversation yet)").dim()),
                },
                ChatCommand::Help => print_help(),
                ChatCommand::Exit => break,
                ChatCommand::Unknown(name) => {
                    println!(
                        "  {} Unknown command '/{name}'. Type /help.",
                        style("!").yellow().bold()
                    );
                }
            }
            continue;
        }

        let mut request = SubmitMessage::new(line);
        request.conversation_id = current.clone();

        match state.chat_service.submit_message(&principal, request).await {
            Ok(outcome) => {
                if outcome.conversation_created {
                    println!(
                        "  {} {}",
                        style("started conversation").dim(),
                        style(&outcome.conversation.id).dim()
                    );
                }
                current = Some(outcome.conversation.id.clone());
                print_reply(&outcome);
            }
            Err(err) => {
                if let Some(id) = &err.conversation_id {
                    current = Some(id.clone());
                }
                print_failure(&err);
            }
        }
    }

    Ok(())
}

fn print_banner(state: &AppState, principal: &Principal, conversation: Option<&ConversationId>) {
    let generator = state.chat_service.exchange().generator();
    println!();
    println!(
        "  {} {}",
        style("parley").cyan().bold(),
        style(format!("as {}", principal.email)).dim()
    );
    println!(
        "  {}  {}",
        style("Model:").bold(),
        style(format!("{} / {}", generator.name(), generator.model())).dim()
    );
    if let Some(id) = conversation {
        println!("  {}  {}", style("Conversation:").bold(), style(id).dim());
    }
    println!();
    println!(
        "  {}",
        style("Type /help for commands, Ctrl+D to exit").dim()
    );
    println!("  {}", style("---").dim());
    println!();
}

fn print_help() {
    println!();
    println!("  {}  start a new conversation", style("/new ").cyan());
    println!("  {}  show the current conversation id", style("/id  ").cyan());
    println!("  {}  leave", style("/exit").cyan());
    println!();
}

fn print_reply(outcome: &ExchangeOutcome) {
    println!();
    println!(
        "  {} {}",
        style("parley ›").cyan().bold(),
        outcome.assistant_message.content
    );
    if outcome.replayed {
        println!("  {}", style("(stored reply from an earlier attempt)").dim());
    }
    println!();
}

fn print_failure(err: &ExchangeError) {
    println!();
    println!(
        "  {} {}",
        style("✗ no reply:").red().bold(),
        style(&err.error).red()
    );
    if err.user_message_persisted() {
        println!(
            "  {}",
            style("Your message was saved. Send it again to retry.").dim()
        );
    }
    println!();
}
