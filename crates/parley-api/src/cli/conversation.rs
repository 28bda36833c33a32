//! Conversation browsing commands: list conversations, show messages.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use parley_types::chat::{ChatMessage, ConversationId, MessageRole, MessageStatus};

use super::Actor;
use crate::state::AppState;

/// Characters of message content shown per table row.
const PREVIEW_CHARS: usize = 60;

fn preview(content: &str) -> String {
    let flat = content.replace('\n', " ");
    if flat.chars().count() > PREVIEW_CHARS {
        let cut: String = flat.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

/// List the actor's conversations, newest first.
///
/// # Examples
///
/// ```bash
/// parley conversations --email me@example.com
/// parley conversations --email me@example.com --json
/// ```
pub async fn list_conversations(
    state: &AppState,
    actor: &Actor,
    limit: i64,
    json: bool,
) -> Result<()> {
    let principal = actor.principal();
    let conversations = state
        .chat_service
        .list_conversations(&principal, Some(limit.max(1)), None)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&conversations)?);
        return Ok(());
    }

    if conversations.is_empty() {
        println!();
        println!(
            "  {} No conversations yet. Start one with: {}",
            style("i").blue().bold(),
            style(format!("parley chat --email {}", actor.email)).yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Title").fg(Color::White),
        Cell::new("Created").fg(Color::White),
    ]);

    for conversation in &conversations {
        table.add_row(vec![
            Cell::new(conversation.id.as_str()).fg(Color::DarkGrey),
            Cell::new(&conversation.title).fg(Color::Cyan),
            Cell::new(conversation.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} conversation{}",
        style(conversations.len()).bold(),
        if conversations.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}

fn status_cell(message: &ChatMessage) -> Cell {
    match message.status {
        MessageStatus::Completed => Cell::new("completed").fg(Color::Green),
        MessageStatus::Pending => Cell::new("pending").fg(Color::Yellow),
        MessageStatus::Failed => Cell::new("failed").fg(Color::Red),
    }
}

/// Show one conversation's messages, oldest first.
pub async fn list_messages(
    state: &AppState,
    actor: &Actor,
    conversation: &str,
    json: bool,
) -> Result<()> {
    let id: ConversationId = conversation
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid conversation id: {e}"))?;
    let principal = actor.principal();

    let conversation = state.chat_service.get_conversation(&principal, &id).await?;
    let messages = state
        .chat_service
        .list_messages(&principal, &id, None, None)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("Role").fg(Color::White),
        Cell::new("Content").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Time").fg(Color::White),
    ]);

    for message in &messages {
        let role = match message.role {
            MessageRole::User => Cell::new("user").fg(Color::Green),
            MessageRole::Assistant => Cell::new("assistant").fg(Color::Cyan),
        };
        table.add_row(vec![
            Cell::new(message.seq.to_string()).fg(Color::DarkGrey),
            role,
            Cell::new(preview(&message.content)),
            status_cell(message),
            Cell::new(message.created_at.format("%H:%M:%S").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("  {}", style(&conversation.title).cyan().bold());
    println!();
    println!("{table}");
    println!();

    Ok(())
}
