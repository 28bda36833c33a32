//! System status dashboard command.

use anyhow::Result;
use console::style;

use parley_core::repository::conversation::ConversationRepository;
use parley_core::repository::message::MessageRepository;
use parley_core::repository::user::UserRepository;

use crate::state::AppState;

/// Display version, storage, generator and row counts.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let exchange = state.chat_service.exchange();
    let users = exchange.identity().users().count_users().await?;
    let conversations = exchange.conversations().repo().count_conversations().await?;
    let messages = exchange.history().repo().count_messages().await?;
    let keys = state.api_keys.count_keys().await?;

    let generator = exchange.generator();
    let generator_state = match &state.generator_error {
        Some(reason) => format!("unavailable ({reason})"),
        None => "ready".to_string(),
    };

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "generator": {
                "provider": generator.name(),
                "model": generator.model(),
                "ready": state.generator_error.is_none(),
            },
            "identity_policy": state.config.identity.policy,
            "users": users,
            "conversations": conversations,
            "messages": messages,
            "api_keys": keys,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Parley v{}",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();

    println!("  {}", style("── Generator ──").dim());
    println!(
        "  Provider: {}",
        style(format!("{} / {}", generator.name(), generator.model())).bold()
    );
    if state.generator_error.is_some() {
        println!("  State:    {}", style(&generator_state).yellow());
    } else {
        println!("  State:    {}", style(&generator_state).green());
    }
    println!();

    println!("  {}", style("── Store ──").dim());
    println!("  Users:         {}", style(users).bold());
    println!("  Conversations: {}", style(conversations).bold());
    println!("  Messages:      {}", style(messages).bold());
    println!("  API keys:      {}", style(keys).bold());
    println!();

    println!("  {}", style("── System ──").dim());
    println!("  Data dir: {}", style(state.data_dir.display()).dim());
    println!("  Database: {}", style("SQLite (WAL mode)").dim());
    println!();

    Ok(())
}
