//! API key commands.

use anyhow::Result;
use console::style;

use crate::state::AppState;

/// Issue a key and print it once.
pub async fn create_key(state: &AppState, email: &str, name: &str, json: bool) -> Result<()> {
    let issued = state.api_keys.create_key(email, name).await?;
    tracing::info!(key_id = %issued.id, email = %issued.email, "api key issued");

    if json {
        let out = serde_json::json!({
            "id": issued.id,
            "email": issued.email,
            "name": issued.name,
            "key": issued.plaintext,
            "created_at": issued.created_at,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} API key for {} (save this, it won't be shown again):",
        style("🔑").bold(),
        style(&issued.email).cyan()
    );
    println!();
    println!("  {}", style(&issued.plaintext).yellow().bold());
    println!();
    println!(
        "  {}",
        style("Use it as 'Authorization: Bearer <key>' or 'X-API-Key: <key>'.").dim()
    );
    println!();

    Ok(())
}
