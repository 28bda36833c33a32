//! CLI command definitions for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing. The CLI acts for a local
//! operator: commands name the user they act as with `--email`, which
//! becomes the principal handed to the engine.

pub mod chat;
pub mod conversation;
pub mod keys;
pub mod status;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use parley_types::identity::Principal;

/// Conversation engine: chat with a model, keep every turn.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true, env = "PARLEY_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Who a CLI command acts as.
#[derive(clap::Args, Debug, Clone)]
pub struct Actor {
    /// Email of the user to act as.
    #[arg(long, env = "PARLEY_EMAIL")]
    pub email: String,

    /// Display name used if the user is created.
    #[arg(long)]
    pub name: Option<String>,
}

impl Actor {
    pub fn principal(&self) -> Principal {
        let principal = Principal::new(self.email.clone());
        match &self.name {
            Some(name) => principal.with_display_name(name.clone()),
            None => principal,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server.
    Serve {
        /// Port to listen on (defaults to config).
        #[arg(short, long, env = "PARLEY_PORT")]
        port: Option<u16>,

        /// Host to bind to (defaults to config).
        #[arg(long, env = "PARLEY_HOST")]
        host: Option<String>,
    },

    /// Send a message, or chat interactively when no message is given.
    Chat {
        #[command(flatten)]
        actor: Actor,

        /// Conversation to continue (a new one is started otherwise).
        #[arg(short, long)]
        conversation: Option<String>,

        /// Idempotency key for a one-shot message.
        #[arg(long)]
        request_id: Option<String>,

        /// Message to send.
        message: Option<String>,
    },

    /// List your conversations, newest first.
    #[command(alias = "ls")]
    Conversations {
        #[command(flatten)]
        actor: Actor,

        /// Maximum results.
        #[arg(long, default_value = "50")]
        limit: i64,
    },

    /// Show the messages of a conversation, oldest first.
    Messages {
        /// Conversation id.
        conversation: String,

        #[command(flatten)]
        actor: Actor,
    },

    /// Manage API keys for the REST API.
    Keys {
        #[command(subcommand)]
        action: KeysCommand,
    },

    /// System status dashboard.
    Status,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum KeysCommand {
    /// Issue a new API key for a user. The key is shown once.
    Create {
        /// Email the key authenticates as.
        #[arg(long)]
        email: String,

        /// Label for the key, also used as display name.
        #[arg(long, default_value = "")]
        name: String,
    },
}
