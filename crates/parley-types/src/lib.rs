//! Shared domain types for Parley.
//!
//! This crate contains the core domain types used across the Parley chat
//! engine: users and principals, conversations, ledger messages, prompt turns,
//! configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod identity;
pub mod llm;
