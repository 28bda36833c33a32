//! REST API handler modules.

pub mod conversation;
pub mod message;
