//! Business logic and repository trait definitions for Parley.
//!
//! This crate defines the "ports" (repository traits, the `Generator` and
//! `AuthContext` capabilities) that the infrastructure layer implements, and
//! the conversation engine built on top of them. It depends only on
//! `parley-types` -- never on `parley-infra` or any database/IO crate.

pub mod auth;
pub mod chat;
pub mod context;
pub mod identity;
pub mod llm;
pub mod repository;

#[cfg(test)]
pub(crate) mod test_support;
