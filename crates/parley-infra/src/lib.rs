//! Infrastructure implementations for Parley.
//!
//! Concrete adapters for the ports defined in `parley-core`: the SQLite
//! store, an in-memory store, generator backends, and configuration loading.

pub mod config;
pub mod llm;
pub mod memory;
pub mod sqlite;

#[cfg(test)]
mod conformance;
