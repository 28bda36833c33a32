//! Repository trait definitions.
//!
//! These are the store capability the engine consumes. Each trait is
//! implemented in parley-infra (SQLite and in-memory). They use native async
//! fn in traits (RPITIT, Rust 2024 edition).
//!
//! The store, not the engine, owns the atomicity guarantees: unique emails,
//! create-if-absent conversations, and linearized per-conversation appends.

pub mod conversation;
pub mod message;
pub mod user;

/// Result of an insert-if-absent operation.
///
/// `record` is always the row that ended up stored: ours when `inserted`
/// is true, the pre-existing winner otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOutcome<T> {
    pub record: T,
    pub inserted: bool,
}

impl<T> InsertOutcome<T> {
    pub fn inserted(record: T) -> Self {
        Self {
            record,
            inserted: true,
        }
    }

    pub fn existing(record: T) -> Self {
        Self {
            record,
            inserted: false,
        }
    }
}
