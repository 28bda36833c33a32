//! UserRepository trait definition.

use parley_types::error::RepositoryError;
use parley_types::identity::User;

use super::InsertOutcome;

/// Repository trait for user persistence.
///
/// Implementations must enforce email uniqueness at the store level so that
/// concurrent first contacts converge on one row.
pub trait UserRepository: Send + Sync {
    /// Look up a user by normalized email.
    fn find_by_email(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = Result<Option<User>, RepositoryError>> + Send;

    /// Insert `user` unless a user with the same email already exists.
    ///
    /// Returns the stored row in both cases.
    fn insert_if_absent(
        &self,
        user: &User,
    ) -> impl std::future::Future<Output = Result<InsertOutcome<User>, RepositoryError>> + Send;

    /// Count all users.
    fn count_users(&self) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
