//! Identity Resolver: authenticated principal to durable user.

use chrono::Utc;
use parley_types::config::IdentityPolicy;
use parley_types::error::ChatError;
use parley_types::identity::{Principal, User, UserId};
use tracing::{debug, info};

use crate::repository::user::UserRepository;

/// Maps principals to users, provisioning on first contact when the policy
/// allows it.
pub struct IdentityResolver<U: UserRepository> {
    users: U,
    policy: IdentityPolicy,
}

impl<U: UserRepository> IdentityResolver<U> {
    pub fn new(users: U, policy: IdentityPolicy) -> Self {
        Self { users, policy }
    }

    pub fn policy(&self) -> IdentityPolicy {
        self.policy
    }

    pub fn users(&self) -> &U {
        &self.users
    }

    /// Resolve a principal to its user.
    ///
    /// Concurrent first contacts with the same email converge on one user:
    /// creation goes through the store's insert-if-absent, and the loser
    /// receives the winner's row.
    pub async fn resolve(&self, principal: Option<&Principal>) -> Result<User, ChatError> {
        let principal = principal.ok_or(ChatError::Unauthenticated)?;
        let email = principal.normalized_email();
        if email.is_empty() {
            return Err(ChatError::Unauthenticated);
        }

        if let Some(user) = self.users.find_by_email(&email).await? {
            debug!(user_id = %user.id, "principal resolved to existing user");
            return Ok(user);
        }

        if self.policy == IdentityPolicy::RequireExisting {
            return Err(ChatError::IdentityConflict);
        }

        let candidate = User {
            id: UserId::new(),
            display_name: Some(
                principal
                    .display_name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| generated_display_name(&email)),
            ),
            email,
            created_at: Utc::now(),
        };

        let outcome = self.users.insert_if_absent(&candidate).await?;
        if outcome.inserted {
            info!(user_id = %outcome.record.id, "provisioned user on first contact");
        }
        Ok(outcome.record)
    }
}

/// Display name for a provisioned user: the email's local part, or a
/// `guest-` name when there is none.
pub fn generated_display_name(email: &str) -> String {
    match email.split_once('@') {
        Some((local, _)) if !local.is_empty() => local.to_string(),
        _ => {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            format!("guest-{}", &suffix[..8])
        }
    }
}
