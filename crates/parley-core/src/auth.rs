//! The authentication capability consumed by the engine.
//!
//! Credential checks happen outside the engine. Whatever performs them hands
//! the engine an `AuthContext`, which either yields the current principal or
//! nothing at all.

use parley_types::identity::Principal;

/// Source of the authenticated caller for one request.
pub trait AuthContext {
    /// The authenticated principal, or `None` when the caller is anonymous.
    fn current_principal(&self) -> Option<Principal>;
}

/// A principal resolved ahead of time (CLI sessions, tests).
impl AuthContext for Option<Principal> {
    fn current_principal(&self) -> Option<Principal> {
        self.clone()
    }
}

impl AuthContext for Principal {
    fn current_principal(&self) -> Option<Principal> {
        Some(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_principal_context() {
        let none: Option<Principal> = None;
        assert!(none.current_principal().is_none());

        let some = Some(Principal::new("a@example.com"));
        assert_eq!(
            some.current_principal().map(|p| p.email),
            Some("a@example.com".to_string())
        );
    }
}
