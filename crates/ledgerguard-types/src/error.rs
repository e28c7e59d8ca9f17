use thiserror::Error;

use crate::authz::Role;
use crate::ids::AccountId;

/// Result alias used across all subsystem crates.
pub type GuardResult<T> = Result<T, GuardError>;

/// Error taxonomy shared by every subsystem.
///
/// Every rejected mutation surfaces exactly one of these kinds and leaves
/// state unchanged.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Malformed input: score out of range, empty required text, empty identity.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Caller does not hold the role the operation requires.
    #[error("caller {caller} lacks required role {role:?}")]
    Unauthorized { caller: AccountId, role: Role },

    /// Caller is not the owner of the record it tried to mutate.
    #[error("caller {caller} does not own report {report_id}")]
    NotOwner { caller: AccountId, report_id: u64 },

    /// Operating on an account or record with no active/existing state.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation is not legal in the record's current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Referenced data source is unregistered or inactive.
    #[error("invalid data source: {0}")]
    InvalidSource(String),
}

impl GuardError {
    /// A poisoned state lock. Mutations never partially apply, so a poisoned
    /// lock means a panic elsewhere; surface it instead of propagating the panic.
    pub fn poisoned() -> Self {
        GuardError::InvalidState("state lock poisoned".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_names_caller_and_role() {
        let err = GuardError::Unauthorized {
            caller: AccountId::new("0xfeed"),
            role: Role::Auditor,
        };
        let s = err.to_string();
        assert!(s.contains("0xfeed"));
        assert!(s.contains("Auditor"));
    }

    #[test]
    fn validation_display() {
        let err = GuardError::Validation("score 140 exceeds 100".into());
        assert!(err.to_string().contains("140"));
    }
}
