//! Key store error types

use std::time::Duration;

use super::key::KeyRole;

/// Error type for key store operations
///
/// A failed issuance leaves the store unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyStoreError {
    /// The randomness source failed while generating a key
    #[error("failed to generate {role} key: {reason}")]
    Generation { role: KeyRole, reason: String },

    /// The requested lifetime cannot be represented as an expiry time
    #[error("invalid key duration: {0:?}")]
    InvalidDuration(Duration),

    /// The requested number of minutes does not fit in a duration
    #[error("key duration of {0} minutes is out of range")]
    DurationOutOfRange(i64),
}
