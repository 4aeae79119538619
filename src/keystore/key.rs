//! Stream key types
//!
//! A key pair is issued per `cpk` and carries a main and a backup key that
//! share one expiry. Pairs are never mutated; re-issuance replaces them.

use std::fmt;

use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use super::error::KeyStoreError;

/// Bytes of entropy per key (hex-encoded to 32 characters)
pub const KEY_BYTES: usize = 16;

/// Role of a key within its pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    Main,
    Backup,
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRole::Main => f.write_str("main"),
            KeyRole::Backup => f.write_str("backup"),
        }
    }
}

/// A single issued stream key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamKey {
    /// Random hex token
    #[serde(rename = "key")]
    pub value: String,
    /// Main or backup
    #[serde(rename = "type")]
    pub role: KeyRole,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Main and backup keys issued together for one `cpk`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamKeyPair {
    pub cpk: String,
    pub main: StreamKey,
    pub backup: StreamKey,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StreamKeyPair {
    /// Build a pair from two freshly generated key values
    pub(crate) fn new(
        cpk: impl Into<String>,
        main: String,
        backup: String,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            cpk: cpk.into(),
            main: StreamKey {
                value: main,
                role: KeyRole::Main,
                created_at,
                expires_at,
            },
            backup: StreamKey {
                value: backup,
                role: KeyRole::Backup,
                created_at,
                expires_at,
            },
            created_at,
            expires_at,
        }
    }

    /// Whether the pair can still be handed out at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Whether the sweep should drop the pair at `now`
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// The key with the given role
    pub fn key(&self, role: KeyRole) -> &StreamKey {
        match role {
            KeyRole::Main => &self.main,
            KeyRole::Backup => &self.backup,
        }
    }

    /// Role of `value` within this pair, if it belongs to it
    pub fn role_of(&self, value: &str) -> Option<KeyRole> {
        if self.main.value == value {
            Some(KeyRole::Main)
        } else if self.backup.value == value {
            Some(KeyRole::Backup)
        } else {
            None
        }
    }
}

/// Source of key values
///
/// Each call must draw fresh entropy; the store calls it once per role.
pub trait KeyGenerator: Send + Sync + 'static {
    fn generate(&self, role: KeyRole) -> Result<String, KeyStoreError>;
}

/// Generator backed by the operating system RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct OsKeyGenerator;

impl KeyGenerator for OsKeyGenerator {
    fn generate(&self, role: KeyRole) -> Result<String, KeyStoreError> {
        let mut bytes = [0u8; KEY_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| KeyStoreError::Generation {
                role,
                reason: e.to_string(),
            })?;
        Ok(hex::encode(bytes))
    }
}
