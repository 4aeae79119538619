//! Stream key store implementation
//!
//! The registry of issued key pairs, keyed by `cpk`. Listing and lookups
//! share a read lock; every mutation holds the write lock for its whole
//! critical section so the expiry check and the insert are atomic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::error::KeyStoreError;
use super::key::{KeyGenerator, KeyRole, OsKeyGenerator, StreamKeyPair};

/// Outcome of an issuance request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issued {
    /// The pair now stored for the cpk
    pub pair: StreamKeyPair,
    /// True only for the caller whose request generated the pair
    pub created: bool,
}

/// Result of a reverse lookup by key value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMatch {
    pub cpk: String,
    pub role: KeyRole,
}

/// Concurrent registry of stream key pairs
pub struct KeyStore {
    /// Map of cpk to its current pair
    entries: RwLock<HashMap<String, StreamKeyPair>>,

    /// Randomness source for key values
    generator: Box<dyn KeyGenerator>,
}

impl KeyStore {
    /// Create an empty store backed by the OS RNG
    pub fn new() -> Self {
        Self::with_generator(OsKeyGenerator)
    }

    /// Create an empty store with a custom key generator
    pub fn with_generator(generator: impl KeyGenerator) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            generator: Box::new(generator),
        }
    }

    /// Return the unexpired pair for `cpk`, or issue a new one
    ///
    /// An existing pair is returned unchanged; its expiry is not extended.
    pub async fn get_or_create(
        &self,
        cpk: &str,
        duration: Duration,
    ) -> Result<Issued, KeyStoreError> {
        self.get_or_create_at(cpk, duration, Utc::now()).await
    }

    /// [`get_or_create`](Self::get_or_create) evaluated at a given instant
    pub async fn get_or_create_at(
        &self,
        cpk: &str,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Issued, KeyStoreError> {
        let mut entries = self.entries.write().await;

        if let Some(pair) = entries.get(cpk) {
            if pair.is_valid_at(now) {
                return Ok(Issued {
                    pair: pair.clone(),
                    created: false,
                });
            }
        }

        let expires_at = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .ok_or(KeyStoreError::InvalidDuration(duration))?;

        let main = self.generator.generate(KeyRole::Main)?;
        let backup = self.generator.generate(KeyRole::Backup)?;

        let pair = StreamKeyPair::new(cpk, main, backup, now, expires_at);
        let replaced = entries.insert(cpk.to_string(), pair.clone()).is_some();

        tracing::info!(
            cpk = cpk,
            expires_at = %expires_at,
            replaced_expired = replaced,
            "Stream key pair issued"
        );

        Ok(Issued {
            pair,
            created: true,
        })
    }

    /// Remove the pair for `cpk`; absent entries are a no-op
    pub async fn delete(&self, cpk: &str) {
        let removed = self.entries.write().await.remove(cpk).is_some();
        tracing::debug!(cpk = cpk, removed = removed, "Stream key pair deleted");
    }

    /// Remove every pair past its expiry, returning how many were removed
    pub async fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Utc::now()).await
    }

    /// [`cleanup_expired`](Self::cleanup_expired) evaluated at a given instant
    pub async fn cleanup_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, pair| !pair.is_past_expiry(now));
        before - entries.len()
    }

    /// Snapshot of every stored pair
    pub async fn get_all(&self) -> HashMap<String, StreamKeyPair> {
        self.entries.read().await.clone()
    }

    /// Unexpired pair for `cpk`, if any
    pub async fn get(&self, cpk: &str) -> Option<StreamKeyPair> {
        let now = Utc::now();
        self.entries
            .read()
            .await
            .get(cpk)
            .filter(|pair| pair.is_valid_at(now))
            .cloned()
    }

    /// Find which unexpired pair a key value belongs to
    pub async fn find_by_key(&self, value: &str) -> Option<KeyMatch> {
        let now = Utc::now();
        let entries = self.entries.read().await;

        entries
            .values()
            .filter(|pair| pair.is_valid_at(now))
            .find_map(|pair| {
                pair.role_of(value).map(|role| KeyMatch {
                    cpk: pair.cpk.clone(),
                    role,
                })
            })
    }

    /// Number of stored pairs, including expired ones not yet swept
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Spawn background expiry sweep
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let count = store.cleanup_expired().await;
                if count > 0 {
                    tracing::debug!(count = count, "Removed expired stream keys");
                }
            }
        })
    }
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}
