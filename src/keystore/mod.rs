//! Stream key store
//!
//! Issues and tracks time-limited main/backup key pairs per caller
//! identifier (`cpk`). The HTTP API issues, lists and deletes pairs; a
//! background task sweeps expired ones.
//!
//! # Architecture
//!
//! ```text
//!        POST /api/stream-keys          every sweep interval
//!                 │                              │
//!                 ▼                              ▼
//!     ┌───────────────────────────────────────────────────┐
//!     │ Arc<KeyStore>                                     │
//!     │   entries: RwLock<HashMap<cpk, StreamKeyPair {    │
//!     │       main, backup, created_at, expires_at        │
//!     │   }>>                                             │
//!     └───────────────────────────────────────────────────┘
//!                 ▲                              ▲
//!                 │                              │
//!      GET/DELETE /api/stream-keys        find_by_key()
//! ```
//!
//! Reads take the shared lock. `get_or_create`, `delete` and
//! `cleanup_expired` take the exclusive lock for their whole critical
//! section; key generation is in-memory, so the lock is never held across I/O.

pub mod config;
pub mod error;
pub mod key;
pub mod store;

pub use config::KeyStoreConfig;
pub use error::KeyStoreError;
pub use key::{KeyGenerator, KeyRole, OsKeyGenerator, StreamKey, StreamKeyPair, KEY_BYTES};
pub use store::{Issued, KeyMatch, KeyStore};
