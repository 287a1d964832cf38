//! Storage contract for platform records and their satellite collections.
//!
//! The registry and entity layers speak to persistence only through the
//! [`Storage`] trait. Two backends ship with the crate: [`MemoryStore`] for
//! development and tests, and [`SqliteStore`] which keeps key material and
//! cached token payloads encrypted at rest.

use async_trait::async_trait;

use crate::types::{AccessTokenRecord, KeyKind, KeyRecord, PlatformRecord, StatusRecord};

mod encryption;
mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors raised by storage backends.
#[derive(Debug)]
pub enum StorageError {
    /// Underlying database failure.
    Database(String),
    /// At-rest encryption or decryption failure.
    Encryption(String),
    /// A stored value could not be encoded or decoded.
    Serialization(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Database(detail) => write!(f, "database error: {}", detail),
            StorageError::Encryption(detail) => write!(f, "encryption error: {}", detail),
            StorageError::Serialization(detail) => write!(f, "serialization error: {}", detail),
        }
    }
}

impl std::error::Error for StorageError {}

/// Persistence contract over the five collections backing the registry:
/// platform records, public keys, private keys, platform status and cached
/// access tokens.
///
/// Implementations must be thread-safe. Deletes are idempotent: removing an
/// absent record is a successful no-op. Backends that encrypt key material or
/// token payloads at rest must return decrypted values from the read methods.
#[async_trait]
pub trait Storage: Send + Sync {
    // Platform records

    /// Looks up the single platform matching (`url`, `client_id`).
    async fn find_platform(
        &self,
        url: &str,
        client_id: &str,
    ) -> Result<Option<PlatformRecord>, StorageError>;

    /// Returns every platform registered under the given issuer url.
    async fn find_platforms_by_url(&self, url: &str)
        -> Result<Vec<PlatformRecord>, StorageError>;

    /// Looks up a platform by its key id.
    async fn find_platform_by_kid(&self, kid: &str)
        -> Result<Option<PlatformRecord>, StorageError>;

    /// Returns all registered platforms.
    async fn list_platforms(&self) -> Result<Vec<PlatformRecord>, StorageError>;

    /// Inserts or replaces the platform record keyed on its
    /// (`url`, `client_id`) pair.
    async fn upsert_platform(&self, record: &PlatformRecord) -> Result<(), StorageError>;

    /// Rewrites the platform record currently stored under `kid`.
    /// A no-op when no record with that kid exists.
    async fn update_platform(
        &self,
        kid: &str,
        record: &PlatformRecord,
    ) -> Result<(), StorageError>;

    /// Removes the platform record for (`url`, `client_id`), if any.
    async fn delete_platform(&self, url: &str, client_id: &str) -> Result<(), StorageError>;

    // Key pair records

    /// Inserts or replaces one half of a platform's key pair, keyed by kid.
    async fn put_key(&self, kind: KeyKind, record: &KeyRecord) -> Result<(), StorageError>;

    /// Reads one half of a platform's key pair. Material is returned
    /// decrypted regardless of how the backend stores it.
    async fn get_key(&self, kind: KeyKind, kid: &str)
        -> Result<Option<KeyRecord>, StorageError>;

    /// Rewrites the (`url`, `client_id`) tag on a stored key record so it
    /// follows a platform identity change. A no-op when the kid is unknown.
    async fn retag_key(
        &self,
        kind: KeyKind,
        kid: &str,
        url: &str,
        client_id: &str,
    ) -> Result<(), StorageError>;

    /// Removes one half of a platform's key pair, if present.
    async fn delete_key(&self, kind: KeyKind, kid: &str) -> Result<(), StorageError>;

    // Status records

    /// Reads the activation record for a platform. Absence means active.
    async fn get_status(&self, kid: &str) -> Result<Option<StatusRecord>, StorageError>;

    /// Replaces the activation record wholesale.
    async fn put_status(&self, record: &StatusRecord) -> Result<(), StorageError>;

    /// Removes the activation record, if present.
    async fn delete_status(&self, kid: &str) -> Result<(), StorageError>;

    // Access token records

    /// Reads the cached token for the literal (`url`, `client_id`, `scopes`)
    /// triple.
    async fn get_access_token(
        &self,
        url: &str,
        client_id: &str,
        scopes: &str,
    ) -> Result<Option<AccessTokenRecord>, StorageError>;

    /// Replaces the cached token for its triple wholesale.
    async fn put_access_token(&self, record: &AccessTokenRecord) -> Result<(), StorageError>;
}
