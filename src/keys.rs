//! Key pair records and the generator seam.
//!
//! A platform's key pair is created once at registration and never
//! regenerated; identity changes only rewrite the (url, client id) tag on the
//! stored records. The asymmetric generation algorithm itself is supplied by
//! the caller through [`KeyPairGenerator`].

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Error;
use crate::storage::{Storage, StorageError};
use crate::types::{KeyKind, KeyRecord};

/// Freshly generated key pair together with its globally unique key id.
#[derive(Clone, Debug)]
pub struct GeneratedKeyPair {
    pub kid: String,
    pub public_key: String,
    pub private_key: String,
}

/// Key pair generation collaborator.
///
/// Implementations own the actual asymmetric algorithm (and possibly an HSM
/// round-trip); the registry only needs the resulting material and a unique
/// `kid`.
#[async_trait]
pub trait KeyPairGenerator: Send + Sync {
    async fn generate_key_pair(&self) -> Result<GeneratedKeyPair, Error>;
}

/// Returns a fresh globally unique key id.
///
/// Convenience for [`KeyPairGenerator`] implementations.
pub fn generate_kid() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Accessor pair over the public and private key collections.
///
/// Lookups always go to storage; key material is deliberately never held in
/// memory alongside the cached platform fields.
#[derive(Clone)]
pub struct Keychain {
    storage: Arc<dyn Storage>,
}

impl Keychain {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Stores both halves of a freshly generated pair, tagged with the owning
    /// platform's (url, client id). Public first, then private.
    pub async fn store_pair(
        &self,
        pair: &GeneratedKeyPair,
        url: &str,
        client_id: &str,
    ) -> Result<(), StorageError> {
        self.storage
            .put_key(
                KeyKind::Public,
                &KeyRecord {
                    kid: pair.kid.clone(),
                    platform_url: url.to_string(),
                    client_id: client_id.to_string(),
                    key: pair.public_key.clone(),
                },
            )
            .await?;
        self.storage
            .put_key(
                KeyKind::Private,
                &KeyRecord {
                    kid: pair.kid.clone(),
                    platform_url: url.to_string(),
                    client_id: client_id.to_string(),
                    key: pair.private_key.clone(),
                },
            )
            .await
    }

    /// Reads the public key material for a kid.
    pub async fn public_key(&self, kid: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .storage
            .get_key(KeyKind::Public, kid)
            .await?
            .map(|record| record.key))
    }

    /// Reads the private key material for a kid.
    pub async fn private_key(&self, kid: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .storage
            .get_key(KeyKind::Private, kid)
            .await?
            .map(|record| record.key))
    }

    /// Rewrites the identity tag on both halves of a pair.
    pub async fn retag_pair(
        &self,
        kid: &str,
        url: &str,
        client_id: &str,
    ) -> Result<(), StorageError> {
        self.storage
            .retag_key(KeyKind::Public, kid, url, client_id)
            .await?;
        self.storage
            .retag_key(KeyKind::Private, kid, url, client_id)
            .await
    }

    /// Removes both halves of a pair. A no-op for unknown kids.
    pub async fn delete_pair(&self, kid: &str) -> Result<(), StorageError> {
        self.storage.delete_key(KeyKind::Public, kid).await?;
        self.storage.delete_key(KeyKind::Private, kid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn sample_pair(kid: &str) -> GeneratedKeyPair {
        GeneratedKeyPair {
            kid: kid.to_string(),
            public_key: format!("PUB-{}", kid),
            private_key: format!("PRIV-{}", kid),
        }
    }

    #[test]
    fn test_generate_kid_unique() {
        let a = generate_kid();
        let b = generate_kid();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[tokio::test]
    async fn test_store_and_read_pair() {
        let keychain = Keychain::new(Arc::new(MemoryStore::new()));
        keychain
            .store_pair(&sample_pair("kid-1"), "https://lms.example", "abc")
            .await
            .unwrap();

        assert_eq!(
            keychain.public_key("kid-1").await.unwrap().as_deref(),
            Some("PUB-kid-1")
        );
        assert_eq!(
            keychain.private_key("kid-1").await.unwrap().as_deref(),
            Some("PRIV-kid-1")
        );
        assert!(keychain.public_key("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retag_pair() {
        let storage = Arc::new(MemoryStore::new());
        let keychain = Keychain::new(storage.clone());
        keychain
            .store_pair(&sample_pair("kid-1"), "https://lms.example", "abc")
            .await
            .unwrap();

        keychain
            .retag_pair("kid-1", "https://moved.example", "xyz")
            .await
            .unwrap();

        for kind in [KeyKind::Public, KeyKind::Private] {
            let record = storage.get_key(kind, "kid-1").await.unwrap().unwrap();
            assert_eq!(record.platform_url, "https://moved.example");
            assert_eq!(record.client_id, "xyz");
        }
    }

    #[tokio::test]
    async fn test_delete_pair_idempotent() {
        let keychain = Keychain::new(Arc::new(MemoryStore::new()));
        keychain
            .store_pair(&sample_pair("kid-1"), "https://lms.example", "abc")
            .await
            .unwrap();

        keychain.delete_pair("kid-1").await.unwrap();
        assert!(keychain.public_key("kid-1").await.unwrap().is_none());
        assert!(keychain.private_key("kid-1").await.unwrap().is_none());

        keychain.delete_pair("kid-1").await.unwrap();
    }
}
