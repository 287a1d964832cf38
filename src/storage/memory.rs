//! In-memory storage backend.
//!
//! Keeps every collection in a `RwLock<HashMap>`. Suitable for development
//! and tests; data is lost on drop and nothing is encrypted.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{Storage, StorageError};
use crate::types::{AccessTokenRecord, KeyKind, KeyRecord, PlatformRecord, StatusRecord};

/// In-memory [`Storage`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    platforms: RwLock<HashMap<String, PlatformRecord>>,
    public_keys: RwLock<HashMap<String, KeyRecord>>,
    private_keys: RwLock<HashMap<String, KeyRecord>>,
    statuses: RwLock<HashMap<String, StatusRecord>>,
    tokens: RwLock<HashMap<(String, String, String), AccessTokenRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn keys(&self, kind: KeyKind) -> &RwLock<HashMap<String, KeyRecord>> {
        match kind {
            KeyKind::Public => &self.public_keys,
            KeyKind::Private => &self.private_keys,
        }
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn find_platform(
        &self,
        url: &str,
        client_id: &str,
    ) -> Result<Option<PlatformRecord>, StorageError> {
        let platforms = self.platforms.read().unwrap();
        Ok(platforms
            .values()
            .find(|p| p.url == url && p.client_id == client_id)
            .cloned())
    }

    async fn find_platforms_by_url(
        &self,
        url: &str,
    ) -> Result<Vec<PlatformRecord>, StorageError> {
        let platforms = self.platforms.read().unwrap();
        Ok(platforms.values().filter(|p| p.url == url).cloned().collect())
    }

    async fn find_platform_by_kid(
        &self,
        kid: &str,
    ) -> Result<Option<PlatformRecord>, StorageError> {
        let platforms = self.platforms.read().unwrap();
        Ok(platforms.get(kid).cloned())
    }

    async fn list_platforms(&self) -> Result<Vec<PlatformRecord>, StorageError> {
        let platforms = self.platforms.read().unwrap();
        Ok(platforms.values().cloned().collect())
    }

    async fn upsert_platform(&self, record: &PlatformRecord) -> Result<(), StorageError> {
        let mut platforms = self.platforms.write().unwrap();
        // Replace keyed on the composite pair: an existing record for the
        // same (url, client_id) is dropped even if its kid differs.
        let existing_kid = platforms
            .values()
            .find(|p| p.url == record.url && p.client_id == record.client_id)
            .map(|p| p.kid.clone());
        if let Some(kid) = existing_kid {
            platforms.remove(&kid);
        }
        platforms.insert(record.kid.clone(), record.clone());
        Ok(())
    }

    async fn update_platform(
        &self,
        kid: &str,
        record: &PlatformRecord,
    ) -> Result<(), StorageError> {
        let mut platforms = self.platforms.write().unwrap();
        if platforms.contains_key(kid) {
            platforms.insert(kid.to_string(), record.clone());
        }
        Ok(())
    }

    async fn delete_platform(&self, url: &str, client_id: &str) -> Result<(), StorageError> {
        let mut platforms = self.platforms.write().unwrap();
        platforms.retain(|_, p| !(p.url == url && p.client_id == client_id));
        Ok(())
    }

    async fn put_key(&self, kind: KeyKind, record: &KeyRecord) -> Result<(), StorageError> {
        let mut keys = self.keys(kind).write().unwrap();
        keys.insert(record.kid.clone(), record.clone());
        Ok(())
    }

    async fn get_key(
        &self,
        kind: KeyKind,
        kid: &str,
    ) -> Result<Option<KeyRecord>, StorageError> {
        let keys = self.keys(kind).read().unwrap();
        Ok(keys.get(kid).cloned())
    }

    async fn retag_key(
        &self,
        kind: KeyKind,
        kid: &str,
        url: &str,
        client_id: &str,
    ) -> Result<(), StorageError> {
        let mut keys = self.keys(kind).write().unwrap();
        if let Some(record) = keys.get_mut(kid) {
            record.platform_url = url.to_string();
            record.client_id = client_id.to_string();
        }
        Ok(())
    }

    async fn delete_key(&self, kind: KeyKind, kid: &str) -> Result<(), StorageError> {
        let mut keys = self.keys(kind).write().unwrap();
        keys.remove(kid);
        Ok(())
    }

    async fn get_status(&self, kid: &str) -> Result<Option<StatusRecord>, StorageError> {
        let statuses = self.statuses.read().unwrap();
        Ok(statuses.get(kid).cloned())
    }

    async fn put_status(&self, record: &StatusRecord) -> Result<(), StorageError> {
        let mut statuses = self.statuses.write().unwrap();
        statuses.insert(record.kid.clone(), record.clone());
        Ok(())
    }

    async fn delete_status(&self, kid: &str) -> Result<(), StorageError> {
        let mut statuses = self.statuses.write().unwrap();
        statuses.remove(kid);
        Ok(())
    }

    async fn get_access_token(
        &self,
        url: &str,
        client_id: &str,
        scopes: &str,
    ) -> Result<Option<AccessTokenRecord>, StorageError> {
        let tokens = self.tokens.read().unwrap();
        let key = (url.to_string(), client_id.to_string(), scopes.to_string());
        Ok(tokens.get(&key).cloned())
    }

    async fn put_access_token(&self, record: &AccessTokenRecord) -> Result<(), StorageError> {
        let mut tokens = self.tokens.write().unwrap();
        let key = (
            record.platform_url.clone(),
            record.client_id.clone(),
            record.scopes.clone(),
        );
        tokens.insert(key, record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccessToken, AuthConfig, AuthMethod};
    use chrono::Utc;

    fn sample_platform(kid: &str, url: &str, client_id: &str) -> PlatformRecord {
        PlatformRecord {
            kid: kid.to_string(),
            url: url.to_string(),
            client_id: client_id.to_string(),
            name: "Example LMS".to_string(),
            authentication_endpoint: format!("{}/auth", url),
            access_token_endpoint: format!("{}/token", url),
            auth_config: AuthConfig {
                method: AuthMethod::JwkSet,
                key: format!("{}/keys", url),
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_and_lookups() {
        let store = MemoryStore::new();
        store
            .upsert_platform(&sample_platform("kid-1", "https://lms.example", "abc"))
            .await
            .unwrap();
        store
            .upsert_platform(&sample_platform("kid-2", "https://lms.example", "def"))
            .await
            .unwrap();

        let found = store
            .find_platform("https://lms.example", "abc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.kid, "kid-1");

        let by_url = store
            .find_platforms_by_url("https://lms.example")
            .await
            .unwrap();
        assert_eq!(by_url.len(), 2);

        assert!(store
            .find_platform("https://other.example", "abc")
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.list_platforms().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_pair() {
        let store = MemoryStore::new();
        store
            .upsert_platform(&sample_platform("kid-1", "https://lms.example", "abc"))
            .await
            .unwrap();
        store
            .upsert_platform(&sample_platform("kid-9", "https://lms.example", "abc"))
            .await
            .unwrap();

        let all = store.list_platforms().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].kid, "kid-9");
    }

    #[tokio::test]
    async fn test_update_platform_unknown_kid_is_noop() {
        let store = MemoryStore::new();
        store
            .update_platform("ghost", &sample_platform("ghost", "https://x", "y"))
            .await
            .unwrap();
        assert!(store.list_platforms().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_key_retag_and_delete() {
        let store = MemoryStore::new();
        let record = KeyRecord {
            kid: "kid-1".to_string(),
            platform_url: "https://lms.example".to_string(),
            client_id: "abc".to_string(),
            key: "PEM".to_string(),
        };
        store.put_key(KeyKind::Public, &record).await.unwrap();

        store
            .retag_key(KeyKind::Public, "kid-1", "https://moved.example", "xyz")
            .await
            .unwrap();
        let fetched = store.get_key(KeyKind::Public, "kid-1").await.unwrap().unwrap();
        assert_eq!(fetched.platform_url, "https://moved.example");
        assert_eq!(fetched.client_id, "xyz");
        assert_eq!(fetched.key, "PEM");

        store.delete_key(KeyKind::Public, "kid-1").await.unwrap();
        assert!(store.get_key(KeyKind::Public, "kid-1").await.unwrap().is_none());
        // Deleting again stays a no-op
        store.delete_key(KeyKind::Public, "kid-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_status_replace() {
        let store = MemoryStore::new();
        assert!(store.get_status("kid-1").await.unwrap().is_none());

        store
            .put_status(&StatusRecord {
                kid: "kid-1".to_string(),
                active: false,
            })
            .await
            .unwrap();
        assert!(!store.get_status("kid-1").await.unwrap().unwrap().active);

        store
            .put_status(&StatusRecord {
                kid: "kid-1".to_string(),
                active: true,
            })
            .await
            .unwrap();
        assert!(store.get_status("kid-1").await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_token_triple_is_literal() {
        let store = MemoryStore::new();
        let record = AccessTokenRecord {
            platform_url: "https://lms.example".to_string(),
            client_id: "abc".to_string(),
            scopes: "a b".to_string(),
            token: AccessToken {
                access_token: "tok".to_string(),
                token_type: "bearer".to_string(),
                expires_in: 3600,
                scope: None,
            },
            created_at: Utc::now(),
        };
        store.put_access_token(&record).await.unwrap();

        assert!(store
            .get_access_token("https://lms.example", "abc", "a b")
            .await
            .unwrap()
            .is_some());
        // Reordered scope string is a different cache entry
        assert!(store
            .get_access_token("https://lms.example", "abc", "b a")
            .await
            .unwrap()
            .is_none());
    }
}
