//! The platform entity: an opaque handle over one registered platform.
//!
//! Returned by the registry, it caches the identity fields in memory and
//! writes every mutation through to storage before updating that cache. Key
//! material is never cached — both lookups always go back to the credential
//! store.

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::error::Error;
use crate::keys::Keychain;
use crate::storage::Storage;
use crate::token::{capitalize_scheme, TokenIssuer};
use crate::types::{
    AccessToken, AuthConfig, AuthMethod, PlatformRecord, PlatformSnapshot, StatusRecord,
};

/// Handle over a registered platform.
///
/// All state is private; reads come from the in-memory record, writes persist
/// first and update the record on success.
pub struct Platform {
    record: PlatformRecord,
    storage: Arc<dyn Storage>,
    keys: Keychain,
    issuer: Arc<dyn TokenIssuer>,
}

impl Platform {
    pub(crate) fn new(
        record: PlatformRecord,
        storage: Arc<dyn Storage>,
        keys: Keychain,
        issuer: Arc<dyn TokenIssuer>,
    ) -> Self {
        Self {
            record,
            storage,
            keys,
            issuer,
        }
    }

    /// Key id of this platform's key pair. Immutable.
    pub fn kid(&self) -> &str {
        &self.record.kid
    }

    /// Platform issuer url.
    pub fn url(&self) -> &str {
        &self.record.url
    }

    /// Client id assigned by the platform.
    pub fn client_id(&self) -> &str {
        &self.record.client_id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Persists a new display name, then updates the cached record.
    pub async fn set_name(&mut self, name: &str) -> Result<(), Error> {
        let mut updated = self.record.clone();
        updated.name = name.to_string();
        self.persist(updated).await
    }

    /// Endpoint used to authenticate within the platform.
    pub fn authentication_endpoint(&self) -> &str {
        &self.record.authentication_endpoint
    }

    pub async fn set_authentication_endpoint(&mut self, endpoint: &str) -> Result<(), Error> {
        let mut updated = self.record.clone();
        updated.authentication_endpoint = endpoint.to_string();
        self.persist(updated).await
    }

    /// Endpoint used to obtain access tokens from the platform.
    pub fn access_token_endpoint(&self) -> &str {
        &self.record.access_token_endpoint
    }

    pub async fn set_access_token_endpoint(&mut self, endpoint: &str) -> Result<(), Error> {
        let mut updated = self.record.clone();
        updated.access_token_endpoint = endpoint.to_string();
        self.persist(updated).await
    }

    /// Message verification configuration.
    pub fn auth_config(&self) -> &AuthConfig {
        &self.record.auth_config
    }

    /// Overwrites the verification method and/or key independently;
    /// unspecified parts keep their current values.
    pub async fn update_auth_config(
        &mut self,
        method: Option<AuthMethod>,
        key: Option<String>,
    ) -> Result<&AuthConfig, Error> {
        let mut updated = self.record.clone();
        updated.auth_config = AuthConfig {
            method: method.unwrap_or(self.record.auth_config.method),
            key: key.unwrap_or_else(|| self.record.auth_config.key.clone()),
        };
        self.persist(updated).await?;
        Ok(&self.record.auth_config)
    }

    /// Whether the platform is active. A platform with no status record is
    /// active by default.
    pub async fn active(&self) -> Result<bool, Error> {
        let status = self.storage.get_status(&self.record.kid).await?;
        Ok(status.map(|s| s.active).unwrap_or(true))
    }

    /// Replaces the status record wholesale with the given flag.
    pub async fn set_active(&self, active: bool) -> Result<(), Error> {
        self.storage
            .put_status(&StatusRecord {
                kid: self.record.kid.clone(),
                active,
            })
            .await?;
        Ok(())
    }

    /// Public key material for this platform, read from the credential store.
    pub async fn public_key(&self) -> Result<String, Error> {
        self.keys
            .public_key(&self.record.kid)
            .await?
            .ok_or_else(|| Error::KeyNotFound(self.record.kid.clone()))
    }

    /// Private key material for this platform, read from the credential
    /// store. Never cached in memory.
    pub async fn private_key(&self) -> Result<String, Error> {
        self.keys
            .private_key(&self.record.kid)
            .await?
            .ok_or_else(|| Error::KeyNotFound(self.record.kid.clone()))
    }

    /// Returns a valid access token for the given scope string, minting a new
    /// one through the token issuer when the cached token is absent or has
    /// outlived its `expires_in` window.
    ///
    /// The scope string is used literally as part of the cache key. The
    /// returned `token_type` always has its first character uppercased.
    pub async fn access_token(&self, scopes: &str) -> Result<AccessToken, Error> {
        let cached = self
            .storage
            .get_access_token(&self.record.url, &self.record.client_id, scopes)
            .await?;

        let mut token = match cached {
            Some(record) if !record.is_stale(Utc::now()) => {
                debug!(url = %self.record.url, scopes, "access token cache hit");
                record.token
            }
            _ => {
                debug!(
                    url = %self.record.url,
                    scopes,
                    "no valid cached access token, requesting a new one"
                );
                self.issuer.generate_access_token(scopes, self).await?
            }
        };

        token.token_type = capitalize_scheme(&token.token_type);
        Ok(token)
    }

    /// Assembles a read-only projection of this platform: identity fields,
    /// public key and activation status. No side effects.
    pub async fn snapshot(&self) -> Result<PlatformSnapshot, Error> {
        Ok(PlatformSnapshot {
            id: self.record.kid.clone(),
            url: self.record.url.clone(),
            client_id: self.record.client_id.clone(),
            name: self.record.name.clone(),
            authentication_endpoint: self.record.authentication_endpoint.clone(),
            access_token_endpoint: self.record.access_token_endpoint.clone(),
            auth_config: self.record.auth_config.clone(),
            public_key: self.public_key().await?,
            active: self.active().await?,
        })
    }

    /// Removes this platform and its satellite records: the platform record,
    /// the status record and both halves of the key pair. Each step is
    /// idempotent.
    pub async fn delete(self) -> Result<(), Error> {
        self.storage
            .delete_platform(&self.record.url, &self.record.client_id)
            .await?;
        self.storage.delete_status(&self.record.kid).await?;
        self.keys.delete_pair(&self.record.kid).await?;
        debug!(
            url = %self.record.url,
            client_id = %self.record.client_id,
            kid = %self.record.kid,
            "platform deleted"
        );
        Ok(())
    }

    async fn persist(&mut self, updated: PlatformRecord) -> Result<(), Error> {
        self.storage
            .update_platform(&self.record.kid, &updated)
            .await?;
        self.record = updated;
        Ok(())
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("kid", &self.record.kid)
            .field("url", &self.record.url)
            .field("client_id", &self.record.client_id)
            .finish_non_exhaustive()
    }
}
