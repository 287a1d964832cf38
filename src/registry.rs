//! Platform registration, lookup, update and deletion.
//!
//! The registry owns the composite-uniqueness invariant on
//! (url, client id) and orchestrates the multi-record writes that
//! registration and identity changes require, with compensating rollback on
//! the failure paths.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::keys::{KeyPairGenerator, Keychain};
use crate::platform::Platform;
use crate::storage::Storage;
use crate::token::TokenIssuer;
use crate::types::{AuthConfig, AuthMethod, PlatformRecord};

/// Registration request.
///
/// `url` and `client_id` are always required. The remaining fields are
/// required for a first-time registration; when the (url, client id) pair is
/// already registered they act as a partial update and may be omitted.
#[derive(Clone, Debug, Deserialize)]
pub struct Registration {
    pub url: String,
    pub client_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub authentication_endpoint: Option<String>,
    #[serde(default)]
    pub access_token_endpoint: Option<String>,
    #[serde(default)]
    pub auth_config: Option<AuthConfig>,
}

/// Field-by-field update for [`PlatformRegistry::update_platform_by_id`].
/// Absent fields keep their current values.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PlatformPatch {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub authentication_endpoint: Option<String>,
    #[serde(default)]
    pub access_token_endpoint: Option<String>,
    #[serde(default)]
    pub auth_config: Option<AuthConfigPatch>,
}

/// Partial auth configuration update; method and key are overridable
/// independently.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AuthConfigPatch {
    #[serde(default)]
    pub method: Option<AuthMethod>,
    #[serde(default)]
    pub key: Option<String>,
}

impl PlatformPatch {
    /// True when the patch carries no changes at all.
    pub fn is_empty(&self) -> bool {
        let auth_empty = match &self.auth_config {
            None => true,
            Some(patch) => patch.method.is_none() && patch.key.is_none(),
        };
        self.url.is_none()
            && self.client_id.is_none()
            && self.name.is_none()
            && self.authentication_endpoint.is_none()
            && self.access_token_endpoint.is_none()
            && auth_empty
    }
}

/// Registry of platforms trusted by this tool.
///
/// Lookups materialize [`Platform`] entities over the shared storage and
/// collaborator handles. Registration and identity-changing updates are
/// multi-step write sequences; see the method docs for their rollback
/// contracts.
pub struct PlatformRegistry {
    storage: Arc<dyn Storage>,
    keys: Keychain,
    generator: Arc<dyn KeyPairGenerator>,
    issuer: Arc<dyn TokenIssuer>,
}

impl PlatformRegistry {
    pub fn new(
        storage: Arc<dyn Storage>,
        generator: Arc<dyn KeyPairGenerator>,
        issuer: Arc<dyn TokenIssuer>,
    ) -> Self {
        let keys = Keychain::new(Arc::clone(&storage));
        Self {
            storage,
            keys,
            generator,
            issuer,
        }
    }

    fn entity(&self, record: PlatformRecord) -> Platform {
        Platform::new(
            record,
            Arc::clone(&self.storage),
            self.keys.clone(),
            Arc::clone(&self.issuer),
        )
    }

    /// Looks up the platform registered under (url, client id).
    pub async fn get_platform(
        &self,
        url: &str,
        client_id: &str,
    ) -> Result<Option<Platform>, Error> {
        if url.is_empty() {
            return Err(Error::MissingUrl);
        }
        let record = self.storage.find_platform(url, client_id).await?;
        Ok(record.map(|r| self.entity(r)))
    }

    /// Returns every platform sharing an issuer url; one issuer can register
    /// multiple client ids.
    pub async fn get_platforms_by_url(&self, url: &str) -> Result<Vec<Platform>, Error> {
        if url.is_empty() {
            return Err(Error::MissingUrl);
        }
        let records = self.storage.find_platforms_by_url(url).await?;
        Ok(records.into_iter().map(|r| self.entity(r)).collect())
    }

    /// Looks up a platform by its key id.
    pub async fn get_platform_by_id(&self, kid: &str) -> Result<Option<Platform>, Error> {
        if kid.is_empty() {
            return Err(Error::MissingId);
        }
        let record = self.storage.find_platform_by_kid(kid).await?;
        Ok(record.map(|r| self.entity(r)))
    }

    /// Returns every registered platform.
    pub async fn get_all_platforms(&self) -> Result<Vec<Platform>, Error> {
        let records = self.storage.list_platforms().await?;
        Ok(records.into_iter().map(|r| self.entity(r)).collect())
    }

    /// Registers a platform, or updates it when the (url, client id) pair is
    /// already registered (idempotent re-registration: supplied fields
    /// overwrite, omitted fields are kept).
    ///
    /// A first-time registration generates a key pair and writes the public
    /// key record, the private key record and the platform record in that
    /// order. If any write fails, all records already written for this
    /// attempt are removed before the original error is returned, so a failed
    /// registration leaves nothing behind.
    ///
    /// The existence check and the writes are not one atomic step; concurrent
    /// registrations of the same pair can race (see `SqliteStore`'s unique
    /// constraint for how the persistent backend resolves the loser).
    pub async fn register_platform(&self, registration: Registration) -> Result<Platform, Error> {
        if registration.url.is_empty() || registration.client_id.is_empty() {
            return Err(Error::MissingParameters);
        }

        let existing = self
            .storage
            .find_platform(&registration.url, &registration.client_id)
            .await?;

        if let Some(current) = existing {
            debug!(
                url = %registration.url,
                client_id = %registration.client_id,
                "platform already registered, applying update"
            );
            let record = PlatformRecord {
                kid: current.kid.clone(),
                url: current.url,
                client_id: current.client_id,
                name: registration.name.unwrap_or(current.name),
                authentication_endpoint: registration
                    .authentication_endpoint
                    .unwrap_or(current.authentication_endpoint),
                access_token_endpoint: registration
                    .access_token_endpoint
                    .unwrap_or(current.access_token_endpoint),
                auth_config: registration.auth_config.unwrap_or(current.auth_config),
            };
            self.storage.update_platform(&current.kid, &record).await?;
            return Ok(self.entity(record));
        }

        let name = registration.name.ok_or(Error::MissingParameters)?;
        let authentication_endpoint = registration
            .authentication_endpoint
            .ok_or(Error::MissingParameters)?;
        let access_token_endpoint = registration
            .access_token_endpoint
            .ok_or(Error::MissingParameters)?;
        let auth_config = registration.auth_config.ok_or(Error::MissingParameters)?;
        if auth_config.key.is_empty() {
            return Err(Error::MissingAuthKey);
        }

        info!(
            url = %registration.url,
            client_id = %registration.client_id,
            "registering new platform"
        );

        let pair = self.generator.generate_key_pair().await?;
        let record = PlatformRecord {
            kid: pair.kid.clone(),
            url: registration.url,
            client_id: registration.client_id,
            name,
            authentication_endpoint,
            access_token_endpoint,
            auth_config,
        };

        if let Err(err) = self.commit_registration(&record, &pair).await {
            warn!(
                kid = %pair.kid,
                url = %record.url,
                client_id = %record.client_id,
                error = %err,
                "registration failed, removing partial records"
            );
            if let Err(cleanup) = self.keys.delete_pair(&pair.kid).await {
                warn!(kid = %pair.kid, error = %cleanup, "failed to remove key records during rollback");
            }
            if let Err(cleanup) = self
                .storage
                .delete_platform(&record.url, &record.client_id)
                .await
            {
                warn!(
                    url = %record.url,
                    client_id = %record.client_id,
                    error = %cleanup,
                    "failed to remove platform record during rollback"
                );
            }
            return Err(err);
        }

        Ok(self.entity(record))
    }

    async fn commit_registration(
        &self,
        record: &PlatformRecord,
        pair: &crate::keys::GeneratedKeyPair,
    ) -> Result<(), Error> {
        self.keys
            .store_pair(pair, &record.url, &record.client_id)
            .await?;
        self.storage.upsert_platform(record).await?;
        Ok(())
    }

    /// Updates a platform by its key id, merging the patch over the current
    /// record. Returns `Ok(None)` when the kid is unknown.
    ///
    /// When the merged (url, client id) pair differs from the current one,
    /// this is an identity change: it fails with
    /// [`Error::IdentityConflict`] if another platform occupies the target
    /// pair; otherwise both key records are re-tagged to the new pair before
    /// the platform record is written. If either step fails, the key records
    /// are re-tagged back to the original pair so they never reference an
    /// identity inconsistent with the committed platform record, and the
    /// original error is returned.
    pub async fn update_platform_by_id(
        &self,
        kid: &str,
        patch: PlatformPatch,
    ) -> Result<Option<Platform>, Error> {
        if kid.is_empty() {
            return Err(Error::MissingId);
        }
        if patch.is_empty() {
            return Err(Error::MissingPlatformInfo);
        }

        let current = match self.storage.find_platform_by_kid(kid).await? {
            Some(record) => record,
            None => return Ok(None),
        };

        let auth_config = match patch.auth_config {
            Some(auth_patch) => AuthConfig {
                method: auth_patch.method.unwrap_or(current.auth_config.method),
                key: auth_patch
                    .key
                    .unwrap_or_else(|| current.auth_config.key.clone()),
            },
            None => current.auth_config.clone(),
        };

        let merged = PlatformRecord {
            kid: current.kid.clone(),
            url: patch.url.unwrap_or_else(|| current.url.clone()),
            client_id: patch.client_id.unwrap_or_else(|| current.client_id.clone()),
            name: patch.name.unwrap_or_else(|| current.name.clone()),
            authentication_endpoint: patch
                .authentication_endpoint
                .unwrap_or_else(|| current.authentication_endpoint.clone()),
            access_token_endpoint: patch
                .access_token_endpoint
                .unwrap_or_else(|| current.access_token_endpoint.clone()),
            auth_config,
        };

        let identity_changed =
            merged.url != current.url || merged.client_id != current.client_id;

        if identity_changed {
            if self
                .storage
                .find_platform(&merged.url, &merged.client_id)
                .await?
                .is_some()
            {
                return Err(Error::IdentityConflict {
                    url: merged.url,
                    client_id: merged.client_id,
                });
            }
            info!(
                kid = %kid,
                from_url = %current.url,
                to_url = %merged.url,
                "platform identity change"
            );
        }

        if let Err(err) = self.apply_update(kid, &merged, identity_changed).await {
            if identity_changed {
                if let Err(rollback) = self
                    .keys
                    .retag_pair(kid, &current.url, &current.client_id)
                    .await
                {
                    warn!(
                        kid = %kid,
                        error = %rollback,
                        "failed to restore key record tags after update failure"
                    );
                }
            }
            return Err(err);
        }

        Ok(Some(self.entity(merged)))
    }

    async fn apply_update(
        &self,
        kid: &str,
        merged: &PlatformRecord,
        identity_changed: bool,
    ) -> Result<(), Error> {
        if identity_changed {
            self.keys
                .retag_pair(kid, &merged.url, &merged.client_id)
                .await?;
        }
        self.storage.update_platform(kid, merged).await?;
        Ok(())
    }

    /// Deletes the platform registered under (url, client id), cascading to
    /// its status and key records. Succeeds as a no-op when no such platform
    /// exists.
    pub async fn delete_platform(&self, url: &str, client_id: &str) -> Result<(), Error> {
        if url.is_empty() || client_id.is_empty() {
            return Err(Error::MissingParameters);
        }
        if let Some(platform) = self.get_platform(url, client_id).await? {
            platform.delete().await?;
        }
        Ok(())
    }

    /// Deletes a platform by its key id. Succeeds as a no-op for unknown ids.
    pub async fn delete_platform_by_id(&self, kid: &str) -> Result<(), Error> {
        if kid.is_empty() {
            return Err(Error::MissingId);
        }
        if let Some(platform) = self.get_platform_by_id(kid).await? {
            platform.delete().await?;
        }
        Ok(())
    }
}
