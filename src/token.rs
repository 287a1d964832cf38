//! Access token minting.
//!
//! The entity's cache check lives on [`Platform::access_token`]; this module
//! owns the issuer seam and the HTTP issuer that performs the
//! client-credentials exchange against a platform's token endpoint.
//!
//! [`Platform::access_token`]: crate::platform::Platform::access_token

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::error::Error;
use crate::platform::Platform;
use crate::storage::Storage;
use crate::types::{AccessToken, AccessTokenRecord};

/// Token minting collaborator.
///
/// Called when no fresh cached token exists for a (platform, scope string)
/// combination. The issuer is responsible for persisting the replacement
/// [`AccessTokenRecord`] so later calls can hit the cache.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn generate_access_token(
        &self,
        scopes: &str,
        platform: &Platform,
    ) -> Result<AccessToken, Error>;
}

/// Signing material handed to an [`AssertionSigner`].
pub struct AssertionRequest<'a> {
    /// Key id of the signing key pair.
    pub kid: &'a str,
    /// Client id the assertion is issued for.
    pub client_id: &'a str,
    /// Token endpoint the assertion is addressed to.
    pub audience: &'a str,
    /// Private key material, freshly read from the credential store.
    pub private_key: &'a str,
}

/// Produces the signed client assertion (JWT) carried in the token request.
///
/// Signing stays outside this crate; implementations typically wrap a JWT
/// library or a signing service.
#[async_trait]
pub trait AssertionSigner: Send + Sync {
    async fn sign(&self, request: AssertionRequest<'_>) -> Result<String, Error>;
}

/// Token issuer performing the OAuth2 client-credentials exchange over HTTP.
///
/// POSTs a form with a signed JWT assertion to the platform's access token
/// endpoint, persists the minted token, and returns it.
pub struct HttpTokenIssuer {
    http: reqwest::Client,
    storage: Arc<dyn Storage>,
    signer: Arc<dyn AssertionSigner>,
}

impl HttpTokenIssuer {
    pub fn new(storage: Arc<dyn Storage>, signer: Arc<dyn AssertionSigner>) -> Self {
        Self {
            http: reqwest::Client::new(),
            storage,
            signer,
        }
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn generate_access_token(
        &self,
        scopes: &str,
        platform: &Platform,
    ) -> Result<AccessToken, Error> {
        let private_key = platform.private_key().await?;
        let endpoint = platform.access_token_endpoint().to_string();

        let assertion = self
            .signer
            .sign(AssertionRequest {
                kid: platform.kid(),
                client_id: platform.client_id(),
                audience: &endpoint,
                private_key: &private_key,
            })
            .await?;

        let form = [
            ("grant_type", "client_credentials"),
            (
                "client_assertion_type",
                "urn:ietf:params:oauth:client-assertion-type:jwt-bearer",
            ),
            ("client_assertion", assertion.as_str()),
            ("scope", scopes),
        ];

        debug!(endpoint = %endpoint, scopes, "requesting access token");

        let response = self
            .http
            .post(&endpoint)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::TokenEndpoint(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(Error::TokenEndpoint(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: AccessToken = response
            .json()
            .await
            .map_err(|e| Error::TokenEndpoint(format!("invalid token response: {}", e)))?;

        let record = AccessTokenRecord {
            platform_url: platform.url().to_string(),
            client_id: platform.client_id().to_string(),
            scopes: scopes.to_string(),
            token: token.clone(),
            created_at: Utc::now(),
        };
        self.storage.put_access_token(&record).await?;

        debug!(
            url = %record.platform_url,
            scopes,
            expires_in = token.expires_in,
            "access token minted and cached"
        );

        Ok(token)
    }
}

/// Uppercases the first character of an authorization scheme name, the
/// canonical form for an `Authorization` header ("bearer" -> "Bearer").
pub(crate) fn capitalize_scheme(scheme: &str) -> String {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalize_scheme() {
        assert_eq!(capitalize_scheme("bearer"), "Bearer");
        assert_eq!(capitalize_scheme("Bearer"), "Bearer");
        assert_eq!(capitalize_scheme("dpop"), "Dpop");
        assert_eq!(capitalize_scheme(""), "");
    }
}
