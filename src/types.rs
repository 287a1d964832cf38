//! Domain records shared across the registry, storage and token modules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// How inbound messages from a platform are cryptographically verified.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMethod {
    /// RSA public key provided by the platform.
    #[serde(rename = "RSA_KEY")]
    RsaKey,
    /// Raw JWK provided by the platform.
    #[serde(rename = "JWK_KEY")]
    JwkKey,
    /// URL of the platform's JWK set.
    #[serde(rename = "JWK_SET")]
    JwkSet,
}

impl AuthMethod {
    /// Wire name used in stored records and external configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::RsaKey => "RSA_KEY",
            AuthMethod::JwkKey => "JWK_KEY",
            AuthMethod::JwkSet => "JWK_SET",
        }
    }
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuthMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RSA_KEY" => Ok(AuthMethod::RsaKey),
            "JWK_KEY" => Ok(AuthMethod::JwkKey),
            "JWK_SET" => Ok(AuthMethod::JwkSet),
            other => Err(Error::InvalidAuthMethod(other.to_string())),
        }
    }
}

/// Verification configuration for a registered platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Verification method.
    pub method: AuthMethod,
    /// RSA public key, JWK, or JWK set address depending on `method`.
    pub key: String,
}

/// Identity record of a registered platform.
///
/// `kid` is assigned at registration and never changes; every satellite
/// record (key pair, status) references the platform through it. The
/// (`url`, `client_id`) pair is unique across live records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformRecord {
    /// Key id of the key pair generated for this platform.
    pub kid: String,
    /// Platform issuer url.
    pub url: String,
    /// Client id assigned by the platform.
    pub client_id: String,
    /// Display name.
    pub name: String,
    /// Endpoint used to authenticate within the platform.
    pub authentication_endpoint: String,
    /// Endpoint used to obtain access tokens from the platform.
    pub access_token_endpoint: String,
    /// Message verification configuration.
    pub auth_config: AuthConfig,
}

/// Which half of a platform's key pair a record belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Public,
    Private,
}

/// Stored half of a platform's key pair.
///
/// Tagged with the owning platform's (`url`, `client_id`) pair so the tag can
/// follow identity changes; the material itself is never regenerated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub kid: String,
    pub platform_url: String,
    pub client_id: String,
    /// PEM or JWK text.
    pub key: String,
}

/// Activation flag for a platform. A missing record means active.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub kid: String,
    pub active: bool,
}

/// Bearer token minted by a platform's token endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    /// Authorization scheme name, e.g. "Bearer".
    pub token_type: String,
    /// Token lifetime in seconds.
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Cached access token for one (platform, scope string) combination.
///
/// Replaced wholesale on refresh, never merged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenRecord {
    pub platform_url: String,
    pub client_id: String,
    /// Literal scope string the token was requested with. Ordering matters:
    /// differently-ordered scope lists are distinct cache entries.
    pub scopes: String,
    pub token: AccessToken,
    pub created_at: DateTime<Utc>,
}

impl AccessTokenRecord {
    /// Whether the cached token has outlived its `expires_in` window.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        (now - self.created_at).num_seconds() > self.token.expires_in
    }
}

/// Read-only projection of a platform: identity fields, public key and
/// activation status.
#[derive(Clone, Debug, Serialize)]
pub struct PlatformSnapshot {
    pub id: String,
    pub url: String,
    pub client_id: String,
    pub name: String,
    pub authentication_endpoint: String,
    pub access_token_endpoint: String,
    pub auth_config: AuthConfig,
    pub public_key: String,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_auth_method_parse() {
        assert_eq!("RSA_KEY".parse::<AuthMethod>().unwrap(), AuthMethod::RsaKey);
        assert_eq!("JWK_KEY".parse::<AuthMethod>().unwrap(), AuthMethod::JwkKey);
        assert_eq!("JWK_SET".parse::<AuthMethod>().unwrap(), AuthMethod::JwkSet);

        let err = "PSK".parse::<AuthMethod>().unwrap_err();
        assert!(matches!(err, Error::InvalidAuthMethod(ref m) if m == "PSK"));
    }

    #[test]
    fn test_auth_method_wire_names() {
        let json = serde_json::to_string(&AuthMethod::JwkSet).unwrap();
        assert_eq!(json, "\"JWK_SET\"");

        let parsed: AuthMethod = serde_json::from_str("\"RSA_KEY\"").unwrap();
        assert_eq!(parsed, AuthMethod::RsaKey);
    }

    fn token_record(created_at: DateTime<Utc>, expires_in: i64) -> AccessTokenRecord {
        AccessTokenRecord {
            platform_url: "https://lms.example".to_string(),
            client_id: "abc".to_string(),
            scopes: "read".to_string(),
            token: AccessToken {
                access_token: "tok".to_string(),
                token_type: "bearer".to_string(),
                expires_in,
                scope: None,
            },
            created_at,
        }
    }

    #[test]
    fn test_token_staleness_boundary() {
        let now = Utc::now();
        let record = token_record(now - Duration::seconds(1000), 3600);
        assert!(!record.is_stale(now));

        let record = token_record(now - Duration::seconds(3700), 3600);
        assert!(record.is_stale(now));

        // Exactly at the limit is still fresh; staleness is strictly greater.
        let record = token_record(now - Duration::seconds(3600), 3600);
        assert!(!record.is_stale(now));
    }

    #[test]
    fn test_access_token_optional_scope() {
        let json = r#"{"access_token":"tok","token_type":"bearer","expires_in":3600}"#;
        let token: AccessToken = serde_json::from_str(json).unwrap();
        assert_eq!(token.scope, None);
        assert_eq!(token.expires_in, 3600);
    }
}
