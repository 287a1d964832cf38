use crate::storage::StorageError;

/// Errors surfaced by registry and platform operations.
///
/// Validation variants are returned before any storage I/O is attempted.
/// `Storage` wraps the underlying backend failure without altering it, so
/// callers can still reach the original error through `source()`.
#[derive(Debug)]
pub enum Error {
    /// No platform url was supplied to a lookup.
    MissingUrl,
    /// No platform id (kid) was supplied.
    MissingId,
    /// A required registration parameter (url, client id, name, endpoint or
    /// auth configuration) is absent.
    MissingParameters,
    /// An auth configuration was supplied without verification key material.
    MissingAuthKey,
    /// The auth method is not one of RSA_KEY, JWK_KEY, JWK_SET.
    InvalidAuthMethod(String),
    /// An update was requested without any fields to change.
    MissingPlatformInfo,
    /// The target (url, client id) pair is already occupied by another
    /// registered platform.
    IdentityConflict { url: String, client_id: String },
    /// No key record exists for the given kid.
    KeyNotFound(String),
    /// The key-pair generator collaborator failed.
    KeyGeneration(String),
    /// The storage backend failed.
    Storage(StorageError),
    /// The platform token endpoint rejected the request or was unreachable.
    TokenEndpoint(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MissingUrl => write!(f, "Platform url not provided"),
            Error::MissingId => write!(f, "Platform id not provided"),
            Error::MissingParameters => {
                write!(f, "Missing required platform registration parameters")
            }
            Error::MissingAuthKey => write!(f, "Auth configuration key not provided"),
            Error::InvalidAuthMethod(method) => write!(
                f,
                "Invalid auth method '{}' (valid methods are RSA_KEY, JWK_KEY, JWK_SET)",
                method
            ),
            Error::MissingPlatformInfo => write!(f, "No platform update information provided"),
            Error::IdentityConflict { url, client_id } => write!(
                f,
                "A platform with url '{}' and client id '{}' is already registered",
                url, client_id
            ),
            Error::KeyNotFound(kid) => write!(f, "No key record found for kid '{}'", kid),
            Error::KeyGeneration(detail) => write!(f, "Key pair generation failed: {}", detail),
            Error::Storage(err) => write!(f, "Storage operation failed: {}", err),
            Error::TokenEndpoint(detail) => write!(f, "Access token request failed: {}", detail),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Error::Storage(err)
    }
}
