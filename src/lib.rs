// Error types
pub mod error;

// Domain records shared across modules
pub mod types;

// Storage contract and backends
pub mod storage;

// Key pair records and generator seam
pub mod keys;

// Registry operations
pub mod registry;

// Platform entity
pub mod platform;

// Access token minting
pub mod token;

pub use error::Error;
pub use keys::{GeneratedKeyPair, KeyPairGenerator, Keychain};
pub use platform::Platform;
pub use registry::{AuthConfigPatch, PlatformPatch, PlatformRegistry, Registration};
pub use storage::{MemoryStore, SqliteStore, Storage, StorageError};
pub use token::{AssertionRequest, AssertionSigner, HttpTokenIssuer, TokenIssuer};
pub use types::{
    AccessToken, AccessTokenRecord, AuthConfig, AuthMethod, KeyKind, KeyRecord, PlatformRecord,
    PlatformSnapshot, StatusRecord,
};
