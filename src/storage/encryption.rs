//! AES-256-GCM helpers for values kept encrypted at rest.
//!
//! The SQLite backend runs platform key material and cached token payloads
//! through these before they touch disk. Every value gets its own random
//! nonce, stored alongside the ciphertext.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Master key size in bytes (256 bits).
const KEY_SIZE: usize = 32;

/// Nonce size in bytes (96 bits, standard for GCM).
const NONCE_SIZE: usize = 12;

/// Decodes and length-checks a base64-encoded master key.
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>> {
    let key_bytes = BASE64
        .decode(key_base64)
        .context("Failed to decode base64 encryption key")?;

    if key_bytes.len() != KEY_SIZE {
        return Err(anyhow!(
            "Encryption key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key_bytes.len()
        ));
    }

    Ok(key_bytes)
}

/// Encrypts a value with a fresh random nonce.
///
/// Returns `(ciphertext, nonce)`, both base64-encoded for storage in text
/// columns.
pub fn encrypt(plaintext: &str, key: &[u8]) -> Result<(String, String)> {
    if key.len() != KEY_SIZE {
        return Err(anyhow!("Encryption key must be {} bytes", KEY_SIZE));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

    // Nonces must never repeat under the same key
    let nonce_bytes = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext_bytes = cipher
        .encrypt(&nonce_bytes, plaintext.as_bytes())
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    Ok((BASE64.encode(&ciphertext_bytes), BASE64.encode(nonce_bytes)))
}

/// Decrypts a value stored by [`encrypt`].
///
/// Fails on a wrong key, a mismatched nonce, or tampered ciphertext — GCM is
/// authenticated, so corruption is detected rather than decrypted to garbage.
pub fn decrypt(ciphertext: &str, nonce: &str, key: &[u8]) -> Result<String> {
    if key.len() != KEY_SIZE {
        return Err(anyhow!("Encryption key must be {} bytes", KEY_SIZE));
    }

    let ciphertext_bytes = BASE64
        .decode(ciphertext)
        .context("Failed to decode ciphertext")?;
    let nonce_bytes = BASE64.decode(nonce).context("Failed to decode nonce")?;

    if nonce_bytes.len() != NONCE_SIZE {
        return Err(anyhow!(
            "Invalid nonce size: expected {}, got {}",
            NONCE_SIZE,
            nonce_bytes.len()
        ));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

    let plaintext_bytes = cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext_bytes.as_ref())
        .map_err(|e| anyhow!("Decryption failed (wrong key or corrupted data): {}", e))?;

    String::from_utf8(plaintext_bytes).context("Decrypted data is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation() {
        let valid_key = BASE64.encode([7u8; 32]);
        assert!(validate_key(&valid_key).is_ok());

        assert!(validate_key(&BASE64.encode([0u8; 16])).is_err());
        assert!(validate_key(&BASE64.encode([0u8; 48])).is_err());
        assert!(validate_key("%%% not base64 %%%").is_err());
    }

    #[test]
    fn test_roundtrip() {
        let key = [3u8; 32];
        let pem = "-----BEGIN PUBLIC KEY-----\nMIIBIjAN...\n-----END PUBLIC KEY-----";

        let (ciphertext, nonce) = encrypt(pem, &key).expect("encrypt failed");
        assert_ne!(ciphertext, pem);

        let decrypted = decrypt(&ciphertext, &nonce, &key).expect("decrypt failed");
        assert_eq!(decrypted, pem);
    }

    #[test]
    fn test_nonces_are_unique() {
        let key = [3u8; 32];
        let (c1, n1) = encrypt("same value", &key).unwrap();
        let (c2, n2) = encrypt("same value", &key).unwrap();
        assert_ne!(n1, n2);
        assert_ne!(c1, c2);
    }

    #[test]
    fn test_wrong_key_rejected() {
        let (ciphertext, nonce) = encrypt("secret", &[1u8; 32]).unwrap();
        assert!(decrypt(&ciphertext, &nonce, &[2u8; 32]).is_err());
    }

    #[test]
    fn test_tampering_detected() {
        let key = [3u8; 32];
        let (mut ciphertext, nonce) = encrypt("secret", &key).unwrap();
        ciphertext.replace_range(..1, "A");
        // May coincide with the original first char; force a visible change
        ciphertext.push('B');
        assert!(decrypt(&ciphertext, &nonce, &key).is_err());
    }
}
