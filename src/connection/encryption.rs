//! AES-256-GCM sealing for stored tokens.
//!
//! Each token is sealed into a single opaque blob: a fresh 12-byte nonce
//! followed by the ciphertext, base64-encoded for storage. The master key
//! is 32 bytes (256 bits) and comes from an environment variable.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Validates that the master key is exactly 32 bytes when base64 decoded.
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

/// Seals a token into a base64 blob (nonce || ciphertext).
///
/// A fresh random nonce is generated per call, so sealing the same token
/// twice yields different blobs.
pub fn seal(plaintext: &str, key: &[u8]) -> Result<String> {
    if key.len() != KEY_SIZE {
        return Err(anyhow!("Encryption key must be {} bytes", KEY_SIZE));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    let mut blob = nonce.to_vec();
    blob.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(blob))
}

/// Opens a blob produced by [`seal`].
///
/// Fails if the key is wrong, the blob was tampered with, or the blob is
/// too short to contain a nonce.
pub fn open(blob: &str, key: &[u8]) -> Result<String> {
    if key.len() != KEY_SIZE {
        return Err(anyhow!("Encryption key must be {} bytes", KEY_SIZE));
    }

    let blob_bytes = BASE64.decode(blob).context("Failed to decode sealed token")?;

    if blob_bytes.len() <= NONCE_SIZE {
        return Err(anyhow!(
            "Sealed token too short: expected more than {} bytes, got {}",
            NONCE_SIZE,
            blob_bytes.len()
        ));
    }

    let (nonce_bytes, ciphertext) = blob_bytes.split_at(NONCE_SIZE);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| anyhow!("Decryption failed (wrong key or corrupted data): {}", e))?;

    String::from_utf8(plaintext).context("Decrypted token is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation() {
        let valid_key = BASE64.encode([0u8; 32]);
        assert!(validate_key(&valid_key).is_ok());

        let short_key = BASE64.encode([0u8; 16]);
        assert!(validate_key(&short_key).is_err());

        let long_key = BASE64.encode([0u8; 64]);
        assert!(validate_key(&long_key).is_err());

        assert!(validate_key("not-valid-base64!@#$").is_err());
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = [0u8; 32];
        let token = "ya29.a0-access-token-12345";

        let blob = seal(token, &key).expect("Sealing failed");
        assert_ne!(blob, token);

        let opened = open(&blob, &key).expect("Opening failed");
        assert_eq!(opened, token);
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let key = [0u8; 32];
        let token = "same-token";

        let blob1 = seal(token, &key).unwrap();
        let blob2 = seal(token, &key).unwrap();

        // Random nonces make the blobs differ even for identical input
        assert_ne!(blob1, blob2);
        assert_eq!(open(&blob1, &key).unwrap(), token);
        assert_eq!(open(&blob2, &key).unwrap(), token);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = [0u8; 32];
        let key2 = [1u8; 32];

        let blob = seal("secret", &key1).unwrap();
        assert!(open(&blob, &key2).is_err());
    }

    #[test]
    fn test_tampered_blob_fails() {
        let key = [0u8; 32];

        let blob = seal("secret", &key).unwrap();
        let mut bytes = BASE64.decode(&blob).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let tampered = BASE64.encode(bytes);

        assert!(open(&tampered, &key).is_err());
    }

    #[test]
    fn test_truncated_blob_fails() {
        let key = [0u8; 32];

        // A blob shorter than the nonce cannot be opened
        let truncated = BASE64.encode([0u8; 8]);
        assert!(open(&truncated, &key).is_err());
    }
}
