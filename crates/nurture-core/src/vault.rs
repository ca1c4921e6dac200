//! Credential vault: AES-256-GCM authenticated encryption of provider secrets
//!
//! Every provider API key and OAuth token is encrypted here before it is
//! handed to storage. Each encryption draws a fresh random 96-bit nonce which
//! is stored alongside the ciphertext and never reused.

use crate::error::{OutreachError, Result};
use aes_gcm::aead::{Aead, AeadCore, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::collections::HashMap;

/// Decrypted provider secrets, e.g. `{"api_key": "..."}` for CRM providers or
/// the OAuth token fields for Gmail
pub type SecretBag = HashMap<String, serde_json::Value>;

pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl CredentialVault {
    /// Create a vault from a raw 256-bit key
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != 32 {
            return Err(OutreachError::Config(format!(
                "vault key must be exactly 32 bytes (256 bits), got {}",
                key.len()
            )));
        }

        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        })
    }

    /// Create a vault from a base64-encoded key, as stored in configuration
    pub fn from_base64(key_b64: &str) -> Result<Self> {
        let key = BASE64
            .decode(key_b64)
            .map_err(|e| OutreachError::Config(format!("vault key is not valid base64: {}", e)))?;
        Self::new(&key)
    }

    /// Encrypt a secret bag; returns base64 (ciphertext, nonce)
    pub fn encrypt(&self, secrets: &SecretBag) -> Result<(String, String)> {
        self.seal(secrets, b"")
    }

    /// Decrypt a secret bag previously produced by [`encrypt`](Self::encrypt)
    pub fn decrypt(&self, ciphertext_b64: &str, nonce_b64: &str) -> Result<SecretBag> {
        self.open(ciphertext_b64, nonce_b64, b"")
    }

    /// Encrypt with the provider id bound as associated data, so a ciphertext
    /// stored for one provider cannot be replayed for another
    pub fn encrypt_for(&self, provider: &str, secrets: &SecretBag) -> Result<(String, String)> {
        self.seal(secrets, provider.as_bytes())
    }

    /// Counterpart of [`encrypt_for`](Self::encrypt_for)
    pub fn decrypt_for(
        &self,
        provider: &str,
        ciphertext_b64: &str,
        nonce_b64: &str,
    ) -> Result<SecretBag> {
        self.open(ciphertext_b64, nonce_b64, provider.as_bytes())
    }

    fn seal(&self, secrets: &SecretBag, aad: &[u8]) -> Result<(String, String)> {
        let plaintext = serde_json::to_vec(secrets)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: &plaintext,
                    aad,
                },
            )
            .map_err(|_| OutreachError::Encryption("encryption failed".to_string()))?;

        Ok((BASE64.encode(ciphertext), BASE64.encode(nonce)))
    }

    fn open(&self, ciphertext_b64: &str, nonce_b64: &str, aad: &[u8]) -> Result<SecretBag> {
        let ciphertext = BASE64.decode(ciphertext_b64).map_err(|e| {
            OutreachError::Encryption(format!("ciphertext is not valid base64: {}", e))
        })?;
        let nonce = BASE64
            .decode(nonce_b64)
            .map_err(|e| OutreachError::Encryption(format!("nonce is not valid base64: {}", e)))?;

        if nonce.len() != 12 {
            return Err(OutreachError::Encryption(format!(
                "nonce must be 12 bytes, got {}",
                nonce.len()
            )));
        }

        // Tag verification failure is a hard error: tampered data or the
        // wrong key must never yield partial plaintext.
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &ciphertext,
                    aad,
                },
            )
            .map_err(|_| {
                OutreachError::Encryption(
                    "authentication tag mismatch: ciphertext tampered or wrong key".to_string(),
                )
            })?;

        Ok(serde_json::from_slice(&plaintext)?)
    }
}

/// Generate a new base64-encoded 256-bit vault key.
/// Run once and store the output as the configured encryption key.
pub fn generate_key() -> String {
    let key = Aes256Gcm::generate_key(&mut OsRng);
    BASE64.encode(key)
}
