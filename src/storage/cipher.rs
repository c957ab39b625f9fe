//! Authenticated encryption for the history file.
//!
//! Key: HKDF-SHA256 over the configured secret with a random per-file salt.
//! Cipher: XChaCha20-Poly1305, fresh random 24-byte nonce on every seal, the
//! envelope version bound as associated data.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{FluxError, Result};

pub const ENVELOPE_VERSION: u32 = 1;
pub const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const KEY_INFO: &[u8] = b"fluxgen-history-v1";
const KDF_NAME: &str = "hkdf-sha256";
const CIPHER_NAME: &str = "xchacha20poly1305";

/// On-disk JSON wrapper around the ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedEnvelope {
    pub version: u32,
    pub kdf: String,
    pub cipher: String,
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
}

impl SealedEnvelope {
    pub fn salt_bytes(&self) -> Result<[u8; SALT_LEN]> {
        decode_fixed::<SALT_LEN>(&self.salt, "salt")
    }
}

pub struct HistoryCipher {
    cipher: XChaCha20Poly1305,
    salt: [u8; SALT_LEN],
}

impl HistoryCipher {
    pub fn new(secret: &str, salt: [u8; SALT_LEN]) -> Result<Self> {
        if secret.is_empty() {
            return Err(FluxError::Config("history secret cannot be empty".into()));
        }

        let hk = Hkdf::<Sha256>::new(Some(&salt), secret.as_bytes());
        let mut key = [0u8; 32];
        hk.expand(KEY_INFO, &mut key)
            .map_err(|e| FluxError::Internal(format!("key derivation failed: {}", e)))?;

        Ok(Self {
            cipher: XChaCha20Poly1305::new(Key::from_slice(&key)),
            salt,
        })
    }

    pub fn random_salt() -> [u8; SALT_LEN] {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        salt
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedEnvelope> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let aad = ENVELOPE_VERSION.to_be_bytes();

        let ciphertext = self
            .cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| FluxError::StoreUnavailable("encryption failed".into()))?;

        Ok(SealedEnvelope {
            version: ENVELOPE_VERSION,
            kdf: KDF_NAME.to_string(),
            cipher: CIPHER_NAME.to_string(),
            salt: STANDARD.encode(self.salt),
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
        })
    }

    pub fn open(&self, envelope: &SealedEnvelope) -> Result<Vec<u8>> {
        if envelope.version != ENVELOPE_VERSION
            || envelope.kdf != KDF_NAME
            || envelope.cipher != CIPHER_NAME
        {
            return Err(FluxError::StoreUnavailable(format!(
                "unsupported history format (version {}, {}, {})",
                envelope.version, envelope.kdf, envelope.cipher
            )));
        }

        let nonce = decode_fixed::<NONCE_LEN>(&envelope.nonce, "nonce")?;
        let ciphertext = STANDARD
            .decode(&envelope.ciphertext)
            .map_err(|e| FluxError::StoreUnavailable(format!("corrupt ciphertext: {}", e)))?;
        let aad = envelope.version.to_be_bytes();

        self.cipher
            .decrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: &ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| {
                FluxError::StoreUnavailable(
                    "history could not be decrypted (wrong key or corrupted file)".into(),
                )
            })
    }
}

fn decode_fixed<const N: usize>(encoded: &str, what: &str) -> Result<[u8; N]> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| FluxError::StoreUnavailable(format!("corrupt {}: {}", what, e)))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        FluxError::StoreUnavailable(format!(
            "corrupt {}: expected {} bytes, found {}",
            what,
            N,
            bytes.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_then_open() {
        let cipher = HistoryCipher::new("correct horse", HistoryCipher::random_salt()).unwrap();
        let envelope = cipher.seal(b"a watercolor fox").unwrap();
        assert_eq!(cipher.open(&envelope).unwrap(), b"a watercolor fox");
    }

    #[test]
    fn test_nonce_changes_per_seal() {
        let cipher = HistoryCipher::new("secret", [7u8; SALT_LEN]).unwrap();
        let a = cipher.seal(b"same").unwrap();
        let b = cipher.seal(b"same").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_key_is_store_unavailable() {
        let salt = HistoryCipher::random_salt();
        let envelope = HistoryCipher::new("right", salt).unwrap().seal(b"data").unwrap();
        let err = HistoryCipher::new("wrong", salt).unwrap().open(&envelope).unwrap_err();
        assert!(matches!(err, FluxError::StoreUnavailable(_)));
    }

    #[test]
    fn test_tampered_ciphertext_is_rejected() {
        let cipher = HistoryCipher::new("secret", HistoryCipher::random_salt()).unwrap();
        let mut envelope = cipher.seal(b"data").unwrap();
        let mut raw = STANDARD.decode(&envelope.ciphertext).unwrap();
        raw[0] ^= 0x01;
        envelope.ciphertext = STANDARD.encode(raw);
        assert!(matches!(
            cipher.open(&envelope),
            Err(FluxError::StoreUnavailable(_))
        ));
    }

    #[test]
    fn test_version_is_authenticated() {
        let cipher = HistoryCipher::new("secret", HistoryCipher::random_salt()).unwrap();
        let mut envelope = cipher.seal(b"data").unwrap();
        envelope.version = 2;
        assert!(cipher.open(&envelope).is_err());
    }

    #[test]
    fn test_empty_secret_is_config_error() {
        assert!(matches!(
            HistoryCipher::new("", [0u8; SALT_LEN]),
            Err(FluxError::Config(_))
        ));
    }

    #[test]
    fn test_salt_round_trip() {
        let salt = HistoryCipher::random_salt();
        let envelope = HistoryCipher::new("secret", salt).unwrap().seal(b"x").unwrap();
        assert_eq!(envelope.salt_bytes().unwrap(), salt);
    }
}
