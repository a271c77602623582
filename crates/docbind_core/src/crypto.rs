//! Field-level encryption using AES-256-GCM.
//!
//! Each encrypted value gets its own key, derived with HKDF-SHA256 from the
//! connection passphrase and a random salt, and its own random nonce. The
//! stored form is:
//!
//! ```text
//! base64( salt (16 bytes) || nonce (12 bytes) || ciphertext || tag (16 bytes) )
//! ```
//!
//! Equal cleartexts therefore never produce equal ciphertexts.

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::schema::Schema;
use aes_gcm::{
    aead::{Aead, KeyInit, generic_array::GenericArray},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use docbind_codec::{Document, Value, ValueExt};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the per-value salt in bytes.
pub const SALT_SIZE: usize = 16;
/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

const KEY_INFO: &[u8] = b"docbind-field-key-v1";

/// A derived AES-256 key.
///
/// Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Derives a key from a passphrase and a salt using HKDF-SHA256.
    pub fn derive_from_passphrase(passphrase: &[u8], salt: &[u8]) -> CoreResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(salt), passphrase);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(KEY_INFO, &mut bytes)
            .map_err(|_| CoreError::encryption_failed("HKDF expand failed"))?;

        Ok(Self { bytes })
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(GenericArray::from_slice(&self.bytes))
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypts and decrypts text values with a connection passphrase.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct FieldCipher {
    passphrase: Vec<u8>,
}

impl FieldCipher {
    /// Creates a cipher for `passphrase`.
    #[must_use]
    pub fn new(passphrase: impl AsRef<[u8]>) -> Self {
        Self {
            passphrase: passphrase.as_ref().to_vec(),
        }
    }

    /// Encrypts a text value into its stored form.
    pub fn encrypt_str(&self, plaintext: &str) -> CoreResult<String> {
        let mut rng = rand::thread_rng();
        let mut salt = [0u8; SALT_SIZE];
        rng.fill_bytes(&mut salt);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut nonce_bytes);

        let key = EncryptionKey::derive_from_passphrase(&self.passphrase, &salt)?;
        let ciphertext = key
            .cipher()
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CoreError::encryption_failed("encryption error"))?;

        let mut packed = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
        packed.extend_from_slice(&salt);
        packed.extend_from_slice(&nonce_bytes);
        packed.extend(ciphertext);

        Ok(STANDARD.encode(packed))
    }

    /// Decrypts a stored value produced by [`encrypt_str`](Self::encrypt_str).
    ///
    /// # Errors
    ///
    /// [`CoreError::DecryptionFailed`] for malformed input, a wrong passphrase
    /// or tampered data.
    pub fn decrypt_str(&self, stored: &str) -> CoreResult<String> {
        let packed = STANDARD
            .decode(stored)
            .map_err(|_| CoreError::decryption_failed("ciphertext is not base64"))?;
        if packed.len() < SALT_SIZE + NONCE_SIZE + TAG_SIZE {
            return Err(CoreError::decryption_failed("ciphertext too short"));
        }

        let (salt, rest) = packed.split_at(SALT_SIZE);
        let (nonce, encrypted) = rest.split_at(NONCE_SIZE);

        let key = EncryptionKey::derive_from_passphrase(&self.passphrase, salt)?;
        let plaintext = key
            .cipher()
            .decrypt(Nonce::from_slice(nonce), encrypted)
            .map_err(|_| CoreError::decryption_failed("decryption error"))?;

        String::from_utf8(plaintext)
            .map_err(|_| CoreError::decryption_failed("plaintext is not UTF-8"))
    }
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher")
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

/// Encrypts every encrypted field of `doc` that holds a non-null value.
pub fn encrypt_fields(
    doc: &mut Document,
    schema: &Schema,
    cipher: Option<&FieldCipher>,
) -> CoreResult<()> {
    for field in schema.encrypted_fields() {
        let Some(value) = doc.get_mut(field) else { continue };
        let text = match value {
            Value::Null => continue,
            Value::String(text) => text,
            _ => return Err(ValidationError::invalid_type("String", field).into()),
        };
        let cipher = cipher.ok_or(CoreError::EncryptionNotConfigured)?;
        *text = cipher.encrypt_str(text)?;
    }
    Ok(())
}

/// Decrypts every encrypted field of a fetched document.
///
/// Null and empty values are left alone.
pub fn decrypt_fields(
    doc: &mut Document,
    schema: &Schema,
    cipher: Option<&FieldCipher>,
) -> CoreResult<()> {
    for field in schema.encrypted_fields() {
        let Some(value) = doc.get_mut(field) else { continue };
        let text = match value {
            Value::Null => continue,
            Value::String(text) if text.is_empty() => continue,
            Value::String(text) => text,
            other => {
                return Err(CoreError::decryption_failed(format!(
                    "field '{field}' holds {} instead of ciphertext",
                    other.type_name()
                )))
            }
        };
        let cipher = cipher.ok_or(CoreError::EncryptionNotConfigured)?;
        *text = cipher.decrypt_str(text)?;
    }
    Ok(())
}
