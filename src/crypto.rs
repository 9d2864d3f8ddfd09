//! Per-file symmetric encryption.
//!
//! Every uploaded file gets its own random AES-256-GCM key. The blob written
//! to object storage is `nonce || ciphertext || tag`; the key lives in the
//! file's metadata row, optionally sealed under a server master key.

use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const KEY_LEN: usize = 32;
const FILE_ID_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Random number generation failed")]
    Random,
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Ciphertext is malformed or was not produced with this key")]
    Decrypt,
    #[error("Encryption failed")]
    Encrypt,
}

/// A 256-bit symmetric key.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| CryptoError::Random)?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "expected {KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn aead_key(&self) -> Result<LessSafeKey, CryptoError> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.0)
            .map_err(|_| CryptoError::InvalidKey("rejected by cipher".to_string()))?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// How a per-file key is persisted in the metadata row.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum StoredKey {
    /// Base64 of the raw key.
    Plain(String),
    /// Base64 of the key sealed under the server master key.
    Wrapped(String),
}

impl std::fmt::Debug for StoredKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoredKey::Plain(_) => f.write_str("StoredKey::Plain(<redacted>)"),
            StoredKey::Wrapped(_) => f.write_str("StoredKey::Wrapped(<redacted>)"),
        }
    }
}

impl StoredKey {
    /// Prepare `key` for storage, sealing it when a master key is available.
    pub fn seal(key: &EncryptionKey, master: Option<&EncryptionKey>) -> Result<Self, CryptoError> {
        match master {
            Some(master) => {
                let sealed = encrypt_with(master, key.as_bytes())?;
                Ok(StoredKey::Wrapped(
                    base64::engine::general_purpose::STANDARD.encode(sealed),
                ))
            }
            None => Ok(StoredKey::Plain(key.to_base64())),
        }
    }

    /// Recover the per-file key. Wrapped keys need the same master key they were sealed with.
    pub fn open(&self, master: Option<&EncryptionKey>) -> Result<EncryptionKey, CryptoError> {
        match self {
            StoredKey::Plain(encoded) => EncryptionKey::from_base64(encoded),
            StoredKey::Wrapped(encoded) => {
                let master = master.ok_or_else(|| {
                    CryptoError::InvalidKey("key is wrapped but no master key is configured".into())
                })?;
                let sealed = base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
                let raw = decrypt(&sealed, master)?;
                EncryptionKey::from_bytes(&raw)
            }
        }
    }
}

/// Encrypt `plaintext` under a freshly generated key.
pub fn encrypt(plaintext: &[u8]) -> Result<(Vec<u8>, EncryptionKey), CryptoError> {
    let key = EncryptionKey::generate()?;
    let ciphertext = encrypt_with(&key, plaintext)?;
    Ok((ciphertext, key))
}

/// Encrypt `plaintext` under `key` with a random nonce.
pub fn encrypt_with(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let aead = key.aead_key()?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| CryptoError::Random)?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.to_vec();
    aead.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::Encrypt)?;

    let mut out = Vec::with_capacity(NONCE_LEN + in_out.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&in_out);
    Ok(out)
}

pub fn decrypt(ciphertext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < NONCE_LEN + AES_256_GCM.tag_len() {
        return Err(CryptoError::Decrypt);
    }

    let aead = key.aead_key()?;
    let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| CryptoError::Decrypt)?;

    let mut in_out = sealed.to_vec();
    let plaintext_len = aead
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::Decrypt)?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}

/// Random storage name: 128 random bits as hex, plus the original extension if it has one.
pub fn random_file_name(original_name: &str) -> Result<String, CryptoError> {
    let mut id = [0u8; FILE_ID_LEN];
    SystemRandom::new()
        .fill(&mut id)
        .map_err(|_| CryptoError::Random)?;
    let id = hex::encode(id);

    match file_extension(original_name) {
        Some(ext) => Ok(format!("{id}.{ext}")),
        None => Ok(id),
    }
}

/// Lowercased ASCII-alphanumeric extension, if any. Dotfiles have no extension.
fn file_extension(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    let ext: String = ext
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    (!ext.is_empty()).then_some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("notes.PDF"), Some("pdf".to_string()));
        assert_eq!(file_extension("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(file_extension("README"), None);
        assert_eq!(file_extension(".bashrc"), None);
        assert_eq!(file_extension("dir.d/file"), None);
        assert_eq!(file_extension("weird.p$d/f"), None);
        assert_eq!(file_extension("weird.p$df"), Some("pdf".to_string()));
        assert_eq!(file_extension("trailing."), None);
    }

    #[test]
    fn test_debug_redacts_keys() {
        let key = EncryptionKey::generate().unwrap();
        let printed = format!("{key:?} {:?}", StoredKey::seal(&key, None).unwrap());
        assert!(!printed.contains(&key.to_base64()));
        assert!(printed.contains("redacted"));
    }
}
