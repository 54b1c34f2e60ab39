//! AES-256-GCM sealing of history text with a key persisted beside the store.

use crate::error::{Result, TransflowError};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

const NONCE_LEN: usize = 12;

/// Encrypts single text values as `base64(nonce):base64(ciphertext)`.
pub struct EntryCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for EntryCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryCipher").finish_non_exhaustive()
    }
}

impl EntryCipher {
    /// Fresh random key, not persisted anywhere.
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    pub fn from_key(key: &[u8]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| TransflowError::Crypto(format!("expected a 32 byte key, got {}", key.len())))?;
        Ok(Self { cipher })
    }

    /// Load the key at `path`, creating it on first use.
    ///
    /// The key must outlive the process, otherwise everything encrypted in an
    /// earlier run becomes unreadable. A new key file is created exclusively
    /// and owner-only, so a key written by another process is never replaced.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let mut file = match create_private(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Self::load(path),
            Err(e) => return Err(e.into()),
        };

        let key = Aes256Gcm::generate_key(OsRng);
        file.write_all(STANDARD.encode(key.as_slice()).as_bytes())?;
        file.sync_all()?;
        info!("Created history key at {}", path.display());

        Ok(Self {
            cipher: Aes256Gcm::new(&key),
        })
    }

    /// Load an existing key file.
    pub fn load(path: &Path) -> Result<Self> {
        let encoded = fs::read_to_string(path)?;
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| TransflowError::Crypto(format!("{}: {}", path.display(), e)))?;
        Self::from_key(&key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| TransflowError::Crypto(e.to_string()))?;

        Ok(format!(
            "{}:{}",
            STANDARD.encode(nonce.as_slice()),
            STANDARD.encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, sealed: &str) -> Result<String> {
        let (nonce, ciphertext) = sealed
            .split_once(':')
            .ok_or_else(|| TransflowError::Crypto("missing nonce separator".to_string()))?;

        let nonce = STANDARD
            .decode(nonce)
            .map_err(|e| TransflowError::Crypto(e.to_string()))?;
        if nonce.len() != NONCE_LEN {
            return Err(TransflowError::Crypto(format!(
                "nonce must be {} bytes, got {}",
                NONCE_LEN,
                nonce.len()
            )));
        }
        let ciphertext = STANDARD
            .decode(ciphertext)
            .map_err(|e| TransflowError::Crypto(e.to_string()))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|e| TransflowError::Crypto(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| TransflowError::Crypto(e.to_string()))
    }
}

fn create_private(path: &Path) -> io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}
