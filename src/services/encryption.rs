use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::Engine;

const NONCE_LEN: usize = 12;

/// AES-256-GCM sealing of applicant documents at rest.
///
/// The object key is bound in as associated data, so a blob copied to
/// another key no longer opens.
pub struct DocumentCipher {
    cipher: Aes256Gcm,
}

impl DocumentCipher {
    /// Create from a base64-encoded 32-byte key.
    pub fn new(key_base64: &str) -> Result<Self, CipherError> {
        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(key_base64.trim())
            .map_err(|_| CipherError::InvalidKey)?;

        if key_bytes.len() != 32 {
            return Err(CipherError::InvalidKey);
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes).map_err(|_| CipherError::InvalidKey)?;
        Ok(Self { cipher })
    }

    /// Returns nonce || ciphertext.
    pub fn seal(&self, object_key: &str, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: object_key.as_bytes(),
                },
            )
            .map_err(|_| CipherError::SealFailed)?;

        let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        output.extend_from_slice(&nonce);
        output.extend(ciphertext);
        Ok(output)
    }

    pub fn open(&self, object_key: &str, sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
        if sealed.len() < NONCE_LEN {
            return Err(CipherError::OpenFailed);
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: object_key.as_bytes(),
                },
            )
            .map_err(|_| CipherError::OpenFailed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Invalid encryption key (must be 32 bytes, base64-encoded)")]
    InvalidKey,

    #[error("Encryption failed")]
    SealFailed,

    #[error("Stored document could not be decrypted")]
    OpenFailed,
}
