//! 本地令牌加密
//! AES-256-GCM，密钥由配置口令经 SHA-256 派生；密文格式为 base64(nonce || ciphertext)

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::Engine as _;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};

use crate::error::{ClientError, Result};

const NONCE_LEN: usize = 12;

/// 令牌加解密器
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// 从口令创建加密器
    pub fn from_passphrase(passphrase: &Secret<String>) -> Result<Self> {
        let key = Sha256::digest(passphrase.expose_secret().as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| ClientError::Crypto(format!("Failed to init AES cipher: {e}")))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| ClientError::Crypto(format!("Encryption failed: {e}")))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);

        Ok(base64::engine::general_purpose::STANDARD.encode(&combined))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let combined = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| ClientError::Crypto(format!("Invalid base64: {e}")))?;

        if combined.len() < NONCE_LEN {
            return Err(ClientError::Crypto("Ciphertext too short".into()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| ClientError::Crypto(format!("Decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| ClientError::Crypto(format!("Invalid UTF-8 after decrypt: {e}")))
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}
