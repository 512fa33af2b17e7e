//! 令牌存储
//! 持有当前令牌对，落盘前加密；每个进程生命周期内首次访问时解密并缓存

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::crypto::TokenCipher;
use crate::error::{ClientError, Result};
use crate::models::TokenPair;
use crate::storage::KeyValueStore;

/// 令牌在存储中的固定键名
pub const TOKENS_KEY: &str = "tokens";

#[derive(Debug, Clone)]
enum Cached {
    Unloaded,
    Loaded(Option<TokenPair>),
}

/// 令牌存储
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
    cipher: TokenCipher,
    cache: RwLock<Cached>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, cipher: TokenCipher) -> Self {
        Self {
            backend,
            cipher,
            cache: RwLock::new(Cached::Unloaded),
        }
    }

    /// 获取当前令牌对
    ///
    /// 读取失败不会被缓存，下次调用会重新尝试。
    pub async fn get(&self) -> Result<Option<TokenPair>> {
        if let Cached::Loaded(pair) = &*self.cache.read().await {
            return Ok(pair.clone());
        }

        let mut cache = self.cache.write().await;
        if let Cached::Loaded(pair) = &*cache {
            return Ok(pair.clone());
        }

        let pair = self.load().await?;
        debug!(present = pair.is_some(), "Token cache loaded");
        *cache = Cached::Loaded(pair.clone());
        Ok(pair)
    }

    async fn load(&self) -> Result<Option<TokenPair>> {
        let Some(blob) = self.backend.get(TOKENS_KEY).await? else {
            return Ok(None);
        };

        let json = self
            .cipher
            .decrypt(&blob)
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        let pair = serde_json::from_str(&json)
            .map_err(|e| ClientError::Storage(format!("Corrupt token blob: {e}")))?;
        Ok(Some(pair))
    }

    /// 覆盖当前令牌对并持久化
    ///
    /// 内存缓存总是先更新；持久化失败时返回错误，但本进程内仍可使用新令牌。
    pub async fn set(&self, pair: TokenPair) -> Result<()> {
        let json = serde_json::to_string(&pair)
            .map_err(|e| ClientError::Storage(format!("Failed to encode tokens: {e}")))?;
        let blob = self.cipher.encrypt(&json)?;

        let mut cache = self.cache.write().await;
        *cache = Cached::Loaded(Some(pair));
        self.backend.set(TOKENS_KEY, &blob).await
    }

    /// 清除内存与持久化中的令牌
    pub async fn clear(&self) -> Result<()> {
        let mut cache = self.cache.write().await;
        *cache = Cached::Loaded(None);
        self.backend.remove(TOKENS_KEY).await
    }

    /// 当前访问令牌；存储错误按"无凭证"处理
    pub async fn access_token(&self) -> Option<String> {
        match self.get().await {
            Ok(pair) => pair.map(|p| p.access.token),
            Err(e) => {
                warn!(error = %e, "Token storage unavailable, continuing unauthenticated");
                None
            }
        }
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}
