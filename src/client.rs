//! 客户端组装
//! 启动时构建一次，持有令牌存储、刷新协调器、请求网关与会话接口

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::ClientConfig;
use crate::coordinator::{HttpRefresher, RefreshCoordinator, TokenRefresher};
use crate::crypto::TokenCipher;
use crate::error::Result;
use crate::events::{SessionEvent, SessionEvents};
use crate::gate::RequestGate;
use crate::loading::LoadingTracker;
use crate::session::SessionApi;
use crate::storage::{FileStore, KeyValueStore};
use crate::token_store::TokenStore;

/// 应用客户端
pub struct JeeClient {
    config: ClientConfig,
    tokens: Arc<TokenStore>,
    events: SessionEvents,
    gate: Arc<RequestGate>,
    session: SessionApi,
}

impl JeeClient {
    /// 使用配置中的本地目录作为持久化存储
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let backend: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&config.storage.dir));
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: ClientConfig, backend: Arc<dyn KeyValueStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let loading = LoadingTracker::new(config.auth.loading_paths.clone());
        let refresher: Arc<dyn TokenRefresher> = Arc::new(HttpRefresher::new(
            http.clone(),
            &config.api.base_url,
            &config.auth.refresh_path,
            loading.clone(),
        )?);
        Self::assemble(config, backend, http, refresher, loading)
    }

    /// 指定刷新实现（例如接入其他身份服务）
    pub fn with_refresher(
        config: ClientConfig,
        backend: Arc<dyn KeyValueStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let loading = LoadingTracker::new(config.auth.loading_paths.clone());
        Self::assemble(config, backend, http, refresher, loading)
    }

    fn assemble(
        config: ClientConfig,
        backend: Arc<dyn KeyValueStore>,
        http: reqwest::Client,
        refresher: Arc<dyn TokenRefresher>,
        loading: LoadingTracker,
    ) -> Result<Self> {
        let cipher = TokenCipher::from_passphrase(&config.storage.encryption_key)?;
        let tokens = Arc::new(TokenStore::new(backend.clone(), cipher));
        let events = SessionEvents::default();

        let coordinator = RefreshCoordinator::new(
            tokens.clone(),
            backend.clone(),
            refresher,
            events.clone(),
            config.refresh_timeout(),
        );
        let gate = Arc::new(RequestGate::new(
            http,
            &config,
            tokens.clone(),
            coordinator,
            loading,
        ));
        let session = SessionApi::new(gate.clone(), tokens.clone(), backend, events.clone());

        tracing::debug!(base_url = %config.api.base_url, "Client initialized");

        Ok(Self {
            config,
            tokens,
            events,
            gate,
            session,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    pub fn session(&self) -> &SessionApi {
        &self.session
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// 订阅会话事件（刷新成功、会话过期、登出等）
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
