//! 令牌刷新协调器
//!
//! 同一时刻最多只有一次刷新令牌交换在进行。交换期间收到 401 的其他请求
//! 排入 FIFO 队列，交换成功后按入队顺序拿到新的访问令牌，失败则全部被拒绝。
//!
//! 状态（`refreshing` 标志 + 等待队列）由一把异步互斥锁保护：检查并置位标志、
//! 入队、出队都在持锁期间完成；队列在标志复位之前必然被完全清空。

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::events::{SessionEvent, SessionEvents};
use crate::gate::endpoint_url;
use crate::loading::LoadingTracker;
use crate::models::{ErrorBody, RefreshTokenRequest, RefreshTokenResponse, TokenPair};
use crate::session::USER_KEY;
use crate::storage::KeyValueStore;
use crate::token_store::TokenStore;

/// 刷新令牌交换接口
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenPair>;
}

/// 调用后端刷新接口的实现
///
/// 直接使用底层 HTTP 客户端，不经过 `RequestGate`，避免刷新接口自身触发刷新。
/// 加载计数仍与网关共用同一个 `LoadingTracker`。
pub struct HttpRefresher {
    client: reqwest::Client,
    url: url::Url,
    path: String,
    loading: LoadingTracker,
}

impl HttpRefresher {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        refresh_path: &str,
        loading: LoadingTracker,
    ) -> Result<Self> {
        Ok(Self {
            client,
            url: endpoint_url(base_url, refresh_path)?,
            path: refresh_path.to_string(),
            loading,
        })
    }
}

#[async_trait]
impl TokenRefresher for HttpRefresher {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenPair> {
        let _loading = self.loading.track(&self.path);
        let response = self
            .client
            .post(self.url.clone())
            .json(&RefreshTokenRequest { refresh_token })
            .send()
            .await
            .map_err(|e| ClientError::RefreshExchange(format!("network error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            return Err(ClientError::RefreshExchange(format!(
                "refresh endpoint returned {}: {}",
                status.as_u16(),
                body.message.as_deref().unwrap_or("no message")
            )));
        }

        let body: RefreshTokenResponse = response
            .json()
            .await
            .map_err(|e| ClientError::RefreshExchange(format!("invalid refresh response: {e}")))?;
        Ok(body.tokens)
    }
}

/// 协调器当前所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
}

/// 等待新令牌的调用方
type PendingRequest = oneshot::Sender<std::result::Result<String, String>>;

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    pending: VecDeque<PendingRequest>,
}

struct Inner {
    state: Mutex<RefreshState>,
    tokens: Arc<TokenStore>,
    /// 会话过期时一并删除其中的用户信息
    profile: Arc<dyn KeyValueStore>,
    refresher: Arc<dyn TokenRefresher>,
    events: SessionEvents,
    exchange_timeout: Duration,
}

/// 令牌刷新协调器
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        tokens: Arc<TokenStore>,
        profile: Arc<dyn KeyValueStore>,
        refresher: Arc<dyn TokenRefresher>,
        events: SessionEvents,
        exchange_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RefreshState::default()),
                tokens,
                profile,
                refresher,
                events,
                exchange_timeout,
            }),
        }
    }

    pub async fn phase(&self) -> RefreshPhase {
        if self.inner.state.lock().await.refreshing {
            RefreshPhase::Refreshing
        } else {
            RefreshPhase::Idle
        }
    }

    /// 当前排队等待的调用方数量
    pub async fn pending_len(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }

    /// 处理一次 401，返回用于重放的访问令牌
    ///
    /// `used_token` 是被拒绝请求携带的访问令牌。若存储中的令牌已经不同
    /// （别的请求刚完成刷新），直接返回存储中的令牌，不再发起交换。
    pub async fn on_unauthorized(&self, used_token: Option<&str>) -> Result<String> {
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.inner.state.lock().await;

            if !state.refreshing {
                if let Some(current) = self.inner.tokens.access_token().await {
                    if used_token != Some(current.as_str()) {
                        debug!("Access token already rotated, replaying without refresh");
                        return Ok(current);
                    }
                }

                state.refreshing = true;
                state.pending.push_back(tx);
                info!("Access token rejected, starting token refresh");

                // 交换在独立任务中运行，触发方的 future 被丢弃也不会让队列悬挂
                let inner = self.inner.clone();
                tokio::spawn(async move { inner.run_exchange().await });
            } else {
                state.pending.push_back(tx);
                debug!(queued = state.pending.len(), "Token refresh in flight, request queued");
            }
        }

        match rx.await {
            Ok(Ok(token)) => Ok(token),
            Ok(Err(reason)) => Err(ClientError::RefreshExchange(reason)),
            Err(_) => Err(ClientError::RefreshExchange(
                "refresh task ended without a result".to_string(),
            )),
        }
    }
}

impl Inner {
    async fn run_exchange(self: Arc<Self>) {
        // 交换放在子任务里：刷新实现 panic 时这里拿到 JoinError，队列照常清空
        let worker = self.clone();
        let outcome = match tokio::spawn(async move { worker.exchange().await }).await {
            Ok(outcome) => outcome,
            Err(e) => Err(ClientError::RefreshExchange(format!(
                "refresh exchange aborted: {e}"
            ))),
        };

        let mut state = self.state.lock().await;
        let waiters: Vec<PendingRequest> = state.pending.drain(..).collect();

        let result = match outcome {
            Ok(pair) => {
                let access = pair.access.token.clone();
                if let Err(e) = self.tokens.set(pair).await {
                    warn!(error = %e, "Failed to persist refreshed tokens, keeping them in memory");
                }
                info!(waiters = waiters.len(), "Token refresh succeeded");
                metrics::counter!("token_refresh_total", "outcome" => "success").increment(1);
                self.events.publish(SessionEvent::Refreshed);
                Ok(access)
            }
            Err(e) => {
                let reason = match e {
                    ClientError::RefreshExchange(reason) => reason,
                    other => other.to_string(),
                };
                warn!(
                    reason = %reason,
                    waiters = waiters.len(),
                    "Token refresh failed, clearing stored credentials"
                );
                if let Err(e) = self.tokens.clear().await {
                    warn!(error = %e, "Failed to clear stored credentials");
                }
                if let Err(e) = self.profile.remove(USER_KEY).await {
                    warn!(error = %e, "Failed to clear stored user profile");
                }
                metrics::counter!("token_refresh_total", "outcome" => "failure").increment(1);
                self.events.publish(SessionEvent::Expired {
                    reason: reason.clone(),
                });
                Err(reason)
            }
        };

        // 按入队顺序唤醒
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        state.refreshing = false;
    }

    async fn exchange(&self) -> Result<TokenPair> {
        let current = match self.tokens.get().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Token storage unavailable during refresh");
                None
            }
        };

        let Some(current) = current else {
            return Err(ClientError::RefreshExchange(
                "no refresh token available".to_string(),
            ));
        };

        if current.refresh_expired(Utc::now()) {
            return Err(ClientError::RefreshExchange(
                "refresh token expired".to_string(),
            ));
        }

        match tokio::time::timeout(
            self.exchange_timeout,
            self.refresher.exchange(current.refresh_token()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ClientError::RefreshExchange(format!(
                "refresh exchange timed out after {}s",
                self.exchange_timeout.as_secs_f64()
            ))),
        }
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("exchange_timeout", &self.inner.exchange_timeout)
            .finish_non_exhaustive()
    }
}
