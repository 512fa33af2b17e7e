//! 会话接口
//! 登录、注册、OAuth 回调、密码找回与登出；令牌对只在这里和刷新协调器中被创建或销毁

use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

use crate::error::Result;
use crate::events::{SessionEvent, SessionEvents};
use crate::gate::{ApiRequest, RequestGate};
use crate::models::{
    AuthResponse, ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
    TokenPair, UserProfile,
};
use crate::storage::KeyValueStore;
use crate::token_store::TokenStore;

/// 用户信息在存储中的键名
pub const USER_KEY: &str = "user";

/// 会话接口
pub struct SessionApi {
    gate: Arc<RequestGate>,
    tokens: Arc<TokenStore>,
    backend: Arc<dyn KeyValueStore>,
    events: SessionEvents,
}

impl SessionApi {
    pub fn new(
        gate: Arc<RequestGate>,
        tokens: Arc<TokenStore>,
        backend: Arc<dyn KeyValueStore>,
        events: SessionEvents,
    ) -> Self {
        Self {
            gate,
            tokens,
            backend,
            events,
        }
    }

    /// 邮箱密码登录
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        request.validate()?;

        info!(email = %request.email, "Attempting login");
        let response: AuthResponse = self.gate.post_json("/auth/login", &request).await?;
        self.establish(&response).await;
        Ok(response)
    }

    /// 注册新用户并直接建立会话
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<AuthResponse> {
        let request = RegisterRequest {
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        request.validate()?;

        let response: AuthResponse = self.gate.post_json("/auth/register", &request).await?;
        self.establish(&response).await;
        Ok(response)
    }

    /// 获取 Google OAuth 授权地址
    pub async fn google_auth_url(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct UrlResponse {
            url: String,
        }

        let response: UrlResponse = self.gate.get_json("/auth/google").await?;
        Ok(response.url)
    }

    /// 用 OAuth 回调中的授权码完成登录
    pub async fn complete_google_sign_in(&self, code: &str) -> Result<AuthResponse> {
        let response = self
            .gate
            .send(ApiRequest::get("/auth/google/callback").query("code", code))
            .await?;
        let response: AuthResponse = response.json().await?;
        self.establish(&response).await;
        Ok(response)
    }

    /// 请求发送密码重置邮件，不影响当前会话
    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        let request = ForgotPasswordRequest {
            email: email.trim().to_string(),
        };
        request.validate()?;

        self.gate
            .send(ApiRequest::post("/auth/forgot-password").json(&request)?)
            .await?;
        info!(email = %request.email, "Password reset email requested");
        Ok(())
    }

    /// 用邮件中的重置令牌设置新密码
    pub async fn reset_password(&self, token: &str, password: &str) -> Result<()> {
        let request = ResetPasswordRequest {
            password: password.to_string(),
        };
        request.validate()?;

        self.gate
            .send(
                ApiRequest::post("/auth/reset-password")
                    .query("token", token)
                    .json(&request)?,
            )
            .await?;
        info!("Password reset completed");
        Ok(())
    }

    /// 登出
    ///
    /// 通知后端失败不影响本地清理；本地两项都会尝试删除，返回第一个错误。
    pub async fn logout(&self) -> Result<()> {
        if self.tokens.access_token().await.is_some() {
            if let Err(e) = self.gate.send(ApiRequest::post("/auth/logout")).await {
                warn!(error = %e, "Logout request failed, clearing local session anyway");
            }
        }

        let tokens_cleared = self.tokens.clear().await;
        let user_cleared = self.backend.remove(USER_KEY).await;
        self.events.publish(SessionEvent::LoggedOut);

        if let Err(e) = tokens_cleared.and(user_cleared) {
            warn!(error = %e, "Logged out with incomplete local cleanup");
            return Err(e);
        }
        info!("Logged out");
        Ok(())
    }

    /// 本地保存的用户信息；读取或解析失败返回 None
    pub async fn current_user(&self) -> Option<UserProfile> {
        let raw = self.backend.get(USER_KEY).await.ok().flatten()?;
        serde_json::from_str(&raw).ok()
    }

    pub async fn current_tokens(&self) -> Option<TokenPair> {
        self.tokens.get().await.ok().flatten()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.tokens.access_token().await.is_some()
    }

    async fn establish(&self, response: &AuthResponse) {
        if let Err(e) = self.tokens.set(response.tokens.clone()).await {
            warn!(error = %e, "Failed to persist tokens, session limited to this process");
        }

        if let Some(user) = &response.user {
            match serde_json::to_string(user) {
                Ok(json) => {
                    if let Err(e) = self.backend.set(USER_KEY, &json).await {
                        warn!(error = %e, "Failed to persist user profile");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to encode user profile"),
            }
        }

        self.events.publish(SessionEvent::LoggedIn);
    }
}
