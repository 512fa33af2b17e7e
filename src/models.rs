//! 认证相关的数据模型
//! 字段命名与后端 `/auth/*` 接口的 JSON 保持一致

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 单个令牌及其过期时间
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token: String,
    pub expires: DateTime<Utc>,
}

/// 访问令牌 + 刷新令牌
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: Token,
    pub refresh: Token,
}

impl TokenPair {
    pub fn new(
        access_token: impl Into<String>,
        access_expiry: DateTime<Utc>,
        refresh_token: impl Into<String>,
        refresh_expiry: DateTime<Utc>,
    ) -> Self {
        Self {
            access: Token {
                token: access_token.into(),
                expires: access_expiry,
            },
            refresh: Token {
                token: refresh_token.into(),
                expires: refresh_expiry,
            },
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access.token
    }

    pub fn access_expiry(&self) -> DateTime<Utc> {
        self.access.expires
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh.token
    }

    pub fn refresh_expiry(&self) -> DateTime<Utc> {
        self.refresh.expires
    }

    /// 刷新令牌是否已过期
    pub fn refresh_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.refresh.expires
    }
}

/// 刷新令牌请求体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest<'a> {
    pub refresh_token: &'a str,
}

/// 刷新令牌响应体
#[derive(Debug, Deserialize)]
pub struct RefreshTokenResponse {
    pub tokens: TokenPair,
}

/// 用户信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// 登录请求
#[derive(Debug, Serialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// 注册请求
#[derive(Debug, Serialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

/// 忘记密码请求
#[derive(Debug, Serialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
}

/// 重置密码请求体，重置令牌放在查询参数中
#[derive(Debug, Serialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

/// 登录/注册/OAuth 回调响应
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub user: Option<UserProfile>,
    pub tokens: TokenPair,
}

/// 后端错误响应体，字段均可缺省
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<u16>,
}
