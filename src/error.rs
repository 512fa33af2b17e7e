//! 统一错误模型
//! 定义客户端所有错误类型

use thiserror::Error;

/// 客户端错误类型
#[derive(Debug, Error)]
pub enum ClientError {
    /// 本地存储读写失败，调用方按"无凭证"处理
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    /// 刷新令牌交换失败（非 2xx 或网络错误），本批次排队请求全部失败
    #[error("Token refresh failed: {0}")]
    RefreshExchange(String),

    /// 重放后仍为 401，或豁免路径返回 401
    #[error("Authentication failed for {path}")]
    Authentication { path: String, message: String },

    #[error("Request to {path} failed with status {status}: {message}")]
    Api {
        status: u16,
        path: String,
        message: String,
    },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    Validation(String),
}

impl ClientError {
    /// 获取 HTTP 状态码（如果错误来自服务端响应）
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Authentication { .. } => Some(401),
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// 是否需要应用跳转到登录页
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            ClientError::RefreshExchange(_) | ClientError::Authentication { .. }
        )
    }

    /// 获取用户友好的错误消息（不包含敏感信息）
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Storage(_) | ClientError::Crypto(_) => {
                "Local session data is unavailable".to_string()
            }
            ClientError::RefreshExchange(_) => {
                "Your session has expired. Please log in again.".to_string()
            }
            ClientError::Authentication { message, .. } => message.clone(),
            ClientError::Api { message, .. } => message.clone(),
            ClientError::Transport(_) => {
                "Unable to connect to server. Please check your internet connection.".to_string()
            }
            ClientError::Config(_) => "Configuration error".to_string(),
            ClientError::Validation(msg) => msg.clone(),
        }
    }
}

impl From<config::ConfigError> for ClientError {
    fn from(e: config::ConfigError) -> Self {
        ClientError::Config(e.to_string())
    }
}

impl From<validator::ValidationErrors> for ClientError {
    fn from(e: validator::ValidationErrors) -> Self {
        ClientError::Validation(e.to_string())
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let auth = ClientError::Authentication {
            path: "/auth/login".to_string(),
            message: "Incorrect email or password".to_string(),
        };
        assert_eq!(auth.status_code(), Some(401));

        let api = ClientError::Api {
            status: 404,
            path: "/books/1".to_string(),
            message: "Book not found".to_string(),
        };
        assert_eq!(api.status_code(), Some(404));

        assert_eq!(ClientError::Storage("disk".to_string()).status_code(), None);
    }

    #[test]
    fn test_requires_login() {
        assert!(ClientError::RefreshExchange("expired".to_string()).requires_login());
        assert!(ClientError::Authentication {
            path: "/books".to_string(),
            message: "Please authenticate".to_string(),
        }
        .requires_login());
        assert!(!ClientError::Storage("io".to_string()).requires_login());
        assert!(!ClientError::Api {
            status: 500,
            path: "/books".to_string(),
            message: "boom".to_string(),
        }
        .requires_login());
    }

    #[test]
    fn test_user_message_no_sensitive_info() {
        let error = ClientError::Crypto("aead::Error at nonce 0x42".to_string());
        let message = error.user_message();
        assert_eq!(message, "Local session data is unavailable");
        assert!(!message.contains("nonce"));
    }
}
