//! 配置系统
//! 从环境变量加载所有配置，使用 Secret 包装敏感信息

use config::{Config, ConfigError, Environment};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// 后端 API 基础地址，例如 "http://localhost:5000/v1"
    pub base_url: String,
    /// 单个请求超时时间（秒）
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// 刷新令牌接口路径
    pub refresh_path: String,
    /// 不参与令牌刷新的路径（登录、注册、刷新接口本身、OAuth 回调）
    pub exempt_paths: Vec<String>,
    /// 需要驱动加载指示器的认证路径
    pub loading_paths: Vec<String>,
    /// 刷新令牌交换的最长等待时间（秒）
    pub refresh_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// 本地键值存储目录
    pub dir: String,
    /// 令牌加密口令（使用 Secret 包装，防止日志泄露）
    pub encryption_key: Secret<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// 默认豁免路径
pub fn default_exempt_paths() -> Vec<String> {
    [
        "/auth/login",
        "/auth/register",
        "/auth/refresh-token",
        "/auth/google/callback",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

/// 默认显示加载状态的路径
pub fn default_loading_paths() -> Vec<String> {
    ["/auth/login", "/auth/register", "/auth/refresh-token"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl ClientConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("api.base_url", "http://localhost:5000/v1")?
            .set_default("api.request_timeout_secs", 30)?
            .set_default("auth.refresh_path", "/auth/refresh-token")?
            .set_default("auth.exempt_paths", default_exempt_paths())?
            .set_default("auth.loading_paths", default_loading_paths())?
            .set_default("auth.refresh_timeout_secs", 30)?
            .set_default("storage.dir", ".jee-buddy")?
            .set_default("storage.encryption_key", "change-this-encryption-key-in-production")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?;

        // 从环境变量加载配置（前缀为 JEE_）
        settings = settings.add_source(
            Environment::with_prefix("JEE")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("auth.exempt_paths")
                .with_list_parse_key("auth.loading_paths")
                .try_parsing(true),
        );

        let config: ClientConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 验证 API 地址
        match url::Url::parse(&self.api.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid api.base_url: {}. Must be an absolute http(s) URL",
                    self.api.base_url
                )))
            }
        }

        if self.api.request_timeout_secs == 0 || self.api.request_timeout_secs > 600 {
            return Err(ConfigError::Message(
                "request_timeout_secs must be between 1 and 600".to_string(),
            ));
        }

        if self.auth.refresh_timeout_secs == 0 || self.auth.refresh_timeout_secs > 300 {
            return Err(ConfigError::Message(
                "refresh_timeout_secs must be between 1 and 300".to_string(),
            ));
        }

        if !self.auth.refresh_path.starts_with('/') {
            return Err(ConfigError::Message(
                "refresh_path must start with '/'".to_string(),
            ));
        }

        // 刷新接口本身必须豁免，否则会递归刷新
        if !self.auth.exempt_paths.iter().any(|p| p == &self.auth.refresh_path) {
            return Err(ConfigError::Message(format!(
                "exempt_paths must contain the refresh path {}",
                self.auth.refresh_path
            )));
        }

        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty",
                    self.logging.format
                )))
            }
        }

        // 验证加密口令长度（至少 16 字符）
        if self.storage.encryption_key.expose_secret().len() < 16 {
            return Err(ConfigError::Message(
                "encryption_key must be at least 16 characters long".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.auth.refresh_timeout_secs)
    }
}
