//! 测试公共模块
//! 提供测试配置和进程内的假后端（axum）

#![allow(dead_code)]

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use jee_buddy_client::config::{
    default_exempt_paths, default_loading_paths, ApiConfig, AuthConfig, ClientConfig,
    LoggingConfig, StorageConfig,
};
use jee_buddy_client::models::TokenPair;
use jee_buddy_client::storage::MemoryStore;
use jee_buddy_client::JeeClient;
use secrecy::Secret;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const VALID_REFRESH: &str = "refresh-1";
pub const STUDENT_EMAIL: &str = "student@example.com";
pub const STUDENT_PASSWORD: &str = "CorrectHorse9";
pub const RESET_TOKEN: &str = "reset-token-1";

/// 假后端的共享状态
#[derive(Clone, Default)]
pub struct Backend {
    /// 当前有效的访问令牌
    pub valid_access: Arc<Mutex<String>>,
    /// 刷新接口返回 400
    pub reject_refresh: Arc<AtomicBool>,
    /// 受保护接口总是返回 401
    pub always_unauthorized: Arc<AtomicBool>,
    pub refresh_calls: Arc<AtomicUsize>,
    pub login_calls: Arc<AtomicUsize>,
    pub logout_calls: Arc<AtomicUsize>,
    pub forgot_calls: Arc<AtomicUsize>,
    /// 重置成功时收到的新密码
    pub reset_password: Arc<Mutex<Option<String>>>,
    /// 受保护接口成功时收到的令牌
    pub accepted_tokens: Arc<Mutex<Vec<String>>>,
    /// 刷新接口的人为延迟（毫秒）
    pub refresh_delay_ms: Arc<AtomicUsize>,
}

impl Backend {
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn accepted_tokens(&self) -> Vec<String> {
        self.accepted_tokens.lock().unwrap().clone()
    }

    fn set_valid(&self, token: &str) {
        *self.valid_access.lock().unwrap() = token.to_string();
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.to_string())
}

fn tokens_json(access: &str, refresh: &str) -> Value {
    let now = Utc::now();
    json!({
        "access": { "token": access, "expires": now + ChronoDuration::minutes(15) },
        "refresh": { "token": refresh, "expires": now + ChronoDuration::days(7) },
    })
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "code": 401, "message": "Please authenticate" })),
    )
}

async fn refresh_token(
    State(backend): State<Backend>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let n = backend.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;

    let delay = backend.refresh_delay_ms.load(Ordering::SeqCst) as u64;
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    if backend.reject_refresh.load(Ordering::SeqCst) || body["refreshToken"] != VALID_REFRESH {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "code": 400, "message": "Invalid refresh token" })),
        );
    }

    let access = format!("access-refreshed-{n}");
    backend.set_valid(&access);
    (
        StatusCode::OK,
        Json(json!({ "tokens": tokens_json(&access, VALID_REFRESH) })),
    )
}

async fn login(
    State(backend): State<Backend>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    backend.login_calls.fetch_add(1, Ordering::SeqCst);

    if body["email"] != STUDENT_EMAIL || body["password"] != STUDENT_PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "code": 401, "message": "Incorrect email or password" })),
        );
    }

    backend.set_valid("access-login");
    (
        StatusCode::OK,
        Json(json!({
            "user": { "id": "user-1", "email": STUDENT_EMAIL, "name": "Asha" },
            "tokens": tokens_json("access-login", VALID_REFRESH),
        })),
    )
}

async fn logout(State(backend): State<Backend>) -> StatusCode {
    backend.logout_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn forgot_password(
    State(backend): State<Backend>,
    Json(body): Json<Value>,
) -> StatusCode {
    backend.forgot_calls.fetch_add(1, Ordering::SeqCst);
    if body["email"].is_string() {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::BAD_REQUEST
    }
}

async fn reset_password(
    State(backend): State<Backend>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    if params.get("token").map(String::as_str) != Some(RESET_TOKEN) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "code": 400, "message": "Password reset failed" })),
        ));
    }

    *backend.reset_password.lock().unwrap() = body["password"].as_str().map(str::to_string);
    Ok(StatusCode::NO_CONTENT)
}

async fn books(State(backend): State<Backend>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    let Some(token) = bearer(&headers) else {
        return unauthorized();
    };
    if backend.always_unauthorized.load(Ordering::SeqCst)
        || token != *backend.valid_access.lock().unwrap()
    {
        return unauthorized();
    }

    backend.accepted_tokens.lock().unwrap().push(token);
    (
        StatusCode::OK,
        Json(json!({ "books": [{ "id": "b1", "subject": "physics" }] })),
    )
}

async fn missing() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "code": 404, "message": "Book not found" })),
    )
}

/// 启动假后端，返回地址和共享状态
pub async fn spawn_backend() -> (SocketAddr, Backend) {
    let backend = Backend::default();
    backend.set_valid("access-0");

    let app = Router::new()
        .route("/v1/auth/refresh-token", post(refresh_token))
        .route("/v1/auth/login", post(login))
        .route("/v1/auth/logout", post(logout))
        .route("/v1/auth/forgot-password", post(forgot_password))
        .route("/v1/auth/reset-password", post(reset_password))
        .route("/v1/books", get(books))
        .route("/v1/books/missing", get(missing))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, backend)
}

/// 创建测试配置
pub fn create_test_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        api: ApiConfig {
            base_url: format!("http://{addr}/v1"),
            request_timeout_secs: 5,
        },
        auth: AuthConfig {
            refresh_path: "/auth/refresh-token".to_string(),
            exempt_paths: default_exempt_paths(),
            loading_paths: default_loading_paths(),
            refresh_timeout_secs: 5,
        },
        storage: StorageConfig {
            dir: "unused-in-memory".to_string(),
            encryption_key: Secret::new("integration-test-encryption-key".to_string()),
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
    }
}

/// 带内存存储的客户端
pub fn create_client(addr: SocketAddr) -> (JeeClient, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let client = JeeClient::with_backend(create_test_config(addr), store.clone())
        .expect("Failed to create client");
    (client, store)
}

/// 过期访问令牌 + 有效刷新令牌
pub fn stale_tokens() -> TokenPair {
    let now = Utc::now();
    TokenPair::new(
        "access-stale",
        now - ChronoDuration::minutes(1),
        VALID_REFRESH,
        now + ChronoDuration::days(7),
    )
}
