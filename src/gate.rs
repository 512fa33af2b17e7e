//! 请求网关
//! 为出站请求附加 Bearer 凭证；遇到 401 时交给刷新协调器，拿到新令牌后重放一次

use reqwest::{Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::coordinator::RefreshCoordinator;
use crate::error::{ClientError, Result};
use crate::loading::{strip_query, LoadingTracker};
use crate::models::ErrorBody;
use crate::token_store::TokenStore;

/// 拼接基础地址与接口路径，保留基础地址中的路径前缀（如 `/v1`）
pub fn endpoint_url(base_url: &str, path: &str) -> Result<url::Url> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url::Url::parse(&joined)
        .map_err(|e| ClientError::Config(format!("Invalid endpoint {joined}: {e}")))
}

/// 可重放的请求描述
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| ClientError::Validation(format!("Unserializable request body: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// 标记为已重放；已标记的请求再收到 401 直接失败
    pub fn mark_retried(&mut self) {
        self.retried = true;
    }
}

/// 请求网关
pub struct RequestGate {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenStore>,
    coordinator: RefreshCoordinator,
    exempt_paths: Vec<String>,
    loading: LoadingTracker,
}

impl RequestGate {
    pub fn new(
        client: reqwest::Client,
        config: &ClientConfig,
        tokens: Arc<TokenStore>,
        coordinator: RefreshCoordinator,
        loading: LoadingTracker,
    ) -> Self {
        Self {
            client,
            base_url: config.api.base_url.clone(),
            tokens,
            coordinator,
            exempt_paths: config.auth.exempt_paths.clone(),
            loading,
        }
    }

    pub fn loading(&self) -> &LoadingTracker {
        &self.loading
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// 豁免路径上的 401 原样返回给调用方，不触发刷新
    pub fn is_exempt(&self, path: &str) -> bool {
        let path = strip_query(path);
        self.exempt_paths.iter().any(|p| p == path)
    }

    /// 发送请求，成功（2xx）时原样返回响应
    pub async fn send(&self, mut request: ApiRequest) -> Result<Response> {
        let _loading = self.loading.track(&request.path);
        let request_id = Uuid::new_v4();

        let token = self.tokens.access_token().await;
        let response = self.dispatch(&request, token.as_deref(), request_id).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::check(response, &request.path).await;
        }

        if self.is_exempt(&request.path) {
            debug!(%request_id, path = %request.path, "401 on exempt path, not refreshing");
            return Err(Self::authentication_error(response, &request.path).await);
        }

        if request.is_retried() {
            warn!(%request_id, path = %request.path, "401 on already retried request");
            return Err(Self::authentication_error(response, &request.path).await);
        }

        request.mark_retried();
        let fresh = self.coordinator.on_unauthorized(token.as_deref()).await?;

        debug!(%request_id, path = %request.path, "Replaying request with refreshed token");
        let response = self.dispatch(&request, Some(&fresh), request_id).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(%request_id, path = %request.path, "Replayed request still unauthorized");
            return Err(Self::authentication_error(response, &request.path).await);
        }

        Self::check(response, &request.path).await
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
        request_id: Uuid,
    ) -> Result<Response> {
        let mut url = endpoint_url(&self.base_url, &request.path)?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .header("X-Request-Id", request_id.to_string());
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(
            %request_id,
            method = %request.method,
            path = %request.path,
            authenticated = token.is_some(),
            retried = request.retried,
            "Sending request"
        );

        Ok(builder.send().await?)
    }

    async fn check(response: Response, path: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: ErrorBody = response.json().await.unwrap_or_default();
        Err(ClientError::Api {
            status: status.as_u16(),
            path: path.to_string(),
            message: body.message.unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            }),
        })
    }

    async fn authentication_error(response: Response, path: &str) -> ClientError {
        let body: ErrorBody = response.json().await.unwrap_or_default();
        ClientError::Authentication {
            path: path.to_string(),
            message: body
                .message
                .unwrap_or_else(|| "Please authenticate".to_string()),
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(ApiRequest::get(path)).await?;
        Ok(response.json().await?)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(ApiRequest::post(path).json(body)?).await?;
        Ok(response.json().await?)
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(ApiRequest::put(path).json(body)?).await?;
        Ok(response.json().await?)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(ApiRequest::delete(path)).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RequestGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGate")
            .field("base_url", &self.base_url)
            .field("exempt_paths", &self.exempt_paths)
            .finish_non_exhaustive()
    }
}
