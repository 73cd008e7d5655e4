//! Eventhub API client implementation
//!
//! One configured dispatcher for every backend call:
//! - Fixed base URL
//! - Mutable default `Authorization` header
//! - A single response interceptor consulted on every response

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client as HttpClient, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::{ApiConfig, DEFAULT_BASE_URL};
use crate::error::{Error, Result};

use super::interceptor::ResponseInterceptor;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Shared HTTP client for the Eventhub API
///
/// Cheap to clone; clones share the default header and the interceptor.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: HttpClient,
    base_url: String,
    /// Full header value, e.g. `Bearer abc`
    authorization: RwLock<Option<String>>,
    interceptor: Option<Arc<dyn ResponseInterceptor>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url)
            .field("authorized", &self.authorization().is_some())
            .field("interceptor", &self.inner.interceptor.is_some())
            .finish()
    }
}

/// Builder for creating an ApiClient
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    interceptor: Option<Arc<dyn ResponseInterceptor>>,
}

impl ApiClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take base URL and timeout from configuration
    pub fn config(mut self, config: &ApiConfig) -> Self {
        self.base_url = Some(config.base_url.clone());
        self.timeout_secs = Some(config.timeout_secs);
        self
    }

    /// Set the base URL (defaults to `http://localhost:8080`)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Register the response interceptor
    pub fn interceptor(mut self, interceptor: Arc<dyn ResponseInterceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let timeout_secs = self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                http_client,
                base_url,
                authorization: RwLock::new(None),
                interceptor: self.interceptor,
            }),
        })
    }
}

impl ApiClient {
    /// Create a client without an interceptor
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        ApiClientBuilder::new().base_url(base_url).build()
    }

    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Set or clear the default bearer credential. No network call.
    pub fn set_credential(&self, token: Option<&str>) {
        if let Ok(mut authorization) = self.inner.authorization.write() {
            *authorization = token.map(|t| format!("Bearer {}", t));
        }
    }

    /// Current default `Authorization` header value
    pub fn authorization(&self) -> Option<String> {
        self.inner
            .authorization
            .read()
            .ok()
            .and_then(|a| a.clone())
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(self.request(Method::GET, path)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(self.request(Method::POST, path).json(body))
            .await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(self.request(Method::PUT, path).json(body))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(self.request(Method::DELETE, path)).await
    }

    /// Send an arbitrary request with an optional JSON body
    pub async fn send_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.execute(builder).await
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.inner.base_url,
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!(method = %method, url = %url, "Sending request");

        let builder = self.inner.http_client.request(method, url);
        match self.authorization() {
            Some(value) => builder.header(AUTHORIZATION, value),
            None => builder,
        }
    }

    /// Send a request, run the interceptor, then map the response
    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let request = builder.build().map_err(Error::NetworkError)?;
        let sent = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let response = self
            .inner
            .http_client
            .execute(request)
            .await
            .map_err(Error::NetworkError)?;
        let status = response.status();

        if let Some(interceptor) = &self.inner.interceptor {
            interceptor.on_response(self, status.as_u16(), sent.as_deref());
        }

        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        let bytes = response.bytes().await.map_err(Error::NetworkError)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_value(serde_json::Value::Null)?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Build an [`Error::Api`] keeping the server's payload
async fn error_from_response(response: Response) -> Error {
    let status = response.status().as_u16();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => {
            warn!(status, error = %e, "Failed to read error body");
            String::new()
        }
    };

    let body = if text.trim().is_empty() {
        None
    } else {
        Some(
            serde_json::from_str(&text)
                .unwrap_or_else(|_| serde_json::Value::String(text)),
        )
    };

    debug!(status, "Request rejected");
    Error::Api { status, body }
}
