//! App Store Connect HTTP client
//!
//! Thin JSON-over-HTTPS helper. Every request carries a bearer token obtained
//! from a [`TokenProvider`]; non-success statuses become [`Error::Api`] (or
//! [`Error::Unauthorized`] for 401) carrying a caller-supplied context message.

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Source of bearer tokens for the App Store Connect API
///
/// Called once per request, so an implementation may refresh a token that is
/// about to expire.
pub trait TokenProvider: Send + Sync {
    /// Return a bearer token (without the "Bearer " prefix)
    fn bearer_token(&self) -> Result<String>;
}

/// A pre-signed token reused for the whole run
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap an already signed token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// `/{collection}/{id}` with the id percent-encoded
pub fn resource_path(collection: &str, id: &str) -> String {
    format!("/{}/{}", collection, urlencoding::encode(id))
}

/// Authenticated JSON client for the App Store Connect API
#[derive(Clone)]
pub struct AscClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl AscClient {
    /// Build a client from the API configuration
    pub fn new(api: &ApiConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(api.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// Underlying HTTP client, used for unauthenticated chunk transfers
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Absolute URL for an API path ("/builds" and "builds" are equivalent)
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET `path` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, context: &str) -> Result<T> {
        self.request(Method::GET, path, None, context).await
    }

    /// Send `body` as JSON with `method` and decode the JSON response
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &Value,
        context: &str,
    ) -> Result<T> {
        self.request(method, path, Some(body), context).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        context: &str,
    ) -> Result<T> {
        let url = self.url(path);
        let token = self.tokens.bearer_token()?;

        tracing::debug!(%method, %url, "App Store Connect request");

        let mut request = self
            .http
            .request(method, &url)
            .header(AUTHORIZATION, format!("Bearer {}", token));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), %url, "App Store Connect request failed");
            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(Error::Unauthorized {
                    context: context.to_string(),
                    body,
                });
            }
            return Err(Error::Api {
                context: context.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("json"));

        let text = response.text().await?;
        // Non-JSON and empty bodies decode as an empty object
        let value = if is_json && !text.trim().is_empty() {
            serde_json::from_str(&text)?
        } else {
            Value::Object(Default::default())
        };

        Ok(serde_json::from_value(value)?)
    }
}

impl std::fmt::Debug for AscClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AscClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
