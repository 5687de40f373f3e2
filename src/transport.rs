//! HTTP transport contract and its reqwest-backed implementation.
//!
//! Everything above this layer sees `get/post/put/patch/delete` returning a
//! parsed JSON body or a typed error carrying the numeric status, so the
//! session coordinator and guards can classify failures (401/403/409) without
//! knowing anything about the wire.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TransportError {
    /// HTTP status carried by this error, if the server responded at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}

/// Async HTTP transport consumed by the session and cache layers.
///
/// Implementations must return parsed JSON bodies (`Value::Null` for empty
/// responses) and map every non-2xx response to [`TransportError::Status`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str) -> Result<Value, TransportError>;
    async fn post(&self, path: &str, body: Option<Value>) -> Result<Value, TransportError>;
    async fn put(&self, path: &str, body: Option<Value>) -> Result<Value, TransportError>;
    async fn patch(&self, path: &str, body: Option<Value>) -> Result<Value, TransportError>;
    async fn delete(&self, path: &str) -> Result<Value, TransportError>;

    /// Latest anti-forgery token observed from the server, URL-decoded.
    fn csrf_token(&self) -> Option<String>;
}

/// reqwest-backed transport.
///
/// Captures the `XSRF-TOKEN` cookie from every response and attaches it as
/// the `X-XSRF-TOKEN` header on subsequent mutating requests.
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
    csrf: RwLock<Option<String>>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            csrf: RwLock::new(None),
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        let url = format!("{}{path}", self.base_url);
        let mutating = method != Method::GET;
        let mut builder = self.client.request(method, &url);

        if mutating {
            if let Some(token) = self.csrf_token() {
                builder = builder.header("X-XSRF-TOKEN", token);
            }
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await?;
        self.capture_csrf(&response);

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = parse_error_message(&text)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_string());
            tracing::debug!(status = status.as_u16(), %url, "request failed");
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        if text.trim().is_empty() {
            Ok(Value::Null)
        } else {
            Ok(serde_json::from_str(&text)?)
        }
    }

    /// Record the XSRF-TOKEN cookie from a response's Set-Cookie headers.
    fn capture_csrf(&self, response: &reqwest::Response) {
        for value in response.headers().get_all(reqwest::header::SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            let Some(pair) = raw.split(';').next() else { continue };
            let Some(encoded) = pair.trim().strip_prefix("XSRF-TOKEN=") else {
                continue;
            };
            let token = urlencoding::decode(encoded)
                .map(|t| t.into_owned())
                .unwrap_or_else(|_| encoded.to_string());
            if let Ok(mut csrf) = self.csrf.write() {
                *csrf = Some(token);
            }
        }
    }
}

fn parse_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> Result<Value, TransportError> {
        self.request(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Option<Value>) -> Result<Value, TransportError> {
        self.request(Method::POST, path, body).await
    }

    async fn put(&self, path: &str, body: Option<Value>) -> Result<Value, TransportError> {
        self.request(Method::PUT, path, body).await
    }

    async fn patch(&self, path: &str, body: Option<Value>) -> Result<Value, TransportError> {
        self.request(Method::PATCH, path, body).await
    }

    async fn delete(&self, path: &str) -> Result<Value, TransportError> {
        self.request(Method::DELETE, path, None).await
    }

    fn csrf_token(&self) -> Option<String> {
        self.csrf.read().ok().and_then(|t| t.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_parses_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"authenticated": true})))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri()).unwrap();
        let body = transport.get("/api/session").await.unwrap();
        assert_eq!(body["authenticated"], json!(true));
    }

    #[tokio::test]
    async fn test_empty_body_yields_null() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/logout"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri()).unwrap();
        let body = transport.post("/api/logout", None).await.unwrap();
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_non_2xx_maps_to_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/session"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "session expired"})),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri()).unwrap();
        let err = transport.get("/api/session").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(err.to_string(), "session expired");
    }

    #[tokio::test]
    async fn test_status_without_message_uses_reason() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/news"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri()).unwrap();
        let err = transport.get("/api/news").await.unwrap_err();
        assert!(err.is_forbidden());
        assert_eq!(err.to_string(), "Forbidden");
    }

    #[tokio::test]
    async fn test_xsrf_cookie_captured_and_attached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/session"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "XSRF-TOKEN=abc%3D%3D; Path=/; SameSite=Lax")
                    .set_body_json(json!({"authenticated": false})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/stamps"))
            .and(header("X-XSRF-TOKEN", "abc=="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri()).unwrap();
        assert!(transport.csrf_token().is_none());

        transport.get("/api/session").await.unwrap();
        assert_eq!(transport.csrf_token().as_deref(), Some("abc=="));

        // The decoded token travels back on the next mutating request.
        let body = transport.post("/api/stamps", Some(json!({}))).await.unwrap();
        assert_eq!(body["ok"], json!(true));
    }
}
