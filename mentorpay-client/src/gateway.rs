//! Remote Data Gateway — thin wrapper over the payout backend's REST API.
//!
//! Responsibilities are deliberately narrow: attach the bearer token when
//! one is stored, normalize the two response envelope shapes the backend
//! uses (`{sessions: [...]}` vs a bare array), and classify failures into
//! `Unauthorized` vs everything else. No retry happens here — the
//! single-refresh-and-replay policy lives in [`crate::auth`].

use mentorpay_core::config::ApiConfig;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::auth::TokenStore;

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),
}

impl GatewayError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Unauthorized { .. })
    }
}

/// Non-fatal signal that a response body had an unrecognized shape. Callers
/// log it and degrade to empty/fallback data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeWarning {
    pub context: String,
}

// ============================================================================
// ApiClient
// ============================================================================

/// Pagination metadata when the backend wraps a page in an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMeta {
    pub current_page: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    probe_http: Client,
    base_url: String,
    tokens: Arc<TokenStore>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, tokens: Arc<TokenStore>) -> Result<Self, GatewayError> {
        Self::build(
            config.base_url.clone(),
            Duration::from_secs(config.timeout_seconds),
            Duration::from_secs(config.probe_timeout_seconds),
            tokens,
        )
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(
        base_url: impl Into<String>,
        tokens: Arc<TokenStore>,
    ) -> Result<Self, GatewayError> {
        Self::build(
            base_url.into(),
            Duration::from_secs(30),
            Duration::from_secs(5),
            tokens,
        )
    }

    fn build(
        base_url: String,
        timeout: Duration,
        probe_timeout: Duration,
        tokens: Arc<TokenStore>,
    ) -> Result<Self, GatewayError> {
        let http = Client::builder().timeout(timeout).build()?;
        let probe_http = Client::builder().timeout(probe_timeout).build()?;
        Ok(Self {
            http,
            probe_http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub async fn get(&self, path: &str) -> Result<Value, GatewayError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Option<&Value>) -> Result<Value, GatewayError> {
        self.request(Method::POST, path, body).await
    }

    pub async fn put(&self, path: &str, body: Option<&Value>) -> Result<Value, GatewayError> {
        self.request(Method::PUT, path, body).await
    }

    /// Issue one request. Attaches `Authorization: Bearer <token>` when a
    /// token is stored, omits the header otherwise.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method.clone(), &url);
        if let Some(token) = self.tokens.bearer() {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await?;
        let status = response.status();
        tracing::debug!(method = %method, path = path, status = status.as_u16(), "API request");

        let text = response.text().await.unwrap_or_default();
        let value: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(value);
        }

        let message = server_message(&value, &text, status);
        if status == StatusCode::UNAUTHORIZED || message.contains("Authentication error") {
            tracing::warn!(path = path, "unauthorized response");
            return Err(GatewayError::Unauthorized { message });
        }
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound { message });
        }

        tracing::warn!(path = path, status = status.as_u16(), message = %message, "API error");
        Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Cheap connectivity check run before mutating calls. Any HTTP
    /// response — even an error status — proves the backend is reachable;
    /// only transport failure maps to `NetworkUnreachable`.
    pub async fn probe(&self) -> Result<(), GatewayError> {
        let url = format!("{}/api/auth/verify", self.base_url);
        match self.probe_http.get(&url).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "connectivity probe failed");
                Err(GatewayError::NetworkUnreachable(e.to_string()))
            }
        }
    }
}

/// Best-effort extraction of the server-provided message.
fn server_message(value: &Value, raw: &str, status: StatusCode) -> String {
    value
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| value.get("error").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| {
            if raw.trim().is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                raw.chars().take(200).collect()
            }
        })
}

// ============================================================================
// Response shape normalization
// ============================================================================

/// Envelope fields the backend wraps record lists in, per endpoint.
const ENVELOPE_KEYS: [&str; 6] = [
    "sessions",
    "users",
    "payments",
    "messages",
    "conversations",
    "content",
];

/// Normalize a response body that is either a bare array or an envelope
/// object into one ordered sequence of records. An unrecognized shape is a
/// [`ShapeWarning`], not an error — callers degrade to empty data.
pub fn extract_records(value: &Value) -> Result<Vec<Value>, ShapeWarning> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::Object(map) => {
            for key in ENVELOPE_KEYS {
                if let Some(Value::Array(items)) = map.get(key) {
                    return Ok(items.clone());
                }
            }
            Err(ShapeWarning {
                context: format!(
                    "object response with no known record field (keys: {:?})",
                    map.keys().take(5).collect::<Vec<_>>()
                ),
            })
        }
        other => Err(ShapeWarning {
            context: format!("expected array or envelope, got {}", type_name(other)),
        }),
    }
}

/// Like [`extract_records`] but degrades in place: the warning is logged
/// and an empty sequence returned.
pub fn extract_records_lenient(value: &Value) -> Vec<Value> {
    match extract_records(value) {
        Ok(records) => records,
        Err(warning) => {
            tracing::warn!(context = %warning.context, "unrecognized response shape, treating as empty");
            Vec::new()
        }
    }
}

/// Pagination metadata, when the envelope carries it.
pub fn extract_page_meta(value: &Value) -> Option<PageMeta> {
    let map = value.as_object()?;
    let total_items = map.get("totalItems")?.as_u64()? as usize;
    let total_pages = map.get("totalPages")?.as_u64()? as usize;
    let current_page = map
        .get("currentPage")
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;
    Some(PageMeta {
        current_page,
        total_items,
        total_pages,
    })
}

/// Decode a single entity response. Unlike [`decode_records`] this is for
/// bodies that must parse; failure surfaces as an API error naming the
/// context.
pub fn decode_entity<T: DeserializeOwned>(value: Value, context: &str) -> Result<T, GatewayError> {
    serde_json::from_value(value).map_err(|e| GatewayError::Api {
        status: 200,
        message: format!("unreadable {} response: {}", context, e),
    })
}

/// Decode a record sequence into typed entities, skipping (and logging)
/// individual records that fail to parse rather than dropping the batch.
pub fn decode_records<T: DeserializeOwned>(records: Vec<Value>) -> Vec<T> {
    records
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<T>(v) {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed record");
                None
            }
        })
        .collect()
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(uri: &str) -> ApiClient {
        ApiClient::with_base_url(uri, TokenStore::new()).expect("client should build")
    }

    #[test]
    fn test_extract_records_bare_array() {
        let v = json!([{"id": 1}, {"id": 2}]);
        let records = extract_records(&v).expect("bare array is a valid shape");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_extract_records_envelopes() {
        for key in ["sessions", "users", "payments", "content"] {
            let v = json!({ key: [{"id": 1}], "totalItems": 1 });
            let records = extract_records(&v).expect("envelope is a valid shape");
            assert_eq!(records.len(), 1, "envelope key {}", key);
        }
    }

    #[test]
    fn test_extract_records_unrecognized_shape() {
        assert!(extract_records(&json!({"stuff": 42})).is_err());
        assert!(extract_records(&json!("nope")).is_err());
        assert!(extract_records_lenient(&json!(null)).is_empty());
    }

    #[test]
    fn test_extract_page_meta() {
        let v = json!({"sessions": [], "currentPage": 2, "totalItems": 57, "totalPages": 6});
        let meta = extract_page_meta(&v).expect("meta present");
        assert_eq!(meta.current_page, 2);
        assert_eq!(meta.total_items, 57);
        assert_eq!(meta.total_pages, 6);

        assert!(extract_page_meta(&json!([1, 2, 3])).is_none());
        assert!(extract_page_meta(&json!({"sessions": []})).is_none());
    }

    #[test]
    fn test_decode_records_skips_malformed() {
        #[derive(serde::Deserialize)]
        struct Row {
            id: i64,
        }
        let rows: Vec<Row> =
            decode_records(vec![json!({"id": 1}), json!({"id": "bogus"}), json!({"id": 3})]);
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_bearer_header_attached_when_token_present() {
        let server = MockServer::start().await;
        let tokens = TokenStore::new();
        tokens.set_token("tok-123".to_string());
        let client = ApiClient::with_base_url(server.uri(), tokens).unwrap();

        Mock::given(method("GET"))
            .and(path("/api/sessions"))
            .and(header("authorization", "Bearer tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let v = client.get("/api/sessions").await.expect("request should succeed");
        assert!(v.as_array().is_some());
    }

    #[tokio::test]
    async fn test_bearer_header_omitted_without_token() {
        let server = MockServer::start().await;
        let client = client_for(&server.uri());

        // Only mount a mock that matches requests WITHOUT the header
        Mock::given(method("GET"))
            .and(path("/api/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        client.get("/api/sessions").await.expect("request should succeed");
        let received = server.received_requests().await.expect("recording enabled");
        assert!(received[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_401_classified_unauthorized() {
        let server = MockServer::start().await;
        let client = client_for(&server.uri());

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Token expired"})),
            )
            .mount(&server)
            .await;

        let err = client.get("/api/payments").await.expect_err("401 must error");
        match err {
            GatewayError::Unauthorized { message } => assert_eq!(message, "Token expired"),
            other => panic!("expected Unauthorized, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_auth_error_body_classified_unauthorized() {
        let server = MockServer::start().await;
        let client = client_for(&server.uri());

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_json(
                json!({"message": "Authentication error: token signature invalid"}),
            ))
            .mount(&server)
            .await;

        let err = client.get("/api/sessions").await.expect_err("must error");
        assert!(err.is_unauthorized(), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_other_errors_carry_server_message() {
        let server = MockServer::start().await;
        let client = client_for(&server.uri());

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(json!({"message": "Failed to retrieve payments: boom"})),
            )
            .mount(&server)
            .await;

        let err = client.get("/api/payments").await.expect_err("must error");
        match err {
            GatewayError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "Failed to retrieve payments: boom");
            }
            other => panic!("expected Api, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_404_classified_not_found() {
        let server = MockServer::start().await;
        let client = client_for(&server.uri());

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Payment not found"})))
            .mount(&server)
            .await;

        let err = client.get("/api/payments/999").await.expect_err("must error");
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_probe_reachable_even_on_error_status() {
        let server = MockServer::start().await;
        let client = client_for(&server.uri());

        Mock::given(method("GET"))
            .and(path("/api/auth/verify"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        client.probe().await.expect("error status still proves reachability");
    }

    #[tokio::test]
    async fn test_probe_unreachable() {
        // Port from a listener we immediately drop — nothing is listening.
        // (Dropping a MockServer returns it to wiremock's pool, so its port
        // stays bound; a bare TcpListener actually releases the port.)
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let uri = format!("http://{}", listener.local_addr().expect("local addr"));
        drop(listener);

        let client = client_for(&uri);
        let err = client.probe().await.expect_err("must be unreachable");
        assert!(matches!(err, GatewayError::NetworkUnreachable(_)));
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let server = MockServer::start().await;
        let client = client_for(&server.uri());

        Mock::given(method("POST"))
            .and(path("/api/messages"))
            .and(header_exists("content-type"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 9})))
            .mount(&server)
            .await;

        let v = client
            .post("/api/messages", Some(&json!({"recipientId": 2, "content": "hi"})))
            .await
            .expect("post should succeed");
        assert_eq!(v["id"], 9);
    }
}
