//! Application API client.
//!
//! Every call yields an [`ApiResponse`]: `ok` for any 2xx (with the body
//! parsed when it is JSON), otherwise a message carrying the status and a
//! body excerpt, or the transport error. The client never retries.

pub mod payloads;
pub mod transport;

pub use transport::{
    ApiRequest, HttpMethod, HttpTransport, MockTransport, RawResponse, ReqwestTransport,
    TransportError, TransportErrorKind,
};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;

/// Characters of a failed response body kept in the message.
pub const ERROR_EXCERPT_CHARS: usize = 200;
/// Characters of a successful response body kept in debug logs.
const LOG_EXCERPT_CHARS: usize = 500;
/// Keys whose values are masked in logged bodies.
const SENSITIVE_KEYS: &[&str] = &["password", "token"];

/// Classified result of one API call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub ok: bool,
    /// `None` for transport failures.
    pub status: Option<u16>,
    /// Parsed body. Absent when the body was empty or not JSON.
    pub body: Option<Value>,
    pub message: String,
}

impl ApiResponse {
    /// Field of an object body.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.body.as_ref().and_then(|b| b.get(key)).filter(|v| !v.is_null())
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }

    /// Elements of an array body; empty for anything else.
    pub fn items(&self) -> &[Value] {
        self.body
            .as_ref()
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// `ok` and the body carries the given field.
    pub fn ok_with(&self, key: &str) -> bool {
        self.ok && self.field(key).is_some()
    }
}

/// API client over a transport.
pub struct ApiClient<T = ReqwestTransport> {
    transport: T,
}

impl ApiClient<ReqwestTransport> {
    pub fn from_config(config: &ApiConfig) -> Result<Self, TransportError> {
        Ok(Self::new(ReqwestTransport::new(
            &config.base_url,
            config.request_timeout,
        )?))
    }
}

impl<T: HttpTransport> ApiClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> ApiResponse {
        self.send(HttpMethod::Get, path, None, token).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> ApiResponse {
        self.request(HttpMethod::Post, path, Some(body), token).await
    }

    pub async fn put(&self, path: &str, token: Option<&str>) -> ApiResponse {
        self.send(HttpMethod::Put, path, None, token).await
    }

    /// Serialize `body`, send, classify.
    pub async fn request<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
        token: Option<&str>,
    ) -> ApiResponse {
        let body = match body.map(serde_json::to_value).transpose() {
            Ok(body) => body,
            Err(e) => {
                return ApiResponse {
                    ok: false,
                    status: None,
                    body: None,
                    message: format!("Request failed: could not serialize body: {e}"),
                };
            }
        };
        self.send(method, path, body, token).await
    }

    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> ApiResponse {
        let request = ApiRequest {
            method,
            path: path.to_string(),
            body,
            token: token.map(str::to_string),
        };

        info!(method = %method, path, authenticated = token.is_some(), "API request");
        if let Some(body) = &request.body {
            debug!(body = %redact(body), "Request body");
        }

        match self.transport.send(&request).await {
            Ok(raw) => {
                let response = classify(raw);
                if response.ok {
                    info!(method = %method, path, status = response.status, "API response");
                    if let Some(body) = &response.body {
                        debug!(body = %excerpt(&redact(body).to_string(), LOG_EXCERPT_CHARS), "Response body");
                    }
                } else {
                    warn!(method = %method, path, status = response.status, message = %response.message, "API call failed");
                }
                response
            }
            Err(e) => {
                warn!(method = %method, path, error = %e, kind = ?e.kind, "API transport error");
                ApiResponse {
                    ok: false,
                    status: None,
                    body: None,
                    message: format!("Request failed: {e}"),
                }
            }
        }
    }
}

/// 2xx is ok whatever the body; anything else carries a body excerpt.
pub fn classify(raw: RawResponse) -> ApiResponse {
    if (200..300).contains(&raw.status) {
        let body = if raw.body.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&raw.body).ok()
        };
        ApiResponse {
            ok: true,
            status: Some(raw.status),
            body,
            message: format!("Success: {}", raw.status),
        }
    } else {
        ApiResponse {
            ok: false,
            status: Some(raw.status),
            body: serde_json::from_str(&raw.body).ok(),
            message: format!("HTTP {}: {}", raw.status, excerpt(&raw.body, ERROR_EXCERPT_CHARS)),
        }
    }
}

/// First `max` characters.
pub fn excerpt(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Copy of `value` with sensitive values masked.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let sensitive = SENSITIVE_KEYS.iter().any(|s| k.eq_ignore_ascii_case(s));
                    let v = if sensitive { Value::String("***".into()) } else { redact(v) };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}
