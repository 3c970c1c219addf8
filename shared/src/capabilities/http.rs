use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const MAX_PATH_LENGTH: usize = 2048;
pub const MAX_REQUEST_BODY_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const MAX_TIMEOUT_MS: u64 = 300_000;
pub const MAX_HEADER_VALUE_LENGTH: usize = 8192;

/// Relative API path (`/api/cases/7?archived=true`), validated once and
/// resolved against a base URL by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiPath(String);

impl ApiPath {
    pub fn new(path: impl Into<String>) -> Result<Self, HttpError> {
        let path = path.into();
        Self::validate(&path)?;
        Ok(Self(path))
    }

    /// Appends one query pair, percent-encoding both halves.
    pub fn with_query(self, key: &str, value: &str) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .append_pair(key, value)
            .finish();
        let sep = if self.0.contains('?') { '&' } else { '?' };
        Self(format!("{}{}{}", self.0, sep, encoded))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path without the query string.
    pub fn route(&self) -> &str {
        self.0.split_once('?').map_or(self.0.as_str(), |(route, _)| route)
    }

    pub fn query(&self) -> Option<&str> {
        self.0.split_once('?').map(|(_, q)| q)
    }

    /// Resolves the path against `base`. The path is absolute, so it replaces
    /// whatever path `base` carries.
    pub fn join_onto(&self, base: &Url) -> Result<Url, HttpError> {
        if base.cannot_be_a_base() {
            return Err(HttpError::InvalidPath {
                path: base.to_string(),
                reason: "base URL cannot be a base".to_string(),
            });
        }
        base.join(&self.0).map_err(|e| HttpError::InvalidPath {
            path: Self::truncate(&self.0),
            reason: e.to_string(),
        })
    }

    fn validate(path: &str) -> Result<(), HttpError> {
        if path.is_empty() {
            return Err(HttpError::InvalidPath {
                path: String::new(),
                reason: "path cannot be empty".to_string(),
            });
        }

        if path.len() > MAX_PATH_LENGTH {
            return Err(HttpError::InvalidPath {
                path: Self::truncate(path),
                reason: format!("path exceeds maximum length of {MAX_PATH_LENGTH} bytes"),
            });
        }

        if !path.starts_with('/') || path.starts_with("//") {
            return Err(HttpError::InvalidPath {
                path: Self::truncate(path),
                reason: "path must be absolute and carry no authority".to_string(),
            });
        }

        if path.chars().any(|c| c.is_control() || c == ' ') {
            return Err(HttpError::InvalidPath {
                path: Self::truncate(path),
                reason: "path contains whitespace or control characters".to_string(),
            });
        }

        if path.split('/').any(|segment| segment == "..") {
            return Err(HttpError::InvalidPath {
                path: Self::truncate(path),
                reason: "path cannot contain traversal segments".to_string(),
            });
        }

        Ok(())
    }

    fn truncate(path: &str) -> String {
        if path.len() <= 100 {
            path.to_string()
        } else {
            let mut end = 100;
            while !path.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &path[..end])
        }
    }
}

impl std::fmt::Display for ApiPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HttpHeaders {
    headers: Vec<(String, String)>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), HttpError> {
        let name = name.into();
        let value = value.into();

        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(HttpError::InvalidRequest {
                reason: format!("invalid header name '{name}'"),
            });
        }
        if value.len() > MAX_HEADER_VALUE_LENGTH || value.contains(['\r', '\n', '\0']) {
            return Err(HttpError::InvalidRequest {
                reason: format!("invalid value for header '{name}'"),
            });
        }

        let name_lower = name.to_lowercase();
        self.headers.retain(|(n, _)| n.to_lowercase() != name_lower);
        self.headers.push((name, value));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let name_lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| n.to_lowercase() == name_lower)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn has_request_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    method: HttpMethod,
    path: ApiPath,
    headers: HttpHeaders,
    body: Option<Vec<u8>>,
    timeout_ms: u64,
    request_id: String,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: ApiPath) -> Self {
        Self {
            method,
            path,
            headers: HttpHeaders::new(),
            body: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn get(path: ApiPath) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: ApiPath) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: ApiPath) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn delete(path: ApiPath) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, HttpError> {
        if !self.method.has_request_body() {
            return Err(HttpError::InvalidRequest {
                reason: format!("{} requests cannot have a body", self.method.as_str()),
            });
        }

        let body = serde_json::to_vec(value).map_err(|e| HttpError::SerializationError {
            message: e.to_string(),
        })?;

        if body.len() > MAX_REQUEST_BODY_SIZE {
            return Err(HttpError::BodyTooLarge {
                size: body.len(),
                max: MAX_REQUEST_BODY_SIZE,
            });
        }

        self.headers.insert("Content-Type", "application/json")?;
        self.body = Some(body);
        Ok(self)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Result<Self, HttpError> {
        if timeout_ms == 0 {
            return Err(HttpError::InvalidRequest {
                reason: "timeout cannot be zero".to_string(),
            });
        }
        if timeout_ms > MAX_TIMEOUT_MS {
            return Err(HttpError::InvalidRequest {
                reason: format!("timeout exceeds maximum of {MAX_TIMEOUT_MS}ms"),
            });
        }
        self.timeout_ms = timeout_ms;
        Ok(self)
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &ApiPath {
        &self.path
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Body decoded as JSON, `None` when absent or not JSON.
    pub fn body_json(&self) -> Option<serde_json::Value> {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum HttpError {
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("request body too large: {size} bytes exceeds maximum of {max} bytes")]
    BodyTooLarge { size: usize, max: usize },

    #[error("serialization error: {message}")]
    SerializationError { message: String },

    #[error("connection failed to {host}: {message}")]
    ConnectionError { host: String, message: String },

    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64, request_id: String },

    #[error("HTTP error {status}: {message}")]
    HttpStatus {
        status: u16,
        message: String,
        request_id: String,
    },

    #[error("request cancelled")]
    Cancelled { request_id: String },

    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String, request_id: String },

    #[error("no handler for {method} {path}")]
    UnexpectedRequest { method: HttpMethod, path: String },
}

impl HttpError {
    pub fn is_retryable(&self) -> bool {
        match self {
            HttpError::Timeout { .. } | HttpError::ConnectionError { .. } => true,
            HttpError::HttpStatus { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            HttpError::Timeout { request_id, .. }
            | HttpError::HttpStatus { request_id, .. }
            | HttpError::Cancelled { request_id }
            | HttpError::InvalidResponse { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    headers: HttpHeaders,
    body: Vec<u8>,
    request_id: String,
}

impl HttpResponse {
    pub fn new(status: u16, headers: HttpHeaders, body: Vec<u8>, request_id: String) -> Self {
        Self {
            status,
            headers,
            body,
            request_id,
        }
    }

    /// Response with a JSON body for the given request.
    pub fn json_for(request: &HttpRequest, status: u16, body: &serde_json::Value) -> Self {
        let mut headers = HttpHeaders::new();
        headers.insert("Content-Type", "application/json").ok();
        let bytes = match body {
            serde_json::Value::Null => Vec::new(),
            other => serde_json::to_vec(other).unwrap_or_default(),
        };
        Self::new(status, headers, bytes, request.request_id().to_string())
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::InvalidResponse {
            reason: format!("failed to parse JSON: {e}"),
            request_id: self.request_id.clone(),
        })
    }

    /// Like [`json`](Self::json) but an empty body, a bare `""` or an empty
    /// object decode to `None` instead of failing.
    pub fn json_opt<T: DeserializeOwned>(&self) -> Result<Option<T>, HttpError> {
        if self.is_blank() {
            return Ok(None);
        }
        self.json().map(Some)
    }

    fn is_blank(&self) -> bool {
        let text = String::from_utf8_lossy(&self.body);
        matches!(text.trim(), "" | "\"\"" | "{}" | "null")
    }
}

pub type HttpResult = Result<HttpResponse, HttpError>;

/// Transport the shell provides. Retries, auth and connection handling all
/// live behind this seam; the store only sees one result per request.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> HttpResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_validation_empty() {
        assert!(ApiPath::new("").is_err());
    }

    #[test]
    fn test_path_validation_relative() {
        let result = ApiPath::new("api/cases");
        assert!(matches!(result, Err(HttpError::InvalidPath { .. })));
    }

    #[test]
    fn test_path_validation_authority() {
        assert!(ApiPath::new("//evil.example.com/api").is_err());
    }

    #[test]
    fn test_path_validation_traversal() {
        assert!(ApiPath::new("/api/../admin").is_err());
    }

    #[test]
    fn test_path_validation_crlf() {
        assert!(ApiPath::new("/api/cases\r\nHost: x").is_err());
    }

    #[test]
    fn test_path_validation_too_long() {
        let long = format!("/{}", "a".repeat(MAX_PATH_LENGTH));
        assert!(ApiPath::new(long).is_err());
    }

    #[test]
    fn test_query_appended() {
        let path = ApiPath::new("/api/cases")
            .unwrap()
            .with_query("archived", "true");
        assert_eq!(path.as_str(), "/api/cases?archived=true");
        assert_eq!(path.route(), "/api/cases");
        assert_eq!(path.query(), Some("archived=true"));

        let path = path.with_query("q", "a b&c");
        assert_eq!(path.as_str(), "/api/cases?archived=true&q=a+b%26c");
    }

    #[test]
    fn test_join_onto_base() {
        let base = Url::parse("https://app.example.com/some/page").unwrap();
        let url = ApiPath::new("/api/cases/4/scores")
            .unwrap()
            .join_onto(&base)
            .unwrap();
        assert_eq!(url.as_str(), "https://app.example.com/api/cases/4/scores");
    }

    #[test]
    fn test_join_onto_rejects_opaque_base() {
        let base = Url::parse("mailto:someone@example.com").unwrap();
        assert!(ApiPath::new("/api/cases").unwrap().join_onto(&base).is_err());
    }

    #[test]
    fn test_header_case_insensitive_dedup() {
        let mut headers = HttpHeaders::new();
        headers.insert("Accept", "text/html").unwrap();
        headers.insert("accept", "application/json").unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("ACCEPT"), Some("application/json"));
    }

    #[test]
    fn test_header_crlf_injection() {
        let mut headers = HttpHeaders::new();
        assert!(headers.insert("X-Custom", "value\r\nEvil: header").is_err());
    }

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::put(ApiPath::new("/api/cases/1").unwrap())
            .with_json(&serde_json::json!({"case_name": "renamed"}))
            .unwrap()
            .with_timeout_ms(5000)
            .unwrap();

        assert_eq!(request.method(), HttpMethod::Put);
        assert_eq!(request.timeout_ms(), 5000);
        assert_eq!(request.headers().get("content-type"), Some("application/json"));
        assert_eq!(request.body_json().unwrap()["case_name"], "renamed");
    }

    #[test]
    fn test_body_on_get_fails() {
        let result = HttpRequest::get(ApiPath::new("/api/cases").unwrap())
            .with_json(&serde_json::json!({}));
        assert!(matches!(result, Err(HttpError::InvalidRequest { .. })));
    }

    #[test]
    fn test_timeout_validation() {
        let request = HttpRequest::get(ApiPath::new("/api/cases").unwrap());
        assert!(request.clone().with_timeout_ms(0).is_err());
        assert!(request.with_timeout_ms(MAX_TIMEOUT_MS + 1).is_err());
    }

    #[test]
    fn test_method_properties() {
        assert!(HttpMethod::Put.has_request_body());
        assert!(!HttpMethod::Delete.has_request_body());
    }

    #[test]
    fn test_error_retryable() {
        assert!(HttpError::Timeout {
            timeout_ms: 1000,
            request_id: "x".into()
        }
        .is_retryable());

        assert!(HttpError::HttpStatus {
            status: 503,
            message: "x".into(),
            request_id: "y".into(),
        }
        .is_retryable());

        assert!(!HttpError::HttpStatus {
            status: 400,
            message: "x".into(),
            request_id: "y".into(),
        }
        .is_retryable());
    }

    #[test]
    fn test_response_json_opt_blank_bodies() {
        let request = HttpRequest::delete(ApiPath::new("/api/cases/1").unwrap());
        for body in [&b""[..], b"  ", b"\"\"", b"{}", b"null"] {
            let response =
                HttpResponse::new(200, HttpHeaders::new(), body.to_vec(), "r".into());
            let parsed: Option<serde_json::Value> = response.json_opt().unwrap();
            assert!(parsed.is_none());
        }

        let response = HttpResponse::json_for(&request, 200, &serde_json::json!({"id": 3}));
        let parsed: Option<serde_json::Value> = response.json_opt().unwrap();
        assert_eq!(parsed.unwrap()["id"], 3);
        assert_eq!(response.request_id(), request.request_id());
    }

    #[test]
    fn test_response_json_parse_failure() {
        let response = HttpResponse::new(200, HttpHeaders::new(), b"<html>".to_vec(), "r".into());
        let parsed: Result<serde_json::Value, _> = response.json();
        assert!(matches!(parsed, Err(HttpError::InvalidResponse { .. })));
    }
}
