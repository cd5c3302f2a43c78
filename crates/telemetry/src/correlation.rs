use axum::http::{HeaderMap, HeaderValue};
use uuid::Uuid;

/// HTTP header name for correlation ID
pub const X_CORRELATION_ID: &str = "x-correlation-id";

/// Accepted as a fallback when no correlation ID header is present
pub const X_REQUEST_ID: &str = "x-request-id";

const MAX_CORRELATION_ID_LEN: usize = 128;

pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Take the caller's correlation ID if it is usable as a header value,
/// otherwise mint a new one
pub fn extract_or_generate_correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(X_CORRELATION_ID)
        .or_else(|| headers.get(X_REQUEST_ID))
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.len() <= MAX_CORRELATION_ID_LEN)
        .map(|s| s.to_string())
        .unwrap_or_else(generate_correlation_id)
}

/// Correlation ID stored in request extensions
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.0).ok()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_is_uuid() {
        let id = generate_correlation_id();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_prefers_correlation_header() {
        let mut headers = HeaderMap::new();
        headers.insert(X_CORRELATION_ID, HeaderValue::from_static("correlation-123"));
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("request-456"));
        assert_eq!(extract_or_generate_correlation_id(&headers), "correlation-123");
    }

    #[test]
    fn test_falls_back_to_request_id() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("request-456"));
        assert_eq!(extract_or_generate_correlation_id(&headers), "request-456");
    }

    #[test]
    fn test_blank_or_oversized_ids_are_replaced() {
        let mut headers = HeaderMap::new();
        headers.insert(X_CORRELATION_ID, HeaderValue::from_static("   "));
        let id = extract_or_generate_correlation_id(&headers);
        assert!(Uuid::parse_str(&id).is_ok());

        let long = "a".repeat(MAX_CORRELATION_ID_LEN + 1);
        let mut headers = HeaderMap::new();
        headers.insert(X_CORRELATION_ID, HeaderValue::from_str(&long).unwrap());
        let id = extract_or_generate_correlation_id(&headers);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_correlation_id_wrapper() {
        let id = CorrelationId("test-id".to_string());
        assert_eq!(id.as_str(), "test-id");
        assert_eq!(id.to_string(), "test-id");
        assert_eq!(id.header_value().unwrap(), "test-id");
    }
}
