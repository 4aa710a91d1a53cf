use reqwest::{Method, Url};
use thiserror::Error;

use super::models::EnqueueRequest;

const MAX_ID_LEN: usize = 128;
const MAX_HEADERS: usize = 50;
const MAX_HEADER_VALUE_BYTES: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum EnqueueValidationError {
    #[error("url must be an absolute http/https url")]
    InvalidUrl,
    #[error("method '{0}' is not a valid HTTP method")]
    InvalidMethod(String),
    #[error("id must be between 1 and 128 characters")]
    InvalidId,
    #[error("headers exceed limit of 50")]
    HeaderLimitExceeded,
    #[error("header '{0}' value exceeds 8192 bytes")]
    HeaderValueTooLarge(String),
    #[error("idempotency_key must not be empty when present")]
    EmptyIdempotencyKey,
}

pub fn validate_enqueue(request: &EnqueueRequest) -> Result<(), EnqueueValidationError> {
    match Url::parse(&request.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => return Err(EnqueueValidationError::InvalidUrl),
    }

    if Method::from_bytes(request.method.to_uppercase().as_bytes()).is_err() {
        return Err(EnqueueValidationError::InvalidMethod(request.method.clone()));
    }

    if let Some(id) = &request.id {
        if id.is_empty() || id.len() > MAX_ID_LEN {
            return Err(EnqueueValidationError::InvalidId);
        }
    }

    if request.headers.len() > MAX_HEADERS {
        return Err(EnqueueValidationError::HeaderLimitExceeded);
    }

    for (key, value) in &request.headers {
        if value.len() > MAX_HEADER_VALUE_BYTES {
            return Err(EnqueueValidationError::HeaderValueTooLarge(key.clone()));
        }
    }

    if request.idempotency_key.as_deref() == Some("") {
        return Err(EnqueueValidationError::EmptyIdempotencyKey);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: serde_json::Value) -> EnqueueRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_accepts_minimal_request() {
        let req = request(json!({"url": "https://api.example.com/orders"}));
        assert_eq!(req.method, "POST");
        assert!(validate_enqueue(&req).is_ok());
    }

    #[test]
    fn test_rejects_non_http_url() {
        let req = request(json!({"url": "ftp://example.com/file"}));
        assert!(matches!(validate_enqueue(&req), Err(EnqueueValidationError::InvalidUrl)));

        let req = request(json!({"url": "/relative/path"}));
        assert!(matches!(validate_enqueue(&req), Err(EnqueueValidationError::InvalidUrl)));
    }

    #[test]
    fn test_rejects_bad_method() {
        let req = request(json!({"url": "https://x.test/", "method": "NOT A METHOD"}));
        assert!(matches!(
            validate_enqueue(&req),
            Err(EnqueueValidationError::InvalidMethod(_))
        ));
    }

    #[test]
    fn test_rejects_empty_id_and_key() {
        let req = request(json!({"url": "https://x.test/", "id": ""}));
        assert!(matches!(validate_enqueue(&req), Err(EnqueueValidationError::InvalidId)));

        let req = request(json!({"url": "https://x.test/", "idempotency_key": ""}));
        assert!(matches!(
            validate_enqueue(&req),
            Err(EnqueueValidationError::EmptyIdempotencyKey)
        ));
    }

    #[test]
    fn test_rejects_oversized_header_value() {
        let req = request(json!({
            "url": "https://x.test/",
            "headers": {"X-Big": "a".repeat(MAX_HEADER_VALUE_BYTES + 1)}
        }));
        assert!(matches!(
            validate_enqueue(&req),
            Err(EnqueueValidationError::HeaderValueTooLarge(name)) if name == "X-Big"
        ));
    }
}
