use actix_web::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;

/// Mirror of the backend's JSON error body, decoded without backend types.
#[derive(Debug, Deserialize)]
pub struct ErrorBodyLike {
    pub error: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Map<String, Value>>,
    pub status_code: u16,
}

/// Assert that `body` is a well-formed error body for `expected_kind` and
/// that the transport status agrees with the body. Returns the decoded body
/// for further checks.
pub fn assert_error_body(
    status: StatusCode,
    body: &[u8],
    expected_kind: &str,
    expected_status: StatusCode,
) -> ErrorBodyLike {
    assert_eq!(status, expected_status, "unexpected HTTP status");
    let parsed: ErrorBodyLike = serde_json::from_slice(body).unwrap_or_else(|e| {
        panic!(
            "error body is not valid JSON ({e}): {}",
            String::from_utf8_lossy(body)
        )
    });
    assert_eq!(parsed.error, expected_kind, "unexpected error kind");
    assert_eq!(parsed.status_code, expected_status.as_u16(), "status_code field");
    assert!(!parsed.message.is_empty(), "message must not be empty");
    if expected_kind == "INTERNAL" {
        assert!(parsed.details.is_none(), "INTERNAL errors must not carry details");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_body() {
        let body = br#"{"error":"NOT_FOUND","message":"gone","details":{"resourceId":42},"status_code":404}"#;
        let parsed = assert_error_body(StatusCode::NOT_FOUND, body, "NOT_FOUND", StatusCode::NOT_FOUND);
        assert_eq!(parsed.details.unwrap()["resourceId"], 42);
    }

    #[test]
    #[should_panic(expected = "INTERNAL errors must not carry details")]
    fn rejects_internal_details() {
        let body = br#"{"error":"INTERNAL","message":"x","details":{"k":1},"status_code":500}"#;
        assert_error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            body,
            "INTERNAL",
            StatusCode::INTERNAL_SERVER_ERROR,
        );
    }
}
