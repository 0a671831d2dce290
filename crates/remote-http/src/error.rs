//! Mapping of HTTP failures onto the core remote error taxonomy.

use herdbook_core::RemoteError;
use serde::Deserialize;

/// Structured error body returned by the backend.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub code: String,
    pub message: String,
}

/// Classify a non-success response body into the remote error taxonomy.
///
/// The server answered, so this is a rejection; transport failures are
/// mapped separately from the reqwest error.
pub fn classify_response_error(status: u16, body: &str) -> RemoteError {
    if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(body) {
        return RemoteError::rejected(status, format!("{}: {}", error.code, error.message));
    }
    RemoteError::rejected(status, format!("Request failed: {}", body))
}

pub(crate) fn transport_error(err: reqwest::Error) -> RemoteError {
    RemoteError::unreachable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_body_is_decoded() {
        let err = classify_response_error(
            422,
            r#"{"code":"VALIDATION_FAILED","message":"animal_id is required"}"#,
        );
        assert_eq!(err.status_code(), Some(422));
        assert!(err.to_string().contains("VALIDATION_FAILED"));
    }

    #[test]
    fn opaque_body_still_carries_status() {
        let err = classify_response_error(500, "<html>oops</html>");
        assert_eq!(err.status_code(), Some(500));
        assert!(!err.is_unreachable());
    }
}
