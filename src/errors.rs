// src/errors.rs
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Image size {actual} bytes exceeds maximum limit of {limit} bytes")]
    SizeLimitExceeded { actual: usize, limit: usize },

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl EditorError {
    /// Short label used in the `error` field of JSON error bodies.
    pub fn label(&self) -> &'static str {
        match self {
            EditorError::Validation(_) => "Validation error",
            EditorError::Decode(_) => "Image decoding error",
            EditorError::SizeLimitExceeded { .. } => "File too large",
            EditorError::ExternalService(_) => "AI service error",
            EditorError::Io(_) => "Storage error",
            EditorError::Serialization(_) => "Data processing error",
            EditorError::NotFound(_) => "Not found",
        }
    }
}

impl From<std::io::Error> for EditorError {
    fn from(e: std::io::Error) -> Self {
        EditorError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for EditorError {
    fn from(e: serde_json::Error) -> Self {
        EditorError::Serialization(e.to_string())
    }
}

impl ResponseError for EditorError {
    fn status_code(&self) -> StatusCode {
        match self {
            EditorError::Validation(_) | EditorError::Decode(_) => StatusCode::BAD_REQUEST,
            EditorError::SizeLimitExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            EditorError::ExternalService(_) => StatusCode::SERVICE_UNAVAILABLE,
            EditorError::NotFound(_) => StatusCode::NOT_FOUND,
            EditorError::Io(_) | EditorError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.label(),
            "message": self.to_string()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(
            EditorError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EditorError::SizeLimitExceeded { actual: 2, limit: 1 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            EditorError::ExternalService("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            EditorError::NotFound("r".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn size_limit_message_names_both_sizes() {
        let msg = EditorError::SizeLimitExceeded { actual: 20, limit: 10 }.to_string();
        assert!(msg.contains("20"));
        assert!(msg.contains("10"));
    }
}
