//! Error responses in the flavour of each API surface

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::conversion::request_converter::ValidationError;
use crate::conversion::response_converter::{claude_error, openai_error};
use crate::core::constants::error_type;
use crate::core::provider::ProviderError;

/// Which surface an error is reported on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    OpenAI,
    Claude,
    Gemini,
}

/// An error rendered as the JSON error body its surface's SDKs expect
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiError {
    pub surface: Surface,
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(
        surface: Surface,
        status: StatusCode,
        kind: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            surface,
            status,
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request(surface: Surface, message: impl Into<String>) -> Self {
        Self::new(
            surface,
            StatusCode::BAD_REQUEST,
            error_type::INVALID_REQUEST,
            message,
        )
    }

    /// Malformed request body
    pub fn invalid_body(surface: Surface, err: &serde_json::Error) -> Self {
        match surface {
            Surface::Claude => Self::bad_request(surface, "Invalid JSON body"),
            _ => Self::bad_request(surface, format!("invalid request body: {err}")),
        }
    }

    pub fn validation(surface: Surface, err: ValidationError) -> Self {
        Self::bad_request(surface, err.to_string())
    }

    pub fn not_found(surface: Surface, message: impl Into<String>) -> Self {
        Self::new(surface, StatusCode::NOT_FOUND, "not_found_error", message)
    }

    /// No provider is selected, typically because initialization failed
    pub fn unavailable(surface: Surface) -> Self {
        Self::new(
            surface,
            StatusCode::SERVICE_UNAVAILABLE,
            error_type::API,
            "no provider available",
        )
    }

    pub fn provider(surface: Surface, err: ProviderError) -> Self {
        Self::new(
            surface,
            StatusCode::INTERNAL_SERVER_ERROR,
            error_type::API,
            err.to_string(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.surface {
            Surface::Claude => claude_error(self.kind, &self.message),
            Surface::OpenAI | Surface::Gemini => openai_error(self.kind, &self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::{Value, json};

    async fn body_of(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_claude_flavoured_body() {
        let (status, body) = body_of(ApiError::bad_request(Surface::Claude, "nope")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"type": "error", "error": {"type": "invalid_request_error", "message": "nope"}})
        );
    }

    #[tokio::test]
    async fn test_openai_flavoured_body() {
        let (status, body) = body_of(ApiError::unavailable(Surface::OpenAI)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["type"], "api_error");
        assert_eq!(body["error"]["message"], "no provider available");
    }

    #[tokio::test]
    async fn test_provider_error_is_internal() {
        let (status, body) = body_of(ApiError::provider(
            Surface::Gemini,
            ProviderError::Timeout(300),
        ))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "request timed out after 300s");
    }
}
