//! OpenAI-compatible chat completions surface
//!
//! Served under `/openai/v1` and, for SDKs that only let you swap the host,
//! under `/v1`.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, info};

use crate::api::endpoints::{AppState, generate, parse_body, sse_response};
use crate::api::error::{ApiError, Surface};
use crate::conversion::request_converter::{build_prompt, validate_generation, validate_messages};
use crate::conversion::response_converter::{openai_completion, openai_model_list, openai_stream};
use crate::core::provider::GenerateOptions;
use crate::models::openai::{OpenAIChatCompletionRequest, OpenAIModelList};

const SURFACE: Surface = Surface::OpenAI;

/// GET /models
pub async fn list_models(State(state): State<AppState>) -> Json<OpenAIModelList> {
    Json(openai_model_list(&state.models()))
}

/// POST /chat/completions
pub async fn chat_completions(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: OpenAIChatCompletionRequest = parse_body(SURFACE, &body)?;

    info!(
        model = %request.model,
        stream = request.stream,
        messages = request.messages.len(),
        "Incoming OpenAI chat request"
    );

    validate_messages(&request.messages).map_err(|e| ApiError::validation(SURFACE, e))?;
    validate_generation(request.max_tokens, request.temperature)
        .map_err(|e| ApiError::validation(SURFACE, e))?;

    let prompt = build_prompt(&request.messages, "");
    if prompt.is_empty() {
        return Err(ApiError::bad_request(SURFACE, "no valid content in messages"));
    }
    debug!(prompt_chars = prompt.len(), "Built prompt");

    let provider = state.provider(SURFACE)?;
    let options = GenerateOptions {
        model: Some(request.model.clone()).filter(|m| !m.is_empty()),
    };
    let timeout = state.request_timeout();

    if request.stream {
        let reply = async move {
            generate(provider, prompt, options, timeout)
                .await
                .map(|response| response.text)
        };
        return Ok(sse_response(openai_stream(reply, request.model)));
    }

    let response = generate(provider, prompt, options, timeout)
        .await
        .map_err(|e| {
            error!(model = %request.model, error = %e, "Generation failed");
            ApiError::provider(SURFACE, e)
        })?;

    Ok(Json(openai_completion(&response.text, &request.model)).into_response())
}

#[cfg(test)]
mod tests {
    use crate::api::endpoints::testing::*;
    use axum::http::StatusCode;
    use serde_json::json;

    fn chat_body(stream: bool) -> String {
        json!({
            "model": "gpt-3.5-turbo",
            "stream": stream,
            "messages": [
                {"role": "system", "content": "You are terse."},
                {"role": "user", "content": "Say hi"}
            ]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_chat_completion() {
        let provider = MockProvider::replying("Hi!");
        let router = router_with(Some(provider.clone()));

        let response = send(router, "POST", "/openai/v1/chat/completions", &chat_body(false)).await;
        assert_eq!(response.status, StatusCode::OK);

        let body = response.json();
        assert_eq!(body["object"], "chat.completion");
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["choices"][0]["message"]["content"], "Hi!");
        assert_eq!(body["choices"][0]["finish_reason"], "stop");

        let (prompt, model) = provider.last_call().unwrap();
        assert_eq!(prompt, "System: You are terse.\nUser: Say hi");
        assert_eq!(model, "gpt-3.5-turbo");
    }

    #[tokio::test]
    async fn test_v1_alias_serves_the_same_surface() {
        let router = router_with(Some(MockProvider::replying("alias")));
        let response = send(router, "POST", "/v1/chat/completions", &chat_body(false)).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json()["choices"][0]["message"]["content"], "alias");
    }

    #[tokio::test]
    async fn test_streaming_frames() {
        let router = router_with(Some(MockProvider::replying("Hello brave world")));
        let response = send(router, "POST", "/openai/v1/chat/completions", &chat_body(true)).await;

        assert_eq!(response.status, StatusCode::OK);
        assert!(response.content_type.starts_with("text/event-stream"));

        let frames = response.sse_frames();
        assert_eq!(frames.len(), 5);
        assert!(frames.iter().all(|(event, _)| event.is_none()));

        let text: String = frames[..3]
            .iter()
            .map(|(_, data)| {
                let chunk: serde_json::Value = serde_json::from_str(data).unwrap();
                assert_eq!(chunk["object"], "chat.completion.chunk");
                chunk["choices"][0]["delta"]["content"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(text, "Hello brave world");

        let last: serde_json::Value = serde_json::from_str(&frames[3].1).unwrap();
        assert_eq!(last["choices"][0]["finish_reason"], "stop");
        assert_eq!(frames[4].1, "[DONE]");
    }

    #[tokio::test]
    async fn test_malformed_json_is_rejected() {
        let router = router_with(Some(MockProvider::replying("unused")));
        let response = send(router, "POST", "/openai/v1/chat/completions", "{not json").await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        let body = response.json();
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert!(
            body["error"]["message"]
                .as_str()
                .unwrap()
                .starts_with("invalid request body")
        );
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let router = router_with(Some(MockProvider::replying("unused")));
        let response = send(
            router.clone(),
            "POST",
            "/openai/v1/chat/completions",
            r#"{"model": "gpt-4", "messages": []}"#,
        )
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json()["error"]["message"],
            "messages array cannot be empty"
        );

        let response = send(
            router,
            "POST",
            "/openai/v1/chat/completions",
            r#"{"model": "gpt-4", "temperature": 3, "messages": [{"role": "user", "content": "hi"}]}"#,
        )
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json()["error"]["message"],
            "temperature must be between 0 and 2"
        );
    }

    #[tokio::test]
    async fn test_no_provider_is_unavailable() {
        let response = send(
            router_with(None),
            "POST",
            "/openai/v1/chat/completions",
            &chat_body(false),
        )
        .await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.json()["error"]["type"], "api_error");
    }

    #[tokio::test]
    async fn test_provider_failure_is_internal_error() {
        let router = router_with(Some(MockProvider::failing()));
        let response = send(router, "POST", "/openai/v1/chat/completions", &chat_body(false)).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.json()["error"]["message"],
            "generate failed with status: 502"
        );
    }

    #[tokio::test]
    async fn test_streaming_failure_becomes_error_frame() {
        let router = router_with(Some(MockProvider::failing()));
        let response = send(router, "POST", "/v1/chat/completions", &chat_body(true)).await;
        assert_eq!(response.status, StatusCode::OK);

        let frames = response.sse_frames();
        assert_eq!(frames.len(), 1);
        let error: serde_json::Value = serde_json::from_str(&frames[0].1).unwrap();
        assert_eq!(error["error"]["type"], "api_error");
    }

    #[tokio::test]
    async fn test_list_models() {
        let response = send(router_with(None), "GET", "/v1/models", "").await;
        assert_eq!(response.status, StatusCode::OK);
        let body = response.json();
        assert_eq!(body["object"], "list");
        assert_eq!(body["data"][0]["object"], "model");
        assert_eq!(body["data"][0]["owned_by"], "google");
    }
}
