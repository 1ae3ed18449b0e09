//! Anthropic Messages surface

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, error, info};

use crate::api::endpoints::{AppState, generate, parse_body, sse_response};
use crate::api::error::{ApiError, Surface};
use crate::conversion::request_converter::{
    build_prompt, count_claude_tokens, estimate_tokens, validate_generation, validate_messages,
};
use crate::conversion::response_converter::{
    claude_message, claude_model, claude_model_list, claude_stream, new_message_id,
};
use crate::core::provider::GenerateOptions;
use crate::models::claude::{
    ClaudeMessagesRequest, ClaudeModel, ClaudeModelList, ClaudeTokenCountRequest,
};

const SURFACE: Surface = Surface::Claude;

pub async fn list_models() -> Json<ClaudeModelList> {
    Json(claude_model_list())
}

pub async fn get_model(Path(model_id): Path<String>) -> Json<ClaudeModel> {
    Json(claude_model(&model_id))
}

/// POST /claude/v1/messages
pub async fn create_message(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: ClaudeMessagesRequest = parse_body(SURFACE, &body)?;

    info!(
        model = %request.model,
        stream = request.stream,
        messages = request.messages.len(),
        "Incoming Claude messages request"
    );

    validate_messages(&request.messages).map_err(|e| ApiError::validation(SURFACE, e))?;
    validate_generation(request.max_tokens, request.temperature)
        .map_err(|e| ApiError::validation(SURFACE, e))?;

    let prompt = build_prompt(&request.messages, &request.system_text());
    if prompt.is_empty() {
        return Err(ApiError::bad_request(SURFACE, "no valid content in messages"));
    }

    let provider = state.provider(SURFACE)?;
    let options = GenerateOptions {
        model: Some(request.model.clone()).filter(|m| !m.is_empty()),
    };
    let timeout = state.request_timeout();
    let id = new_message_id();

    if request.stream {
        let input_tokens = estimate_tokens(&prompt);
        let reply = async move {
            generate(provider, prompt, options, timeout)
                .await
                .map(|response| response.text)
        };
        return Ok(sse_response(claude_stream(
            reply,
            id,
            request.model,
            input_tokens,
        )));
    }

    let response = generate(provider, prompt.clone(), options, timeout)
        .await
        .map_err(|e| {
            error!(model = %request.model, error = %e, "Generation failed");
            ApiError::provider(SURFACE, e)
        })?;
    debug!(id = %id, chars = response.text.len(), "Claude reply ready");

    Ok(Json(claude_message(&id, &response.text, &request.model, &prompt)).into_response())
}

/// POST /claude/v1/messages/count_tokens
pub async fn count_tokens(body: Bytes) -> Result<Response, ApiError> {
    let request: ClaudeTokenCountRequest = parse_body(SURFACE, &body)?;
    let input_tokens = count_claude_tokens(&request);
    debug!(model = %request.model, input_tokens, "Counted tokens");
    Ok(Json(json!({ "input_tokens": input_tokens })).into_response())
}
