//! Google Gemini v1beta surface
//!
//! `generateContent`, `streamGenerateContent` and `countTokens` share one
//! route, `/gemini/v1beta/models/{model}:{action}`; the path segment is split
//! on the colon here.

use std::convert::Infallible;

use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{HeaderValue, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use crate::api::endpoints::{AppState, generate, parse_body, sse_response};
use crate::api::error::{ApiError, Surface};
use crate::conversion::request_converter::{estimate_tokens, gemini_prompt, validate_generation};
use crate::conversion::response_converter::{
    gemini_model_by_id, gemini_model_list, gemini_response, gemini_stream,
};
use crate::core::provider::GenerateOptions;
use crate::models::gemini::{GeminiGenerateRequest, GeminiModel, GeminiModelList};

const SURFACE: Surface = Surface::Gemini;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Generate,
    StreamGenerate,
    CountTokens,
}

impl Action {
    fn parse(action: &str) -> Option<Self> {
        match action {
            "generateContent" => Some(Action::Generate),
            "streamGenerateContent" => Some(Action::StreamGenerate),
            "countTokens" => Some(Action::CountTokens),
            _ => None,
        }
    }
}

/// Query parameters accepted on the model action route
#[derive(Debug, Default, Deserialize)]
pub struct ActionParams {
    /// `sse` switches streaming to `data:` framing
    pub alt: Option<String>,
}

pub async fn list_models(State(state): State<AppState>) -> Json<GeminiModelList> {
    Json(gemini_model_list(&state.models()))
}

pub async fn get_model(
    State(state): State<AppState>,
    Path(model): Path<String>,
) -> Result<Json<GeminiModel>, ApiError> {
    gemini_model_by_id(&state.models(), &model)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(SURFACE, format!("model not found: {model}")))
}

/// POST /gemini/v1beta/models/{model}:{action}
pub async fn model_action(
    State(state): State<AppState>,
    Path(model_action): Path<String>,
    Query(params): Query<ActionParams>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let (model, action) = model_action
        .split_once(':')
        .and_then(|(model, action)| Action::parse(action).map(|a| (model.to_string(), a)))
        .ok_or_else(|| {
            ApiError::bad_request(SURFACE, format!("unsupported model action: {model_action}"))
        })?;

    let request: GeminiGenerateRequest = parse_body(SURFACE, &body)?;

    info!(
        model = %model,
        action = ?action,
        contents = request.contents.len(),
        "Incoming Gemini request"
    );

    if let Some(config) = &request.generation_config {
        validate_generation(config.max_output_tokens, config.temperature)
            .map_err(|e| ApiError::validation(SURFACE, e))?;
    }

    let prompt = gemini_prompt(&request);

    if action == Action::CountTokens {
        return Ok(Json(json!({ "totalTokens": estimate_tokens(&prompt) })).into_response());
    }

    if prompt.is_empty() {
        return Err(ApiError::bad_request(SURFACE, "empty content"));
    }

    let provider = state.provider(SURFACE)?;
    let options = GenerateOptions::with_model(model.clone());
    let timeout = state.request_timeout();

    if action == Action::StreamGenerate {
        let reply = {
            let prompt = prompt.clone();
            async move {
                generate(provider, prompt, options, timeout)
                    .await
                    .map(|response| response.text)
            }
        };
        let events = gemini_stream(reply, model, prompt);

        if params.alt.as_deref() == Some("sse") {
            return Ok(sse_response(events));
        }

        let lines = events.map(|frame| Ok::<_, Infallible>(Bytes::from(frame.data + "\n")));
        let mut response = Body::from_stream(lines).into_response();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        return Ok(response);
    }

    let response = generate(provider, prompt.clone(), options, timeout)
        .await
        .map_err(|e| {
            error!(model = %model, error = %e, "Generation failed");
            ApiError::provider(SURFACE, e)
        })?;
    debug!(model = %model, chars = response.text.len(), "Gemini reply ready");

    Ok(Json(gemini_response(&response.text, &model, &prompt)).into_response())
}
