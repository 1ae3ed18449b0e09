//! Backend reply to API response conversion
//!
//! The backend answers with one block of text. This module renders it in the
//! caller's wire format, either as a single body or as a simulated stream
//! that replays the text word by word.

use crate::core::constants::{content, delta as delta_const, error_type, event, object, role, stop};
use crate::core::provider::{ModelInfo, ProviderError};
use crate::models::claude::{
    ClaudeMessageResponse, ClaudeModel, ClaudeModelList, ClaudeTextBlock, ClaudeUsage,
};
use crate::models::gemini::{
    GeminiCandidate, GeminiContent, GeminiGenerateResponse, GeminiModel, GeminiModelList,
    GeminiPart, GeminiUsageMetadata,
};
use crate::models::openai::{
    OpenAIChatCompletionResponse, OpenAIChoice, OpenAIDelta, OpenAIMessage, OpenAIModel,
    OpenAIModelList, OpenAIStreamChoice, OpenAIStreamingChunk, OpenAIUsage,
};
use futures::Stream;
use serde::Serialize;
use serde_json::{Value, json};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error};

use crate::conversion::request_converter::estimate_tokens;

/// Pause between OpenAI and Claude stream chunks
pub const CHUNK_DELAY: Duration = Duration::from_millis(20);

/// Pause between Gemini stream chunks
pub const GEMINI_CHUNK_DELAY: Duration = Duration::from_millis(30);

/// Claude models advertised on `GET /claude/v1/models`: id, created_at, display name
const CLAUDE_MODELS: &[(&str, i64, &str)] = &[
    ("claude-3-5-sonnet-20240620", 1718841600, "Claude 3.5 Sonnet"),
    ("claude-3-opus-20240229", 1709164800, "Claude 3 Opus"),
    ("claude-3-7-sonnet-20250219", 1739923200, "Claude 3.7 Sonnet"),
];

const GENERATION_METHODS: &[&str] = &["generateContent", "streamGenerateContent"];

/// One frame of a simulated stream
///
/// `event` is the SSE event name; frames without one are sent as bare
/// `data:` lines (or NDJSON lines on the Gemini surface).
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub event: Option<&'static str>,
    pub data: String,
}

impl StreamEvent {
    pub fn data(payload: &impl Serialize) -> Self {
        Self {
            event: None,
            data: to_json(payload),
        }
    }

    pub fn named(name: &'static str, payload: &impl Serialize) -> Self {
        Self {
            event: Some(name),
            data: to_json(payload),
        }
    }

    fn raw(data: &str) -> Self {
        Self {
            event: None,
            data: data.to_string(),
        }
    }
}

fn to_json(payload: &impl Serialize) -> String {
    serde_json::to_string(payload).unwrap_or_else(|e| {
        error!("Failed to serialize stream payload: {}", e);
        "{}".to_string()
    })
}

/// Split text on single spaces, keeping each separator on the piece before it
///
/// Concatenating the pieces reproduces the input.
pub fn split_into_chunks(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split(' ').collect();
    let last = words.len() - 1;
    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            if i < last {
                format!("{word} ")
            } else {
                (*word).to_string()
            }
        })
        .collect()
}

/// `{"error": {...}}` body used by the OpenAI and Gemini surfaces
pub fn openai_error(kind: &str, message: &str) -> Value {
    json!({
        "error": {
            "message": message,
            "type": kind,
            "code": null
        }
    })
}

/// `{"type": "error", "error": {...}}` body used by the Claude surface
pub fn claude_error(kind: &str, message: &str) -> Value {
    json!({
        "type": event::ERROR,
        "error": {
            "type": kind,
            "message": message
        }
    })
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ---------------------------------------------------------------------------
// OpenAI
// ---------------------------------------------------------------------------

pub fn openai_model_list(models: &[ModelInfo]) -> OpenAIModelList {
    OpenAIModelList {
        object: object::LIST.to_string(),
        data: models
            .iter()
            .map(|m| OpenAIModel {
                id: m.id.to_string(),
                object: object::MODEL.to_string(),
                created: m.created,
                owned_by: m.owned_by.to_string(),
            })
            .collect(),
    }
}

pub fn openai_completion(text: &str, model: &str) -> OpenAIChatCompletionResponse {
    OpenAIChatCompletionResponse {
        id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
        object: object::CHAT_COMPLETION.to_string(),
        created: unix_now(),
        model: model.to_string(),
        choices: vec![OpenAIChoice {
            index: 0,
            message: OpenAIMessage::new(role::ASSISTANT, text),
            finish_reason: Some(stop::STOP.to_string()),
        }],
        usage: OpenAIUsage::default(),
    }
}

fn openai_chunk(
    id: &str,
    created: i64,
    model: &str,
    delta: OpenAIDelta,
    finish_reason: Option<&str>,
) -> OpenAIStreamingChunk {
    OpenAIStreamingChunk {
        id: id.to_string(),
        object: object::CHAT_COMPLETION_CHUNK.to_string(),
        created,
        model: model.to_string(),
        choices: vec![OpenAIStreamChoice {
            index: 0,
            delta,
            finish_reason: finish_reason.map(str::to_string),
        }],
    }
}

/// `chat.completion.chunk` frames for the reply, then the stop chunk and
/// `[DONE]`
///
/// `reply` runs when the stream is first polled; its failure becomes a
/// single error frame.
pub fn openai_stream<F>(reply: F, model: String) -> impl Stream<Item = StreamEvent>
where
    F: Future<Output = Result<String, ProviderError>> + Send + 'static,
{
    async_stream::stream! {
        match reply.await {
            Err(e) => {
                error!(model = %model, error = %e, "Streaming generation failed");
                yield StreamEvent::data(&openai_error(error_type::API, &e.to_string()));
            }
            Ok(text) => {
                let id = format!("chatcmpl-{}", uuid::Uuid::new_v4().simple());
                let created = unix_now();

                for piece in split_into_chunks(&text) {
                    let delta = OpenAIDelta {
                        role: None,
                        content: Some(piece),
                    };
                    yield StreamEvent::data(&openai_chunk(&id, created, &model, delta, None));
                    tokio::time::sleep(CHUNK_DELAY).await;
                }

                yield StreamEvent::data(&openai_chunk(
                    &id,
                    created,
                    &model,
                    OpenAIDelta::default(),
                    Some(stop::STOP),
                ));
                yield StreamEvent::raw(event::DONE);
                debug!(model = %model, "OpenAI stream completed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Claude
// ---------------------------------------------------------------------------

pub fn claude_model_list() -> ClaudeModelList {
    let data: Vec<ClaudeModel> = CLAUDE_MODELS
        .iter()
        .map(|(id, created_at, display_name)| ClaudeModel {
            id: id.to_string(),
            model_type: object::MODEL.to_string(),
            created_at: *created_at,
            display_name: display_name.to_string(),
        })
        .collect();

    ClaudeModelList {
        first_id: data.first().map(|m| m.id.clone()),
        last_id: data.last().map(|m| m.id.clone()),
        has_more: false,
        data,
    }
}

/// Any requested model id is echoed back as available
pub fn claude_model(model_id: &str) -> ClaudeModel {
    ClaudeModel {
        id: model_id.to_string(),
        model_type: object::MODEL.to_string(),
        created_at: unix_now(),
        display_name: model_id.to_string(),
    }
}

pub fn new_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4())
}

pub fn claude_message(id: &str, text: &str, model: &str, prompt: &str) -> ClaudeMessageResponse {
    ClaudeMessageResponse {
        id: id.to_string(),
        message_type: object::MESSAGE.to_string(),
        role: role::ASSISTANT.to_string(),
        model: model.to_string(),
        content: vec![ClaudeTextBlock::new(text)],
        stop_reason: Some(stop::END_TURN.to_string()),
        stop_sequence: None,
        usage: ClaudeUsage {
            input_tokens: estimate_tokens(prompt),
            output_tokens: estimate_tokens(text),
        },
    }
}

/// Claude Messages SSE sequence for the reply
pub fn claude_stream<F>(
    reply: F,
    id: String,
    model: String,
    input_tokens: usize,
) -> impl Stream<Item = StreamEvent>
where
    F: Future<Output = Result<String, ProviderError>> + Send + 'static,
{
    async_stream::stream! {
        match reply.await {
            Err(e) => {
                error!(model = %model, error = %e, "Streaming generation failed");
                yield StreamEvent::named(event::ERROR, &claude_error(error_type::API, &e.to_string()));
            }
            Ok(text) => {
                let start = ClaudeMessageResponse {
                    id,
                    message_type: object::MESSAGE.to_string(),
                    role: role::ASSISTANT.to_string(),
                    model: model.clone(),
                    content: Vec::new(),
                    stop_reason: None,
                    stop_sequence: None,
                    usage: ClaudeUsage { input_tokens, output_tokens: 1 },
                };
                yield StreamEvent::named(
                    event::MESSAGE_START,
                    &json!({"type": event::MESSAGE_START, "message": start}),
                );
                yield StreamEvent::named(
                    event::CONTENT_BLOCK_START,
                    &json!({
                        "type": event::CONTENT_BLOCK_START,
                        "index": 0,
                        "content_block": {"type": content::TEXT, "text": ""}
                    }),
                );

                for piece in split_into_chunks(&text) {
                    yield StreamEvent::named(
                        event::CONTENT_BLOCK_DELTA,
                        &json!({
                            "type": event::CONTENT_BLOCK_DELTA,
                            "index": 0,
                            "delta": {"type": delta_const::TEXT, "text": piece}
                        }),
                    );
                    tokio::time::sleep(CHUNK_DELAY).await;
                }

                yield StreamEvent::named(
                    event::CONTENT_BLOCK_STOP,
                    &json!({"type": event::CONTENT_BLOCK_STOP, "index": 0}),
                );
                yield StreamEvent::named(
                    event::MESSAGE_DELTA,
                    &json!({
                        "type": event::MESSAGE_DELTA,
                        "delta": {"stop_reason": stop::END_TURN, "stop_sequence": null},
                        "usage": {"output_tokens": estimate_tokens(&text)}
                    }),
                );
                yield StreamEvent::named(event::MESSAGE_STOP, &json!({"type": event::MESSAGE_STOP}));
                debug!(model = %model, "Claude stream completed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

fn gemini_model(m: &ModelInfo) -> GeminiModel {
    GeminiModel {
        name: format!("models/{}", m.id),
        display_name: m.id.to_string(),
        supported_generation_methods: GENERATION_METHODS.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn gemini_model_list(models: &[ModelInfo]) -> GeminiModelList {
    GeminiModelList {
        models: models.iter().map(gemini_model).collect(),
    }
}

/// Catalogue entry for `id`, with or without the `models/` prefix
pub fn gemini_model_by_id(models: &[ModelInfo], id: &str) -> Option<GeminiModel> {
    let id = id.strip_prefix("models/").unwrap_or(id);
    models.iter().find(|m| m.id == id).map(gemini_model)
}

fn gemini_usage(prompt: &str, text: &str) -> GeminiUsageMetadata {
    let prompt_tokens = estimate_tokens(prompt);
    let candidate_tokens = estimate_tokens(text);
    GeminiUsageMetadata {
        prompt_token_count: prompt_tokens,
        candidates_token_count: candidate_tokens,
        total_token_count: prompt_tokens + candidate_tokens,
    }
}

fn gemini_text_candidate(text: &str, finish_reason: Option<&str>) -> GeminiCandidate {
    GeminiCandidate {
        index: 0,
        content: Some(GeminiContent {
            role: Some(role::MODEL.to_string()),
            parts: vec![GeminiPart::text(text)],
        }),
        finish_reason: finish_reason.map(str::to_string),
    }
}

pub fn gemini_response(text: &str, model: &str, prompt: &str) -> GeminiGenerateResponse {
    GeminiGenerateResponse {
        candidates: vec![gemini_text_candidate(text, Some(stop::GEMINI_STOP))],
        usage_metadata: Some(gemini_usage(prompt, text)),
        model_version: Some(model.to_string()),
    }
}

/// One response object per word, then a final `finishReason: STOP` object
pub fn gemini_stream<F>(reply: F, model: String, prompt: String) -> impl Stream<Item = StreamEvent>
where
    F: Future<Output = Result<String, ProviderError>> + Send + 'static,
{
    async_stream::stream! {
        match reply.await {
            Err(e) => {
                error!(model = %model, error = %e, "Streaming generation failed");
                yield StreamEvent::data(&openai_error(error_type::API, &e.to_string()));
            }
            Ok(text) => {
                for piece in split_into_chunks(&text) {
                    let chunk = GeminiGenerateResponse {
                        candidates: vec![gemini_text_candidate(&piece, None)],
                        usage_metadata: None,
                        model_version: Some(model.clone()),
                    };
                    yield StreamEvent::data(&chunk);
                    tokio::time::sleep(GEMINI_CHUNK_DELAY).await;
                }

                let last = GeminiGenerateResponse {
                    candidates: vec![GeminiCandidate {
                        index: 0,
                        content: None,
                        finish_reason: Some(stop::GEMINI_STOP.to_string()),
                    }],
                    usage_metadata: Some(gemini_usage(&prompt, &text)),
                    model_version: Some(model.clone()),
                };
                yield StreamEvent::data(&last);
                debug!(model = %model, "Gemini stream completed");
            }
        }
    }
}
