//! Claude API data models
//!
//! This module defines the request and response structures for the Claude API,
//! matching the Anthropic Messages API format.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Content block of a request message
///
/// Only text reaches the backend; images, tool use and tool results are
/// accepted and dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

/// Message content can be a string or array of content blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    String(String),
    Blocks(Vec<ClaudeContentBlock>),
}

impl MessageContent {
    pub fn text(&self) -> String {
        match self {
            MessageContent::String(s) => s.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ClaudeContentBlock::Text { text } => Some(text.as_str()),
                    ClaudeContentBlock::Other => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Message with role and content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessage {
    pub role: String,
    pub content: MessageContent,
}

/// System content block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeSystemContent {
    #[serde(rename = "type", default = "default_text_type")]
    pub content_type: String,
    pub text: String,
}

fn default_text_type() -> String {
    "text".to_string()
}

/// System content can be a string or array of system content blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemContent {
    String(String),
    Blocks(Vec<ClaudeSystemContent>),
}

impl SystemContent {
    pub fn text(&self) -> String {
        match self {
            SystemContent::String(s) => s.clone(),
            SystemContent::Blocks(blocks) => blocks
                .iter()
                .map(|b| b.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Claude Messages API request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessagesRequest {
    #[serde(default)]
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(default)]
    pub messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default)]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

impl ClaudeMessagesRequest {
    pub fn system_text(&self) -> String {
        self.system.as_ref().map(SystemContent::text).unwrap_or_default()
    }
}

/// Claude token count request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeTokenCountRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemContent>,
}

/// Text block of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaudeTextBlock {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl ClaudeTextBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            content_type: default_text_type(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaudeUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Claude Messages API response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessageResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub role: String,
    pub model: String,
    pub content: Vec<ClaudeTextBlock>,
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
    pub usage: ClaudeUsage,
}

/// Entry of `GET /v1/models`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeModel {
    pub id: String,
    #[serde(rename = "type")]
    pub model_type: String,
    pub created_at: i64,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeModelList {
    pub data: Vec<ClaudeModel>,
    pub has_more: bool,
    pub first_id: Option<String>,
    pub last_id: Option<String>,
}
