//! Request to prompt conversion
//!
//! The backend only understands a single text prompt, so every API surface
//! flattens its conversation into `<Speaker>: <text>` lines here after
//! validating the request.

use crate::core::constants::{role, speaker};
use crate::models::claude::{ClaudeMessage, ClaudeTokenCountRequest};
use crate::models::gemini::GeminiGenerateRequest;
use crate::models::openai::OpenAIMessage;
use thiserror::Error;

/// Reasons a chat request is rejected before reaching the backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("messages array cannot be empty")]
    EmptyMessages,

    #[error("all messages have empty content")]
    AllMessagesEmpty,

    #[error("max_tokens must be non-negative")]
    NegativeMaxTokens,

    #[error("temperature must be between 0 and 2")]
    TemperatureOutOfRange,
}

/// A conversation turn that can be flattened into the prompt
pub trait PromptMessage {
    fn role(&self) -> &str;
    fn text(&self) -> String;
}

impl PromptMessage for OpenAIMessage {
    fn role(&self) -> &str {
        &self.role
    }

    fn text(&self) -> String {
        OpenAIMessage::text(self)
    }
}

impl PromptMessage for ClaudeMessage {
    fn role(&self) -> &str {
        &self.role
    }

    fn text(&self) -> String {
        self.content.text()
    }
}

/// Prompt label for a wire role; unknown roles speak as the user
pub fn speaker_for(message_role: &str) -> &'static str {
    if message_role.eq_ignore_ascii_case(role::ASSISTANT)
        || message_role.eq_ignore_ascii_case(role::MODEL)
    {
        speaker::MODEL
    } else if message_role.eq_ignore_ascii_case(role::SYSTEM) {
        speaker::SYSTEM
    } else {
        speaker::USER
    }
}

/// Flatten a conversation into one prompt
pub fn build_prompt<M: PromptMessage>(messages: &[M], system: &str) -> String {
    let mut prompt = String::new();

    if !system.is_empty() {
        prompt.push_str(&format!("{}: {}\n\n", speaker::SYSTEM, system));
    }

    for message in messages {
        prompt.push_str(&format!(
            "{}: {}\n",
            speaker_for(message.role()),
            message.text()
        ));
    }

    prompt.trim().to_string()
}

pub fn validate_messages<M: PromptMessage>(messages: &[M]) -> Result<(), ValidationError> {
    if messages.is_empty() {
        return Err(ValidationError::EmptyMessages);
    }
    if messages.iter().all(|m| m.text().trim().is_empty()) {
        return Err(ValidationError::AllMessagesEmpty);
    }
    Ok(())
}

/// Range checks shared by every surface's sampling parameters
pub fn validate_generation(
    max_tokens: Option<i64>,
    temperature: Option<f64>,
) -> Result<(), ValidationError> {
    if max_tokens.is_some_and(|t| t < 0) {
        return Err(ValidationError::NegativeMaxTokens);
    }
    if temperature.is_some_and(|t| !(0.0..=2.0).contains(&t)) {
        return Err(ValidationError::TemperatureOutOfRange);
    }
    Ok(())
}

/// Prompt for a Gemini request: every text part, one per line
///
/// The system instruction is prepended only when the contents themselves
/// carry text, so an empty request stays empty.
pub fn gemini_prompt(request: &GeminiGenerateRequest) -> String {
    let body = request
        .contents
        .iter()
        .flat_map(|content| content.texts())
        .collect::<Vec<_>>()
        .join("\n");
    let body = body.trim();
    if body.is_empty() {
        return String::new();
    }

    let system = request
        .system_instruction
        .as_ref()
        .map(|s| s.texts().collect::<Vec<_>>().join("\n"))
        .unwrap_or_default();

    if system.trim().is_empty() {
        body.to_string()
    } else {
        format!("{}: {}\n\n{}", speaker::SYSTEM, system.trim(), body)
    }
}

/// Rough token estimate: four bytes per token
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Token estimate for `count_tokens`, over the system prompt and every message
pub fn count_claude_tokens(request: &ClaudeTokenCountRequest) -> usize {
    let system = request
        .system
        .as_ref()
        .map(|s| s.text().len())
        .unwrap_or(0);
    let messages: usize = request.messages.iter().map(|m| m.content.text().len()).sum();
    (system + messages) / 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::claude::MessageContent;
    use crate::models::gemini::{GeminiContent, GeminiPart};

    fn openai(role: &str, content: &str) -> OpenAIMessage {
        OpenAIMessage::new(role, content)
    }

    #[test]
    fn test_build_prompt_maps_roles() {
        let messages = vec![
            openai("system", "be nice"),
            openai("user", "hi"),
            openai("Assistant", "hello"),
            openai("MODEL", "again"),
            openai("tool", "weird"),
        ];
        assert_eq!(
            build_prompt(&messages, ""),
            "System: be nice\nUser: hi\nModel: hello\nModel: again\nUser: weird"
        );
    }

    #[test]
    fn test_build_prompt_prefixes_system_and_trims() {
        let messages = vec![ClaudeMessage {
            role: "user".to_string(),
            content: MessageContent::String("  question  ".to_string()),
        }];
        assert_eq!(
            build_prompt(&messages, "rules"),
            "System: rules\n\nUser:   question"
        );
    }

    #[test]
    fn test_validate_messages() {
        let empty: Vec<OpenAIMessage> = Vec::new();
        assert_eq!(
            validate_messages(&empty).unwrap_err().to_string(),
            "messages array cannot be empty"
        );
        assert_eq!(
            validate_messages(&[openai("user", "  "), openai("assistant", "")]).unwrap_err(),
            ValidationError::AllMessagesEmpty
        );
        assert!(validate_messages(&[openai("user", ""), openai("user", "ok")]).is_ok());
    }

    #[test]
    fn test_validate_generation() {
        assert!(validate_generation(None, None).is_ok());
        assert!(validate_generation(Some(0), Some(0.0)).is_ok());
        assert!(validate_generation(Some(10), Some(2.0)).is_ok());
        assert_eq!(
            validate_generation(Some(-1), None).unwrap_err().to_string(),
            "max_tokens must be non-negative"
        );
        assert_eq!(
            validate_generation(None, Some(2.5)).unwrap_err().to_string(),
            "temperature must be between 0 and 2"
        );
        assert_eq!(
            validate_generation(None, Some(-0.1)).unwrap_err(),
            ValidationError::TemperatureOutOfRange
        );
    }

    #[test]
    fn test_gemini_prompt() {
        let request = GeminiGenerateRequest {
            contents: vec![
                GeminiContent {
                    role: Some("user".to_string()),
                    parts: vec![GeminiPart::text("first"), GeminiPart::text("")],
                },
                GeminiContent {
                    role: None,
                    parts: vec![GeminiPart::text("second ")],
                },
            ],
            ..GeminiGenerateRequest::default()
        };
        assert_eq!(gemini_prompt(&request), "first\nsecond");

        let with_system = GeminiGenerateRequest {
            system_instruction: Some(GeminiContent {
                role: None,
                parts: vec![GeminiPart::text("be brief")],
            }),
            ..request
        };
        assert_eq!(gemini_prompt(&with_system), "System: be brief\n\nfirst\nsecond");

        let only_system = GeminiGenerateRequest {
            contents: Vec::new(),
            ..with_system
        };
        assert_eq!(gemini_prompt(&only_system), "");
    }

    #[test]
    fn test_token_estimates() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens("abc"), 0);

        let request = ClaudeTokenCountRequest {
            model: "claude-3-5-sonnet-20240620".to_string(),
            messages: vec![ClaudeMessage {
                role: "user".to_string(),
                content: MessageContent::String("12345678".to_string()),
            }],
            system: Some(crate::models::claude::SystemContent::String("1234".to_string())),
        };
        assert_eq!(count_claude_tokens(&request), 3);
    }
}
