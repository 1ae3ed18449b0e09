//! Wire-format string constants and backend endpoints
//!
//! This module defines the role names, content types, stop reasons, event
//! types and object names used by the three API surfaces, plus the Gemini web
//! endpoints the backend talks to.

/// Message role constants
pub mod role {
    /// User role identifier
    pub const USER: &str = "user";

    /// Assistant role identifier
    pub const ASSISTANT: &str = "assistant";

    /// System role identifier
    pub const SYSTEM: &str = "system";

    /// Gemini's name for the assistant
    pub const MODEL: &str = "model";
}

/// Prompt line labels sent to the backend
pub mod speaker {
    pub const USER: &str = "User";
    pub const MODEL: &str = "Model";
    pub const SYSTEM: &str = "System";
}

/// Content type constants
pub mod content {
    /// Text content type
    pub const TEXT: &str = "text";
}

/// Stop and finish reason constants
pub mod stop {
    /// Claude end turn stop reason
    pub const END_TURN: &str = "end_turn";

    /// OpenAI finish reason
    pub const STOP: &str = "stop";

    /// Gemini finish reason
    pub const GEMINI_STOP: &str = "STOP";
}

/// Server-sent event type constants
pub mod event {
    /// Message start event
    pub const MESSAGE_START: &str = "message_start";

    /// Message stop event
    pub const MESSAGE_STOP: &str = "message_stop";

    /// Message delta event
    pub const MESSAGE_DELTA: &str = "message_delta";

    /// Content block start event
    pub const CONTENT_BLOCK_START: &str = "content_block_start";

    /// Content block stop event
    pub const CONTENT_BLOCK_STOP: &str = "content_block_stop";

    /// Content block delta event
    pub const CONTENT_BLOCK_DELTA: &str = "content_block_delta";

    /// Error event
    pub const ERROR: &str = "error";

    /// Terminal OpenAI stream marker
    pub const DONE: &str = "[DONE]";
}

/// Delta type constants
pub mod delta {
    /// Text delta type
    pub const TEXT: &str = "text_delta";
}

/// Object type names used in response bodies
pub mod object {
    pub const CHAT_COMPLETION: &str = "chat.completion";
    pub const CHAT_COMPLETION_CHUNK: &str = "chat.completion.chunk";
    pub const LIST: &str = "list";
    pub const MODEL: &str = "model";
    pub const MESSAGE: &str = "message";
}

/// Error type names shared by the error bodies
pub mod error_type {
    pub const INVALID_REQUEST: &str = "invalid_request_error";
    pub const API: &str = "api_error";
}

/// Gemini web application endpoints
pub mod gemini {
    pub const GOOGLE: &str = "https://www.google.com/";
    pub const HOME: &str = "https://gemini.google.com/";
    pub const INIT: &str = "https://gemini.google.com/app";
    pub const GENERATE: &str =
        "https://gemini.google.com/_/BardChatUi/data/assistant.lamda.BardFrontendService/StreamGenerate";
    pub const ROTATE_COOKIES: &str = "https://accounts.google.com/RotateCookies";

    /// Body the rotation endpoint expects, verbatim
    pub const ROTATE_BODY: &str = r#"[000,"-0000000000000000000"]"#;

    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    /// Anti-XSSI prefix on StreamGenerate frames
    pub const XSSI_PREFIX: &str = ")]}'";

    pub const COOKIE_PSID: &str = "__Secure-1PSID";
    pub const COOKIE_PSIDTS: &str = "__Secure-1PSIDTS";
    pub const COOKIE_PSIDCC: &str = "__Secure-1PSIDCC";

    /// Model used when a request does not name one
    pub const DEFAULT_MODEL: &str = "gemini-pro";
}
