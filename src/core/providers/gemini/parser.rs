//! StreamGenerate wire format
//!
//! Requests carry a doubly JSON-encoded `f.req` form field. Responses are
//! newline separated frames behind an anti-XSSI prefix; each frame is a JSON
//! array whose items embed another JSON document as a string at index 2.

use regex::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;

use crate::core::constants::gemini::XSSI_PREFIX;
use crate::core::provider::{ProviderError, ProviderResponse, ResponseMetadata};

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""SNlM0e":"([^"]+)""#).expect("valid SNlM0e pattern"));

static TOKEN_FALLBACK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\["SNlM0e","([^"]+)"\]"#).expect("valid SNlM0e pattern"));

/// Find the `SNlM0e` anti-CSRF token in the Gemini app page
pub fn extract_session_token(body: &str) -> Option<String> {
    TOKEN_RE
        .captures(body)
        .or_else(|| TOKEN_FALLBACK_RE.captures(body))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Whether the page the token was missing from is a sign-in page
pub fn looks_like_login_page(body: &str) -> bool {
    body.contains("Sign in") || body.contains("login")
}

/// `f.req` form value for a single prompt
pub fn build_request_payload(prompt: &str) -> String {
    let inner = json!([[prompt], null, null]);
    json!([null, inner.to_string()]).to_string()
}

/// Decode the first candidate text out of a StreamGenerate body
pub fn parse_stream_generate(body: &str) -> Result<ProviderResponse, ProviderError> {
    for line in body.lines() {
        let line = line.trim();
        let line = line.strip_prefix(XSSI_PREFIX).unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        let Ok(Value::Array(frame)) = serde_json::from_str::<Value>(line) else {
            continue;
        };

        for item in &frame {
            let Some(embedded) = item
                .as_array()
                .filter(|a| a.len() >= 3)
                .and_then(|a| a[2].as_str())
            else {
                continue;
            };
            let Ok(payload) = serde_json::from_str::<Value>(embedded) else {
                continue;
            };
            if let Some(response) = response_from_payload(&payload) {
                return Ok(response);
            }
        }
    }

    Err(ProviderError::Parse)
}

fn response_from_payload(payload: &Value) -> Option<ProviderResponse> {
    let candidate = payload.get(4)?.get(0)?;
    let text = candidate.get(1)?.get(0)?.as_str()?;

    let mut metadata = ResponseMetadata {
        rcid: candidate
            .get(0)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        ..ResponseMetadata::default()
    };

    // payload[1] is either the conversation id or a [cid, rid] pair
    match payload.get(1) {
        Some(Value::String(cid)) => metadata.cid = cid.clone(),
        Some(Value::Array(ids)) => {
            let id = |i: usize| ids.get(i).and_then(Value::as_str).unwrap_or_default();
            metadata.cid = id(0).to_string();
            metadata.rid = id(1).to_string();
        }
        _ => {}
    }

    Some(ProviderResponse {
        text: text.to_string(),
        metadata,
    })
}
