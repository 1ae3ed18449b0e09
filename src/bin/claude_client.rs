//! Minimal Claude Messages client for a running bridge

use anyhow::{Context, Result};
use serde_json::{Value, json};

const DEFAULT_BASE_URL: &str = "http://localhost:3000";

#[tokio::main]
async fn main() -> Result<()> {
    let base_url = std::env::var("BRIDGE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

    let body = json!({
        "model": "claude-3-5-sonnet-20240620",
        "max_tokens": 1024,
        "temperature": 0.7,
        "messages": [{
            "role": "user",
            "content": "Hello Claude! Please introduce yourself and explain how you can help me with coding."
        }]
    });

    let response: Value = reqwest::Client::new()
        .post(format!("{}/claude/v1/messages", base_url.trim_end_matches('/')))
        .header("x-api-key", "abc")
        .header("anthropic-version", "2023-06-01")
        .json(&body)
        .send()
        .await
        .context("failed to reach the bridge")?
        .error_for_status()?
        .json()
        .await
        .context("invalid response body")?;

    let text = response["content"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|block| block["text"].as_str())
        .collect::<Vec<_>>()
        .join("");
    println!("{}", text);

    Ok(())
}
