//! Minimal OpenAI chat completions client for a running bridge
//!
//! `--compat` targets the `/v1` alias instead of `/openai/v1`, prints any
//! failure and still exits cleanly.

use anyhow::{Context, Result};
use serde_json::{Value, json};

const DEFAULT_BASE_URL: &str = "http://localhost:3000";

async fn chat(base_url: &str) -> Result<String> {
    let body = json!({
        "model": "gpt-3.5-turbo",
        "messages": [
            {"role": "system", "content": "You are a helpful assistant."},
            {"role": "user", "content": "Hello, who are you?"}
        ]
    });

    let response: Value = reqwest::Client::new()
        .post(format!("{}/chat/completions", base_url))
        .bearer_auth("sk-placeholder")
        .json(&body)
        .send()
        .await
        .context("failed to reach the bridge")?
        .error_for_status()?
        .json()
        .await
        .context("invalid response body")?;

    response["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .context("response has no message content")
}

#[tokio::main]
async fn main() -> Result<()> {
    let compat = std::env::args().any(|arg| arg == "--compat");
    let host = std::env::var("BRIDGE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let host = host.trim_end_matches('/');

    if compat {
        match chat(&format!("{}/v1", host)).await {
            Ok(text) => println!("{}", text),
            Err(e) => println!("Error: {:#}", e),
        }
        return Ok(());
    }

    let text = chat(&format!("{}/openai/v1", host)).await?;
    println!("{}", text);
    Ok(())
}
