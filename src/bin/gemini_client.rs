//! Minimal Gemini generateContent client for a running bridge

use anyhow::{Context, Result};
use serde_json::{Value, json};

const DEFAULT_BASE_URL: &str = "http://localhost:3000";
const MODEL: &str = "gemini-1.5-flash";

#[tokio::main]
async fn main() -> Result<()> {
    let base_url = std::env::var("BRIDGE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let url = format!(
        "{}/gemini/v1beta/models/{}:generateContent",
        base_url.trim_end_matches('/'),
        MODEL
    );

    let body = json!({
        "contents": [{
            "role": "user",
            "parts": [{"text": "How to make a REST API call in Python?"}]
        }]
    });

    let response: Value = reqwest::Client::new()
        .post(url)
        .header("x-goog-api-key", "your-api-key")
        .json(&body)
        .send()
        .await
        .context("failed to reach the bridge")?
        .error_for_status()?
        .json()
        .await
        .context("invalid response body")?;

    let text = response["candidates"][0]["content"]["parts"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|part| part["text"].as_str())
        .collect::<Vec<_>>()
        .join("");
    println!("{}", text);

    Ok(())
}
