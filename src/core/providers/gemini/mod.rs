//! Gemini web application provider
//!
//! Talks to the consumer Gemini web app with browser session cookies instead
//! of an API key. [`cookies`] keeps the cookie jar and its on-disk cache,
//! [`parser`] decodes the StreamGenerate wire format and [`client`] drives
//! the session bootstrap, cookie rotation and generate calls.

pub mod client;
pub mod cookies;
pub mod parser;

pub use client::{GeminiEndpoints, GeminiWebClient};
pub use cookies::{CookieCache, CookieStore};
