//! HTTP API layer
//!
//! One router serves the OpenAI, Claude and Gemini surfaces side by side;
//! each surface lives in its own module and shares [`endpoints::AppState`].

pub mod claude;
pub mod endpoints;
pub mod error;
pub mod gemini;
pub mod middleware;
pub mod openai;
