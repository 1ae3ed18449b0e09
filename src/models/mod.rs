//! API data models
//!
//! This module contains the wire types of the three API surfaces the bridge
//! speaks: OpenAI chat completions, Claude messages and Gemini v1beta.

pub mod claude;
pub mod gemini;
pub mod openai;
