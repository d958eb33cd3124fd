//! LLM completion providers.
//!
//! The bridge talks to a single OpenAI-compatible chat completion endpoint;
//! [`ChatCompletionClient`] implements [`wabridge_channels::ReplyGenerator`]
//! so the session layer never sees HTTP details.

pub mod error;
pub mod openai_compat;

pub use {
    error::{Error, Result},
    openai_compat::{ChatCompletionClient, CompletionRequest, RequestMessage, Role},
};
