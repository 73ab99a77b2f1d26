//! LLM provider abstraction for stock-chat
//!
//! The assistant treats narrative insights as an external capability: it sends
//! a prompt and receives free text. This crate holds the request/response
//! types for that exchange, the [`LLMProvider`] trait, and an
//! OpenAI-compatible provider (xAI Grok, OpenAI, local servers) behind the
//! `openai` feature.

pub mod completion;
pub mod error;
pub mod messages;
pub mod provider;

pub use completion::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};
pub use error::{LLMError, Result};
pub use messages::{Message, Role};
pub use provider::LLMProvider;

#[cfg(feature = "openai")]
pub mod providers;
