//! Provider adapter.
//!
//! Translates one normalized question into the OpenAI chat-completions or the
//! Gemini generateContent schema, sends it, and maps the reply (or failure)
//! back into a common shape.

/// HTTP-backed [`Responder`] implementation.
pub mod client;
pub(crate) mod gemini;
/// Attachment compression and encoding.
pub mod image;
pub(crate) mod openai;
/// Fixed prompts and spoken texts.
pub mod prompt;
/// Provider enum, request/response translation and error taxonomy.
pub mod provider;
pub(crate) mod transport;

pub use client::ProviderClient;
pub use provider::{
    AuthPlacement, OutboundQuery, PreparedRequest, Provider, ProviderError, ProviderSettings,
    Responder,
};
