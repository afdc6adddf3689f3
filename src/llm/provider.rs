use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::llm::{gemini, openai};

/// Raw bodies kept on [`ProviderError::Unparsable`] are cut to this many characters.
pub const MAX_DIAGNOSTIC_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Openai,
    Gemini,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Openai, Provider::Gemini];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Gemini => "gemini",
        }
    }

    /// Name shown to the child in announcements.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Openai => "ChatGPT",
            Self::Gemini => "Gemini",
        }
    }

    pub fn api_key_env(self) -> &'static str {
        match self {
            Self::Openai => "OPENAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Builds the provider-specific HTTP request for one query.
    pub fn prepare(
        self,
        query: &OutboundQuery,
        api_key: &str,
        settings: &ProviderSettings,
    ) -> Result<PreparedRequest, ProviderError> {
        match self {
            Self::Openai => openai::prepare(query, api_key, settings),
            Self::Gemini => gemini::prepare(query, api_key, settings),
        }
    }

    /// Extracts the reply text from a provider response body.
    pub fn parse_reply(self, status: StatusCode, body: &str) -> Result<String, ProviderError> {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let reply = parsed.as_ref().and_then(|value| match self {
            Self::Openai => openai::reply_text(value),
            Self::Gemini => gemini::reply_text(value),
        });

        if let Some(text) = reply.filter(|text| !text.is_empty()) {
            return Ok(text);
        }

        if let Some(message) = parsed
            .as_ref()
            .and_then(|value| value.pointer("/error/message"))
            .and_then(Value::as_str)
        {
            return Err(ProviderError::Api {
                provider: self,
                message: message.to_string(),
            });
        }

        if !status.is_success() {
            return Err(ProviderError::Api {
                provider: self,
                message: format!("HTTP {status}"),
            });
        }

        Err(ProviderError::Unparsable {
            provider: self,
            body: truncate_chars(body, MAX_DIAGNOSTIC_CHARS),
        })
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "chatgpt" => Ok(Self::Openai),
            "gemini" => Ok(Self::Gemini),
            _ => Err(format!(
                "Invalid provider '{value}'. Supported values: openai, gemini."
            )),
        }
    }
}

/// Model names, endpoints and limits shared by both adapters.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub openai_model: String,
    pub gemini_model: String,
    pub openai_base_url: String,
    pub gemini_base_url: String,
    pub max_tokens: u32,
    pub timeout_secs: Option<u64>,
}

impl ProviderSettings {
    pub fn model(&self, provider: Provider) -> &str {
        match provider {
            Provider::Openai => &self.openai_model,
            Provider::Gemini => &self.gemini_model,
        }
    }

    pub fn set_model(&mut self, provider: Provider, model: impl Into<String>) {
        match provider {
            Provider::Openai => self.openai_model = model.into(),
            Provider::Gemini => self.gemini_model = model.into(),
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            openai_model: openai::DEFAULT_MODEL.to_string(),
            gemini_model: gemini::DEFAULT_MODEL.to_string(),
            openai_base_url: openai::DEFAULT_BASE_URL.to_string(),
            gemini_base_url: gemini::DEFAULT_BASE_URL.to_string(),
            max_tokens: 300,
            timeout_secs: None,
        }
    }
}

/// One question on its way to a provider.
#[derive(Debug, Clone)]
pub struct OutboundQuery {
    pub user_text: String,
    pub system_prompt: String,
    pub attached_image: Option<Vec<u8>>,
    pub provider: Provider,
}

/// Where the credential travels on the wire.
#[derive(Clone)]
pub enum AuthPlacement {
    Bearer(String),
    QueryKey(String),
}

impl AuthPlacement {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Bearer(_) => "bearer",
            Self::QueryKey(_) => "query-key",
        }
    }
}

impl fmt::Debug for AuthPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(<redacted>)", self.describe())
    }
}

/// A fully built provider request, ready for the transport.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub provider: Provider,
    pub url: String,
    pub auth: AuthPlacement,
    pub body: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("no API key saved for {}", .provider.display_name())]
    MissingCredential { provider: Provider },
    #[error("{} request failed: {source}", .provider.display_name())]
    Transport {
        provider: Provider,
        #[source]
        source: reqwest::Error,
    },
    #[error("{}: {message}", .provider.display_name())]
    Api { provider: Provider, message: String },
    #[error("{} returned an unexpected response: {body}", .provider.display_name())]
    Unparsable { provider: Provider, body: String },
    #[error("could not prepare the attached image: {0}")]
    InvalidImage(String),
}

/// Answers one outbound query with reply text.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn answer(&self, query: OutboundQuery) -> Result<String, ProviderError>;
}

pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
