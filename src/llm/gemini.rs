use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::image;
use crate::llm::provider::{
    AuthPlacement, OutboundQuery, PreparedRequest, Provider, ProviderError, ProviderSettings,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

pub(crate) fn endpoint(base_url: &str, model: &str) -> String {
    format!(
        "{}/v1beta/models/{model}:generateContent",
        base_url.trim_end_matches('/')
    )
}

/// Gemini has no system role here; the prompt leads the single text part.
pub(crate) fn combined_text(system_prompt: &str, user_text: &str) -> String {
    format!("{system_prompt}\n\nUser Question: {user_text}")
}

pub(crate) fn prepare(
    query: &OutboundQuery,
    api_key: &str,
    settings: &ProviderSettings,
) -> Result<PreparedRequest, ProviderError> {
    let mut parts = vec![Part::Text {
        text: combined_text(&query.system_prompt, &query.user_text),
    }];
    if let Some(bytes) = &query.attached_image {
        parts.push(Part::InlineData {
            inline_data: Blob {
                mime_type: image::JPEG_MIME_TYPE,
                data: image::encode_jpeg_base64(bytes)?,
            },
        });
    }

    let payload = GenerateContentRequest {
        contents: vec![Content { parts }],
    };

    Ok(PreparedRequest {
        provider: Provider::Gemini,
        url: endpoint(&settings.gemini_base_url, &settings.gemini_model),
        auth: AuthPlacement::QueryKey(api_key.to_string()),
        body: serde_json::to_value(&payload).map_err(|err| ProviderError::Api {
            provider: Provider::Gemini,
            message: format!("failed to encode request: {err}"),
        })?,
    })
}

/// `candidates[0].content.parts[0].text`, when present.
pub(crate) fn reply_text(body: &Value) -> Option<String> {
    let response = GenerateContentResponse::deserialize(body).ok()?;
    let candidate = response.candidates.into_iter().next()?;
    candidate.content.parts.into_iter().next()?.text
}
