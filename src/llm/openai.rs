use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::image;
use crate::llm::provider::{
    AuthPlacement, OutboundQuery, PreparedRequest, Provider, ProviderError, ProviderSettings,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

pub(crate) fn endpoint(base_url: &str) -> String {
    format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
}

pub(crate) fn prepare(
    query: &OutboundQuery,
    api_key: &str,
    settings: &ProviderSettings,
) -> Result<PreparedRequest, ProviderError> {
    let user_content = match &query.attached_image {
        Some(bytes) => {
            let encoded = image::encode_jpeg_base64(bytes)?;
            MessageContent::Parts(vec![
                ContentPart::Text {
                    text: &query.user_text,
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:{};base64,{encoded}", image::JPEG_MIME_TYPE),
                    },
                },
            ])
        }
        None => MessageContent::Text(&query.user_text),
    };

    let payload = ChatCompletionRequest {
        model: &settings.openai_model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: MessageContent::Text(&query.system_prompt),
            },
            ChatMessage {
                role: "user",
                content: user_content,
            },
        ],
        max_tokens: settings.max_tokens,
    };

    Ok(PreparedRequest {
        provider: Provider::Openai,
        url: endpoint(&settings.openai_base_url),
        auth: AuthPlacement::Bearer(api_key.to_string()),
        body: serde_json::to_value(&payload).map_err(|err| ProviderError::Api {
            provider: Provider::Openai,
            message: format!("failed to encode request: {err}"),
        })?,
    })
}

/// `choices[0].message.content`, when present.
pub(crate) fn reply_text(body: &Value) -> Option<String> {
    let response = ChatCompletionResponse::deserialize(body).ok()?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
}
