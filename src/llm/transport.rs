use std::time::Duration;

use reqwest::StatusCode;

use crate::llm::provider::{AuthPlacement, PreparedRequest};

/// Status and raw body of one provider call.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Sends a prepared request once. Failures are never retried here.
pub(crate) async fn send_once(
    client: &reqwest::Client,
    prepared: &PreparedRequest,
    timeout_secs: Option<u64>,
) -> Result<RawResponse, reqwest::Error> {
    let mut request = client.post(&prepared.url).json(&prepared.body);

    request = match &prepared.auth {
        AuthPlacement::Bearer(key) => request.bearer_auth(key),
        AuthPlacement::QueryKey(key) => request.query(&[("key", key.as_str())]),
    };

    if let Some(timeout_secs) = timeout_secs {
        request = request.timeout(Duration::from_secs(timeout_secs));
    }

    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    Ok(RawResponse { status, body })
}
