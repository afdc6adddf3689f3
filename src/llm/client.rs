use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::credentials::CredentialStore;
use crate::llm::provider::{
    OutboundQuery, PreparedRequest, ProviderError, ProviderSettings, Responder,
};
use crate::llm::transport::send_once;

/// Provider adapter backed by real HTTP calls.
pub struct ProviderClient {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialStore>,
    settings: ProviderSettings,
}

impl ProviderClient {
    pub fn new(credentials: Arc<dyn CredentialStore>, settings: ProviderSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
            settings,
        }
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Builds the request for `query` with the stored credential, without sending it.
    pub fn prepare(&self, query: &OutboundQuery) -> Result<PreparedRequest, ProviderError> {
        let provider = query.provider;
        let api_key = self
            .credentials
            .key(provider)
            .ok_or(ProviderError::MissingCredential { provider })?;
        provider.prepare(query, &api_key, &self.settings)
    }

    pub async fn ask(&self, query: &OutboundQuery) -> Result<String, ProviderError> {
        let provider = query.provider;
        let prepared = self.prepare(query)?;
        debug!(
            provider = provider.as_str(),
            model = self.settings.model(provider),
            api_key_present = true,
            auth = prepared.auth.describe(),
            image = query.attached_image.is_some(),
            "sending provider request"
        );

        let response = send_once(&self.http, &prepared, self.settings.timeout_secs)
            .await
            // The URL may carry the key as a query parameter.
            .map_err(|source| ProviderError::Transport {
                provider,
                source: source.without_url(),
            })?;
        debug!(provider = provider.as_str(), status = %response.status, "provider responded");

        provider
            .parse_reply(response.status, &response.body)
            .inspect_err(|err| {
                if let ProviderError::Unparsable { body, .. } = err {
                    warn!(provider = provider.as_str(), body = %body, "unparsable provider response");
                }
            })
    }
}

#[async_trait]
impl Responder for ProviderClient {
    async fn answer(&self, query: OutboundQuery) -> Result<String, ProviderError> {
        self.ask(&query).await
    }
}

#[cfg(test)]
mod tests {
    use super::ProviderClient;
    use crate::credentials::MemoryCredentialStore;
    use crate::llm::provider::{OutboundQuery, Provider, ProviderError, ProviderSettings};
    use std::sync::Arc;

    #[tokio::test]
    async fn missing_credential_fails_before_any_request() {
        let mut settings = ProviderSettings::default();
        // Nothing listens here; reaching the network would yield a transport error.
        settings.openai_base_url = "http://127.0.0.1:9".to_string();
        let client = ProviderClient::new(Arc::new(MemoryCredentialStore::new()), settings);

        let result = client
            .ask(&OutboundQuery {
                user_text: "hi".to_string(),
                system_prompt: "be nice".to_string(),
                attached_image: None,
                provider: Provider::Openai,
            })
            .await;

        assert!(matches!(
            result,
            Err(ProviderError::MissingCredential {
                provider: Provider::Openai
            })
        ));
    }
}
