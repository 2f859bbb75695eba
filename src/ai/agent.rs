use async_trait::async_trait;
use reqwest::Client;

use super::{AnalysisClient, AnalysisError, AnalysisRequest};
use crate::encode::EncodedPayload;

/// HTTP client for an agent `generate` endpoint that accepts multimodal messages.
pub struct AgentClient {
    endpoint: String,
    /// Sent as `Authorization: Bearer` when set.
    api_key: Option<String>,
    client: Client,
}

impl AgentClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            client: Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AnalysisClient for AgentClient {
    async fn submit(
        &self,
        payload: &EncodedPayload,
        instruction: &str,
    ) -> Result<String, AnalysisError> {
        let body = AnalysisRequest::new(payload, instruction);
        log::info!(
            "POST {} ({} base64 chars, {})",
            self.endpoint,
            payload.base64.len(),
            payload.mime_type
        );

        let mut req = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json");
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| AnalysisError::Transport(format!("failed to read response body: {e}")))?;
        log::debug!("Agent replied {} ({} bytes)", status, raw.len());

        if !status.is_success() {
            log::error!("Agent returned HTTP {}", status.as_u16());
            let detail = if raw.is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                raw
            };
            return Err(AnalysisError::Network {
                status: status.as_u16(),
                detail,
            });
        }

        Ok(raw)
    }

    fn name(&self) -> &str {
        "agent"
    }
}
