//! Konform Fixes: Alt-Text Model Collaborator
//!
//! Alt texts come from an external model behind a trait. Every suggestion
//! carries a confidence; low-confidence texts are kept but not marked
//! auto-deployable. One retry on 5xx with a 1 s backoff, then the fix
//! degrades to a manual guide.

use async_trait::async_trait;
use konform_core::EngineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Confidence below which a suggestion is not auto-deployable.
pub const AUTO_FIX_CONFIDENCE: f64 = 0.7;

/// What the model sees.
#[derive(Debug, Clone, Serialize)]
pub struct AltTextRequest<'a> {
    pub image_url: &'a str,
    pub surrounding_text: &'a str,
    pub page_title: &'a str,
}

/// Suggested alt text with model confidence in `[0, 1]`.
#[derive(Debug, Clone, Deserialize)]
pub struct AltTextSuggestion {
    pub text: String,
    pub confidence: f64,
}

/// Alt-text generation collaborator.
#[async_trait]
pub trait AltTextModel: Send + Sync {
    async fn generate_alt_text(
        &self,
        request: &AltTextRequest<'_>,
    ) -> Result<AltTextSuggestion, EngineError>;
}

/// HTTP-backed model client.
#[derive(Debug, Clone)]
pub struct AltTextConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for AltTextConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            timeout: Duration::from_secs(15),
        }
    }
}

pub struct HttpAltTextModel {
    client: reqwest::Client,
    config: AltTextConfig,
}

impl HttpAltTextModel {
    pub fn new(config: AltTextConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EngineError::Dependency(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn call(&self, request: &AltTextRequest<'_>) -> Result<reqwest::Response, EngineError> {
        let mut builder = self.client.post(&self.config.endpoint).json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
            .send()
            .await
            .map_err(|e| EngineError::Dependency(e.to_string()))
    }
}

#[async_trait]
impl AltTextModel for HttpAltTextModel {
    async fn generate_alt_text(
        &self,
        request: &AltTextRequest<'_>,
    ) -> Result<AltTextSuggestion, EngineError> {
        let mut response = self.call(request).await?;
        if response.status().is_server_error() {
            tracing::warn!(status = response.status().as_u16(), "alt-text model 5xx, retrying once");
            tokio::time::sleep(Duration::from_secs(1)).await;
            response = self.call(request).await?;
        }
        if !response.status().is_success() {
            return Err(EngineError::Dependency(format!(
                "alt-text model returned {}",
                response.status()
            )));
        }
        let suggestion: AltTextSuggestion = response
            .json()
            .await
            .map_err(|e| EngineError::Dependency(e.to_string()))?;
        Ok(AltTextSuggestion {
            confidence: suggestion.confidence.clamp(0.0, 1.0),
            ..suggestion
        })
    }
}

/// Optional legal-text enrichment collaborator. Produces a tailored
/// policy paragraph for one service; absence or failure never blocks a
/// fix, the canonical template paragraph is used instead.
#[async_trait]
pub trait LegalTextModel: Send + Sync {
    async fn generate_legal_paragraph(
        &self,
        service_name: &str,
        purpose_hint: &str,
    ) -> Result<String, EngineError>;
}

/// Canned model for tests and offline operation.
#[derive(Debug, Clone)]
pub struct FixedAltTextModel {
    pub text: String,
    pub confidence: f64,
}

#[async_trait]
impl AltTextModel for FixedAltTextModel {
    async fn generate_alt_text(
        &self,
        _request: &AltTextRequest<'_>,
    ) -> Result<AltTextSuggestion, EngineError> {
        Ok(AltTextSuggestion {
            text: self.text.clone(),
            confidence: self.confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_model() {
        let model = FixedAltTextModel {
            text: "Teamfoto im Büro".into(),
            confidence: 0.9,
        };
        let suggestion = model
            .generate_alt_text(&AltTextRequest {
                image_url: "/team.jpg",
                surrounding_text: "Unser Team",
                page_title: "Über uns",
            })
            .await
            .unwrap();
        assert_eq!(suggestion.text, "Teamfoto im Büro");
        assert!(suggestion.confidence >= AUTO_FIX_CONFIDENCE);
    }
}
