//! Ollama Text Provider
//!
//! `GenerationProvider` for the text features (captions, content plans,
//! reviews) backed by a local Ollama instance.

use async_trait::async_trait;
use ollama_rs::{
    Ollama,
    generation::chat::{ChatMessage, ChatMessageResponse, request::ChatMessageRequest},
};

use creator_core::{
    error::{CreatorError, Result},
    generation::{Feature, GenerationOutput, GenerationProvider, GenerationRequest},
};

use crate::prompts::system_prompt;

/// Ollama provider configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,

    /// Model used when the request names none
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
            model: "llama3.2".into(),
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("OLLAMA_HOST").unwrap_or(defaults.host),
            port: lookup("OLLAMA_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            model: lookup("OLLAMA_MODEL").unwrap_or(defaults.model),
        }
    }
}

/// Ollama text provider
pub struct OllamaProvider {
    client: Ollama,
    config: OllamaConfig,
}

impl OllamaProvider {
    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Self {
        Self {
            client: Ollama::new(config.host.clone(), config.port),
            config,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_config(OllamaConfig::from_env())
    }

    fn build_messages(request: &GenerationRequest) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(system_prompt(request.feature).to_string()),
            ChatMessage::user(request.full_prompt()),
        ]
    }

    fn convert_output(&self, response: ChatMessageResponse, request: &GenerationRequest, model: String) -> GenerationOutput {
        GenerationOutput {
            feature: request.feature,
            content: response.message.content,
            assets: Vec::new(),
            model,
            provider: self.name().to_string(),
        }
    }
}

#[async_trait]
impl GenerationProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn supports(&self, feature: Feature) -> bool {
        feature.is_text()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        if !self.supports(request.feature) {
            return Err(CreatorError::ProviderUnavailable(format!(
                "ollama cannot generate {}",
                request.feature
            )));
        }

        let model = request.model.clone().unwrap_or_else(|| self.config.model.clone());
        let chat = ChatMessageRequest::new(model.clone(), Self::build_messages(request));

        let response = self
            .client
            .send_chat_messages(chat)
            .await
            .map_err(|e| CreatorError::Provider(e.to_string()))?;

        Ok(self.convert_output(response, request, model))
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.list_local_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Ollama health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = OllamaConfig::from_lookup(|_| None);
        assert_eq!(config.host, "http://localhost");
        assert_eq!(config.port, 11434);
        assert_eq!(config.model, "llama3.2");
    }

    #[test]
    fn test_text_features_only() {
        let provider = OllamaProvider::from_config(OllamaConfig::default());
        assert!(provider.supports(Feature::Caption));
        assert!(provider.supports(Feature::Review));
        assert!(!provider.supports(Feature::Video));
    }

    #[test]
    fn test_messages_carry_system_prompt() {
        let request = GenerationRequest::new(Feature::ContentPlan, "Two weeks of posts");
        let messages = OllamaProvider::build_messages(&request);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "Two weeks of posts");
    }
}
