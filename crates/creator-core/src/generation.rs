//! Generation Provider Strategy Pattern
//!
//! Common interface for the LLM, image and video gateways behind the paid
//! features. Features are routed to the first provider that supports them.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use creator_core::generation::{Feature, GenerationRequest, ProviderRouter};
//!
//! let router = ProviderRouter::new(vec![Arc::new(gateway), Arc::new(ollama)]);
//! let output = router.generate(&GenerationRequest::new(Feature::Caption, "Spring sale")).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{CreatorError, Result};

/// A credit-metered feature
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Image,
    Caption,
    Video,
    ContentPlan,
    Review,
}

impl Feature {
    pub const ALL: [Self; 5] = [
        Self::Image,
        Self::Caption,
        Self::Video,
        Self::ContentPlan,
        Self::Review,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Caption => "caption",
            Self::Video => "video",
            Self::ContentPlan => "content_plan",
            Self::Review => "review",
        }
    }

    /// Whether the feature produces text (as opposed to a media asset)
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Caption | Self::ContentPlan | Self::Review)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Brand, persona and theme context folded into prompts
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BrandContext {
    pub name: String,

    /// Tone of voice ("playful", "formal", ...)
    #[serde(default)]
    pub voice: Option<String>,

    /// Target persona description
    #[serde(default)]
    pub persona: Option<String>,

    /// Visual theme (palette, style keywords)
    #[serde(default)]
    pub theme: Option<String>,
}

impl BrandContext {
    /// One-paragraph description for prompt prefixes
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("Brand: {}.", self.name)];
        if let Some(voice) = &self.voice {
            parts.push(format!("Tone of voice: {voice}."));
        }
        if let Some(persona) = &self.persona {
            parts.push(format!("Audience persona: {persona}."));
        }
        if let Some(theme) = &self.theme {
            parts.push(format!("Visual theme: {theme}."));
        }
        parts.join(" ")
    }
}

/// Request for a generation call
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub feature: Feature,

    pub prompt: String,

    #[serde(default)]
    pub brand: Option<BrandContext>,

    /// Model override
    #[serde(default)]
    pub model: Option<String>,

    /// Provider-specific options (size, duration, platform, ...)
    #[serde(default)]
    pub options: serde_json::Value,
}

impl GenerationRequest {
    pub fn new(feature: Feature, prompt: impl Into<String>) -> Self {
        Self {
            feature,
            prompt: prompt.into(),
            brand: None,
            model: None,
            options: serde_json::Value::Null,
        }
    }

    pub fn with_brand(mut self, brand: BrandContext) -> Self {
        self.brand = Some(brand);
        self
    }

    /// Prompt with the brand description prepended
    pub fn full_prompt(&self) -> String {
        match &self.brand {
            Some(brand) => format!("{}\n\n{}", brand.describe(), self.prompt),
            None => self.prompt.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(CreatorError::Validation("prompt must not be empty".into()));
        }
        Ok(())
    }
}

/// Output of a generation call
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub feature: Feature,

    /// Generated text, or the asset URL for media features
    pub content: String,

    /// Additional asset URLs
    #[serde(default)]
    pub assets: Vec<String>,

    pub model: String,

    pub provider: String,
}

/// Strategy trait for generation backends
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Whether this provider can serve the feature
    fn supports(&self, feature: Feature) -> bool;

    /// Run the generation. Any non-success answer from the backend must
    /// surface as an error.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput>;

    /// Check if the provider is reachable
    async fn health_check(&self) -> Result<bool>;
}

/// Feature-routed provider set
#[derive(Clone, Default)]
pub struct ProviderRouter {
    providers: Vec<Arc<dyn GenerationProvider>>,
}

impl ProviderRouter {
    pub fn new(providers: Vec<Arc<dyn GenerationProvider>>) -> Self {
        Self { providers }
    }

    pub fn push(&mut self, provider: Arc<dyn GenerationProvider>) {
        self.providers.push(provider);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// First provider supporting the feature
    pub fn route(&self, feature: Feature) -> Option<&Arc<dyn GenerationProvider>> {
        self.providers.iter().find(|p| p.supports(feature))
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        let provider = self.route(request.feature).ok_or_else(|| {
            CreatorError::ProviderUnavailable(format!(
                "no provider configured for {}",
                request.feature
            ))
        })?;
        tracing::debug!(provider = provider.name(), feature = %request.feature, "Routing generation");
        provider.generate(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TextOnly;

    #[async_trait]
    impl GenerationProvider for TextOnly {
        fn name(&self) -> &str {
            "text-only"
        }

        fn supports(&self, feature: Feature) -> bool {
            feature.is_text()
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
            Ok(GenerationOutput {
                feature: request.feature,
                content: request.full_prompt(),
                assets: Vec::new(),
                model: "test".into(),
                provider: self.name().into(),
            })
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_brand_prompt() {
        let request = GenerationRequest::new(Feature::Caption, "Launch post").with_brand(BrandContext {
            name: "Acme".into(),
            voice: Some("playful".into()),
            ..Default::default()
        });
        let prompt = request.full_prompt();
        assert!(prompt.starts_with("Brand: Acme. Tone of voice: playful."));
        assert!(prompt.ends_with("Launch post"));
    }

    #[test]
    fn test_empty_prompt_rejected() {
        assert!(GenerationRequest::new(Feature::Image, "  ").validate().is_err());
    }

    #[tokio::test]
    async fn test_router_routes_by_feature() {
        let router = ProviderRouter::new(vec![Arc::new(TextOnly)]);

        let out = router
            .generate(&GenerationRequest::new(Feature::Review, "check this"))
            .await
            .unwrap();
        assert_eq!(out.provider, "text-only");

        let err = router
            .generate(&GenerationRequest::new(Feature::Video, "clip"))
            .await
            .unwrap_err();
        assert!(matches!(err, CreatorError::ProviderUnavailable(_)));
    }
}
