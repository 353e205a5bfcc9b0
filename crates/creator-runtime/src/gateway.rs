//! HTTP Generation Gateway
//!
//! `GenerationProvider` over an OpenAI-compatible gateway serving images,
//! videos and chat completions. Every non-2xx answer becomes an error so the
//! consumption guard never charges for it.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use creator_core::{
    error::{CreatorError, Result},
    generation::{Feature, GenerationOutput, GenerationProvider, GenerationRequest},
};

use crate::prompts::system_prompt;

/// Gateway configuration
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Base URL, without trailing slash
    pub base_url: String,

    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    pub text_model: String,
    pub image_model: String,
    pub video_model: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            api_key: None,
            timeout_secs: 120,
            text_model: "gpt-4o-mini".into(),
            image_model: "flux-schnell".into(),
            video_model: "wan-2.1".into(),
        }
    }
}

impl GatewayConfig {
    /// Read `GATEWAY_*` variables; `None` when `GATEWAY_URL` is unset
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let base_url = lookup("GATEWAY_URL")?;
        let defaults = Self::default();

        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: lookup("GATEWAY_API_KEY"),
            timeout_secs: lookup("GATEWAY_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            text_model: lookup("GATEWAY_TEXT_MODEL").unwrap_or(defaults.text_model),
            image_model: lookup("GATEWAY_IMAGE_MODEL").unwrap_or(defaults.image_model),
            video_model: lookup("GATEWAY_VIDEO_MODEL").unwrap_or(defaults.video_model),
        })
    }
}

/// Gateway provider
pub struct GatewayProvider {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl GatewayProvider {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CreatorError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(feature: Feature) -> &'static str {
        match feature {
            Feature::Image => "/v1/images/generations",
            Feature::Video => "/v1/videos/generations",
            Feature::Caption | Feature::ContentPlan | Feature::Review => "/v1/chat/completions",
        }
    }

    fn model_for(&self, request: &GenerationRequest) -> String {
        request.model.clone().unwrap_or_else(|| match request.feature {
            Feature::Image => self.config.image_model.clone(),
            Feature::Video => self.config.video_model.clone(),
            _ => self.config.text_model.clone(),
        })
    }

    fn build_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let model = self.model_for(request);
        let mut body = if request.feature.is_text() {
            serde_json::json!({
                "model": model,
                "messages": [
                    {"role": "system", "content": system_prompt(request.feature)},
                    {"role": "user", "content": request.full_prompt()},
                ],
            })
        } else {
            serde_json::json!({
                "model": model,
                "prompt": request.full_prompt(),
                "n": 1,
            })
        };

        // Caller options (size, duration, ...) are passed through
        if let (Some(target), Some(options)) = (body.as_object_mut(), request.options.as_object()) {
            for (key, value) in options {
                target.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        body
    }
}

/// Map a non-success status to the error the guard reports
pub(crate) fn error_for_status(status: StatusCode, body: &str) -> CreatorError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => CreatorError::RateLimited(body.to_string()),
        StatusCode::PAYMENT_REQUIRED => CreatorError::ProviderCreditsExhausted(body.to_string()),
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            CreatorError::ProviderUnavailable(format!("{status}: {body}"))
        }
        _ => CreatorError::Provider(format!("{status}: {body}")),
    }
}

fn request_error(err: &reqwest::Error) -> CreatorError {
    if err.is_timeout() || err.is_connect() {
        CreatorError::ProviderUnavailable(err.to_string())
    } else {
        CreatorError::Provider(err.to_string())
    }
}

/// Extract `(content, extra assets)` from a gateway response
pub(crate) fn parse_output(feature: Feature, json: &serde_json::Value) -> Result<(String, Vec<String>)> {
    if feature.is_text() {
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| CreatorError::Provider("response has no completion text".into()))?;
        return Ok((content.to_string(), Vec::new()));
    }

    let mut urls = json["data"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["url"].as_str().map(str::to_string))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
        .into_iter();

    let first = urls
        .next()
        .ok_or_else(|| CreatorError::Provider("response has no asset URL".into()))?;
    Ok((first, urls.collect()))
}

#[async_trait]
impl GenerationProvider for GatewayProvider {
    fn name(&self) -> &str {
        "gateway"
    }

    fn supports(&self, _feature: Feature) -> bool {
        true
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        let url = format!("{}{}", self.config.base_url, Self::endpoint(request.feature));
        let mut builder = self.client.post(&url).json(&self.build_body(request));
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| request_error(&e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(feature = %request.feature, %status, "Gateway rejected generation");
            return Err(error_for_status(status, &body));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| request_error(&e))?;
        let (content, assets) = parse_output(request.feature, &json)?;

        Ok(GenerationOutput {
            feature: request.feature,
            content,
            assets,
            model: self.model_for(request),
            provider: self.name().to_string(),
        })
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/v1/models", self.config.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!("Gateway health check failed: {}", e);
                Ok(false)
            }
        }
    }
}
