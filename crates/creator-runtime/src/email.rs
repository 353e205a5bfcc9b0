//! Email delivery over an HTTP email API

use async_trait::async_trait;
use std::time::Duration;

use creator_core::{
    error::{CreatorError, Result},
    notification::{EmailMessage, EmailSender},
};

#[derive(Clone, Debug)]
pub struct EmailConfig {
    /// Send endpoint (e.g. `https://api.resend.com/emails`)
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

impl EmailConfig {
    /// Read `EMAIL_API_URL`, `EMAIL_API_KEY` and `EMAIL_FROM`
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        Some(Self {
            api_url: lookup("EMAIL_API_URL")?,
            api_key: lookup("EMAIL_API_KEY")?,
            from: lookup("EMAIL_FROM").unwrap_or_else(|| "Creator <no-reply@creator.app>".into()),
        })
    }
}

pub struct HttpEmailSender {
    client: reqwest::Client,
    config: EmailConfig,
}

impl HttpEmailSender {
    pub fn new(config: EmailConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| CreatorError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let body = serde_json::json!({
            "from": self.config.from,
            "to": [message.to],
            "subject": message.subject,
            "html": message.html,
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CreatorError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CreatorError::Provider(format!("email API {status}: {text}")));
        }

        tracing::info!(to = %message.to, subject = %message.subject, "Email sent");
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}
