//! Scripted Generation Provider
//!
//! For testing and demo purposes. Replays queued results in order and falls
//! back to an echo of the prompt once the script runs out.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use creator_core::{
    CreatorError, Feature, GenerationOutput, GenerationProvider, GenerationRequest, Result,
};

/// Queued outcome of one call
#[derive(Clone, Debug)]
pub enum Scripted {
    Ok(String),

    /// Upstream answered with this HTTP status
    Status(u16),
}

#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Scripted>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, outcome: Scripted) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Option<Scripted> {
        self.script.lock().ok().and_then(|mut script| script.pop_front())
    }
}

fn status_error(status: u16) -> CreatorError {
    match status {
        429 => CreatorError::RateLimited("provider rate limit".into()),
        402 => CreatorError::ProviderCreditsExhausted("provider credits exhausted".into()),
        502..=504 => CreatorError::ProviderUnavailable(format!("provider returned {status}")),
        _ => CreatorError::Provider(format!("provider returned {status}")),
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn supports(&self, _feature: Feature) -> bool {
        true
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = match self.next() {
            Some(Scripted::Ok(content)) => content,
            Some(Scripted::Status(status)) => return Err(status_error(status)),
            None => format!("[{}] {}", request.feature, request.full_prompt()),
        };

        let assets = if request.feature.is_text() {
            Vec::new()
        } else {
            vec![format!("https://assets.mock/{}.bin", request.feature)]
        };

        Ok(GenerationOutput {
            feature: request.feature,
            content,
            assets,
            model: request.model.clone().unwrap_or_else(|| "scripted-1".into()),
            provider: self.name().to_string(),
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
