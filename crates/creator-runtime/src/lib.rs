//! # creator-runtime
//!
//! Outbound integrations for Creator.
//!
//! ## Providers
//!
//! - **Gateway**: OpenAI-compatible HTTP gateway for images, videos and text
//! - **Ollama** (default feature): local text generation for captions, plans and reviews
//! - **Email**: HTTP email API used by the auth email hook
//!
//! ## Usage
//!
//! ```rust,ignore
//! use creator_runtime::{GatewayConfig, GatewayProvider};
//!
//! let gateway = GatewayProvider::new(GatewayConfig::from_env().unwrap_or_default())?;
//! let router = ProviderRouter::new(vec![Arc::new(gateway)]);
//! ```

pub mod email;
pub mod gateway;
mod prompts;

#[cfg(feature = "ollama")]
pub mod ollama;

pub use email::{EmailConfig, HttpEmailSender};
pub use gateway::{GatewayConfig, GatewayProvider};

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};
