//! Payment Error Types

use creator_core::CreatorError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Stripe API error
    #[error("Stripe error: {0}")]
    Stripe(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Request rejected before contacting the provider
    #[error("Invalid purchase: {0}")]
    Validation(String),

    /// Session metadata missing a required field
    #[error("Missing session metadata: {0}")]
    MissingMetadata(String),

    /// Session metadata present but unusable
    #[error("Invalid session metadata: {0}")]
    InvalidMetadata(String),

    /// Product not present in the catalog
    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    /// Caller may not act on this purchase or account
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ledger, store or account error
    #[error(transparent)]
    Core(#[from] CreatorError),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Stripe(_) => true,
            Self::Core(inner) => inner.is_retryable(),
            _ => false,
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Stripe(_) => "Payment processing failed. Please try again.".into(),
            Self::Validation(msg) => format!("Invalid purchase: {msg}"),
            Self::MissingMetadata(_) | Self::InvalidMetadata(_) | Self::UnknownProduct(_) => {
                "We could not match this payment to a purchase. Please contact support.".into()
            }
            Self::Forbidden(msg) => format!("Not allowed: {msg}"),
            Self::Config(_) => "Service configuration error.".into(),
            Self::Core(inner) => inner.user_message(),
            _ => "An error occurred processing your request.".into(),
        }
    }
}
