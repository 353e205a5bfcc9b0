//! Error Types

use thiserror::Error;

/// Result type alias for ledger and provider operations
pub type Result<T> = std::result::Result<T, CreatorError>;

/// Creator error types
#[derive(Error, Debug)]
pub enum CreatorError {
    /// Input failed validation before any side effect
    #[error("Validation error: {0}")]
    Validation(String),

    /// Caller identity missing or unknown
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller known but not allowed to act on the account
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// No ledger row for the account
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Plan or package missing from the catalog
    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    /// Balance lower than the cost of the requested action
    #[error("Insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: u64, available: u64 },

    /// Generation provider answered 429
    #[error("Provider rate limited: {0}")]
    RateLimited(String),

    /// Generation provider answered 402 (its own credits ran out)
    #[error("Provider credits exhausted: {0}")]
    ProviderCreditsExhausted(String),

    /// Generation provider failed
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl CreatorError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_)
                | Self::ProviderUnavailable(_)
                | Self::Provider(_)
                | Self::Storage(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => format!("Invalid request: {msg}"),
            Self::Unauthorized(_) => "Please sign in to continue.".into(),
            Self::Forbidden(msg) => format!("Not allowed: {msg}"),
            Self::AccountNotFound(_) => "Account not found.".into(),
            Self::PlanNotFound(id) => format!("The plan '{id}' does not exist."),
            Self::InsufficientCredits {
                required,
                available,
            } => format!(
                "Insufficient credits: this action needs {required} credits and you have {available}."
            ),
            Self::RateLimited(_) => {
                "The generation service is busy. Please try again in a moment.".into()
            }
            Self::ProviderCreditsExhausted(_) => {
                "The generation service is temporarily unavailable. You have not been charged."
                    .into()
            }
            Self::Provider(_) | Self::ProviderUnavailable(_) => {
                "The generation service failed. You have not been charged.".into()
            }
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for CreatorError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
