//! HTTP error mapping

use axum::{Json, http::StatusCode};
use serde::{Deserialize, Serialize};

use creator_core::CreatorError;
use creator_payments::PaymentError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,

    /// Credits the action needs (insufficient credits only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<u64>,

    /// Credits the account has (insufficient credits only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<u64>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
            required: None,
            available: None,
        }),
    )
}

pub fn payments_disabled() -> ApiError {
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "PAYMENTS_DISABLED",
        "Payments not configured",
    )
}

pub fn creator_error(err: CreatorError) -> ApiError {
    let (status, code) = match &err {
        CreatorError::Validation(_) | CreatorError::Json(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
        CreatorError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        CreatorError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        CreatorError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "ACCOUNT_NOT_FOUND"),
        CreatorError::PlanNotFound(_) => (StatusCode::NOT_FOUND, "PLAN_NOT_FOUND"),
        CreatorError::InsufficientCredits { required, available } => {
            return (
                StatusCode::PAYMENT_REQUIRED,
                Json(ErrorResponse {
                    error: err.user_message(),
                    code: "INSUFFICIENT_CREDITS".into(),
                    required: Some(*required),
                    available: Some(*available),
                }),
            );
        }
        CreatorError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
        CreatorError::ProviderCreditsExhausted(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_CREDITS_EXHAUSTED"),
        CreatorError::Provider(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
        CreatorError::ProviderUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "PROVIDER_UNAVAILABLE"),
        CreatorError::Storage(_) | CreatorError::Config(_) | CreatorError::Other(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
        }
    };

    if status.is_server_error() {
        tracing::error!(error = %err, code, "Request failed");
    } else {
        tracing::debug!(error = %err, code, "Request rejected");
    }

    api_error(status, code, err.user_message())
}

pub fn payment_error(err: PaymentError) -> ApiError {
    let err = match err {
        PaymentError::Core(inner) => return creator_error(inner),
        other => other,
    };

    let (status, code) = match &err {
        PaymentError::WebhookSignature(_) => (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
        PaymentError::WebhookParse(_) => (StatusCode::BAD_REQUEST, "INVALID_EVENT"),
        PaymentError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
        PaymentError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        PaymentError::MissingMetadata(_)
        | PaymentError::InvalidMetadata(_)
        | PaymentError::UnknownProduct(_) => (StatusCode::UNPROCESSABLE_ENTITY, "UNRESOLVED_PURCHASE"),
        PaymentError::Stripe(_) => (StatusCode::BAD_GATEWAY, "PAYMENT_PROVIDER_ERROR"),
        PaymentError::Config(_) | PaymentError::Core(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
    };

    if status.is_server_error() || status == StatusCode::UNPROCESSABLE_ENTITY {
        tracing::error!(error = %err, code, "Payment request failed");
    } else {
        tracing::warn!(error = %err, code, "Payment request rejected");
    }

    api_error(status, code, err.user_message())
}
