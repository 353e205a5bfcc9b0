//! Router

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::email::email_hook;
use crate::handlers::{
    admin_credits, admin_teams, create_checkout, credit_history, generate, get_credits, health_check,
    list_notifications, list_plans, stripe_webhook, verify_payment,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & catalog
        .route("/health", get(health_check))
        .route("/api/plans", get(list_plans))

        // Credits
        .route("/api/credits", get(get_credits))
        .route("/api/credits/history", get(credit_history))
        .route("/api/notifications", get(list_notifications))
        .route("/api/generate", post(generate))
        .route("/api/admin/credits", post(admin_credits))
        .route("/api/admin/teams", post(admin_teams))

        // Payments
        .route("/api/checkout", post(create_checkout))
        .route("/api/payments/verify", post(verify_payment))
        .route("/webhook/stripe", post(stripe_webhook))

        // Auth email
        .route("/hooks/email", post(email_hook))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
