//! creator HTTP Server
//!
//! Axum-based server for credit balances, checkout and payment
//! reconciliation, credit-metered generation and the signed auth-email hook.

mod auth;
mod config;
mod email;
mod error;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use creator_core::{GenerationProvider, Ledger, MemoryStore, ProviderRouter};
use creator_payments::{CheckoutConfig, StripeClient};
use creator_runtime::{EmailConfig, GatewayConfig, GatewayProvider, HttpEmailSender, OllamaProvider};
use creator_studio::{ConsumptionGuard, CreditCosts, Studio};

use crate::config::ServerConfig;
use crate::state::{AppState, EmailHook, Payments};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env()?;
    let catalog = Arc::new(config.catalog.clone());
    let store = Arc::new(MemoryStore::new());

    tracing::info!("Loaded {} plans:", catalog.plans().len());
    for plan in catalog.plans() {
        tracing::info!("  • {} ({} credits)", plan.id, plan.credits);
    }

    // Initialize generation providers
    let mut router = ProviderRouter::default();

    match GatewayConfig::from_env() {
        Some(gateway) => {
            let provider = GatewayProvider::new(gateway)?;
            log_health(&provider, "Gateway").await;
            router.push(Arc::new(provider));
        }
        None => {
            tracing::warn!("⚠ Gateway not configured - image and video generation disabled");
            tracing::warn!("  Set GATEWAY_URL and GATEWAY_API_KEY in .env");
        }
    }

    let ollama = OllamaProvider::from_env();
    log_health(&ollama, "Ollama").await;
    router.push(Arc::new(ollama));

    let costs = CreditCosts::from_env()?;
    let guard = ConsumptionGuard::new(Ledger::new(store.clone(), store.clone()), store.clone());
    let studio = Studio::new(guard, router, costs);

    // Build application state
    let mut state = AppState::new(
        &store,
        catalog.clone(),
        studio,
        config.admins.clone(),
        &config.public_url,
    );

    // Initialize payments
    match StripeClient::from_env() {
        Ok(stripe) => {
            let checkout = CheckoutConfig::from_env()?;
            state = state.with_payments(Payments::new(Arc::new(stripe), &store, &catalog, checkout));
            tracing::info!("✓ Stripe configured");
        }
        Err(e) => {
            tracing::warn!("⚠ Stripe not configured - payments disabled ({})", e);
            tracing::warn!("  Set STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET in .env");
        }
    }

    // Initialize email hook
    match (config.email_hook_secret.clone(), EmailConfig::from_env()) {
        (Some(secret), Some(email)) => {
            let sender = HttpEmailSender::new(email)?;
            state = state.with_email(EmailHook::new(secret, Arc::new(sender))?);
            tracing::info!("✓ Email hook configured");
        }
        _ => {
            tracing::warn!("⚠ Email hook not configured - auth emails disabled");
            tracing::warn!("  Set EMAIL_HOOK_SECRET, EMAIL_API_URL and EMAIL_API_KEY in .env");
        }
    }

    if config.admins.is_empty() {
        tracing::warn!("⚠ No admins configured - admin routes will refuse every caller");
        tracing::warn!("  Set CREATOR_ADMINS in .env to manage credits and teams");
    }

    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 creator server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health               - Health check");
    tracing::info!("  GET  /api/plans            - Plan catalog");
    tracing::info!("  GET  /api/credits          - Credit balance");
    tracing::info!("  GET  /api/credits/history  - Credit history");
    tracing::info!("  GET  /api/notifications    - Notifications");
    tracing::info!("  POST /api/checkout         - Create Stripe checkout");
    tracing::info!("  POST /api/payments/verify  - Verify checkout session");
    tracing::info!("  POST /api/generate         - Generate content");
    tracing::info!("  POST /api/admin/credits    - Reset or refund credits");
    tracing::info!("  POST /api/admin/teams      - Create team and members");
    tracing::info!("  POST /webhook/stripe       - Stripe webhook");
    tracing::info!("  POST /hooks/email          - Signed auth email hook");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn log_health(provider: &dyn GenerationProvider, label: &str) {
    match provider.health_check().await {
        Ok(true) => tracing::info!("✓ Connected to {}", label),
        Ok(false) | Err(_) => tracing::warn!("⚠ {} not available - its features will fail", label),
    }
}
