//! # creator-payments
//!
//! Credit purchases through Stripe Checkout (hosted).
//!
//! ```text
//! ┌─────────────┐  create   ┌─────────────────┐  redirect  ┌──────────────────┐
//! │  Checkout   │──────────▶│  Stripe Hosted  │───────────▶│ PaymentVerifier  │──┐
//! │  Builder    │ metadata  │  Checkout Page  │            └──────────────────┘  │
//! └─────────────┘           └─────────────────┘                                  ▼
//!                                   │ checkout.session.completed        ┌────────────┐
//!                                   └──────────────────────────────────▶│ Reconciler │
//!                                          WebhookReceiver              └────────────┘
//! ```
//!
//! Both confirmation paths end in the [`Reconciler`], which applies a session
//! at most once no matter how often or in what order the paths fire.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use creator_payments::{CheckoutBuilder, CheckoutConfig, StripeClient};
//!
//! let stripe = Arc::new(StripeClient::from_env()?);
//! let checkout = CheckoutBuilder::new(stripe, accounts, catalog, CheckoutConfig::from_env()?);
//!
//! let session = checkout.create(&user, request).await?;
//! // Redirect user to: session.checkout_url
//! ```

mod checkout;
mod error;
mod intent;
mod mock;
mod provider;
mod reconcile;
pub mod signature;
mod stripe;
mod verify;
mod webhook;

pub use checkout::{
    CheckoutBuilder, CheckoutConfig, CheckoutItem, CheckoutRequest, CheckoutSession,
    MAX_CUSTOM_CREDITS, MIN_CUSTOM_CREDITS,
};
pub use error::{PaymentError, Result};
pub use intent::PurchaseIntent;
pub use mock::MockPaymentProvider;
pub use provider::{
    CreateSessionParams, LineItem, PaymentProvider, PaymentStatus, ProviderEvent, ProviderSession,
    SessionLine, SessionMode,
};
pub use reconcile::{PaidSession, ReconcileOutcome, Reconciler};
pub use stripe::StripeClient;
pub use verify::{PaymentVerifier, VerifyOutcome};
pub use webhook::{WebhookOutcome, WebhookReceiver};
