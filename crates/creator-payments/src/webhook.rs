//! Stripe Webhook Handling
//!
//! Asynchronous confirmation path. Events are verified before anything in
//! them is trusted; `checkout.session.completed` with a paid session is
//! reconciled under the same session id the verifier uses.

use std::sync::Arc;

use serde::Serialize;

use creator_core::{AccountRef, AccountStore, CreatorError, PurchaseKind, PurchaseSource};

use crate::error::{PaymentError, Result};
use crate::intent::PurchaseIntent;
use crate::provider::{PaymentProvider, ProviderEvent, ProviderSession};
use crate::reconcile::{PaidSession, ReconcileOutcome, Reconciler};

/// What the receiver did with an event
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Credited { session_id: String, credits: u64 },
    AlreadyProcessed { session_id: String },
    Ignored { reason: String },
}

/// Webhook receiver
#[derive(Clone)]
pub struct WebhookReceiver {
    provider: Arc<dyn PaymentProvider>,
    accounts: Arc<dyn AccountStore>,
    reconciler: Reconciler,
}

impl WebhookReceiver {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        accounts: Arc<dyn AccountStore>,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            provider,
            accounts,
            reconciler,
        }
    }

    /// Verify the signature and process the event
    pub async fn handle(&self, payload: &str, signature: &str) -> Result<WebhookOutcome> {
        let event = self.provider.construct_event(payload, signature)?;

        let session = match event {
            ProviderEvent::CheckoutCompleted(session) => session,
            ProviderEvent::Other { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
                return Ok(WebhookOutcome::Ignored { reason: event_type });
            }
        };

        tracing::info!(
            session_id = %session.id,
            payment_status = ?session.payment_status,
            "Processing checkout.session.completed"
        );

        if !session.payment_status.is_paid() {
            return Ok(WebhookOutcome::Ignored {
                reason: "payment not completed".into(),
            });
        }

        let paid = self.resolve(&session).await?;
        match self.reconciler.reconcile(paid)? {
            ReconcileOutcome::Credited { purchase, .. } => Ok(WebhookOutcome::Credited {
                session_id: purchase.session_id,
                credits: purchase.credits,
            }),
            ReconcileOutcome::AlreadyProcessed { purchase } => Ok(WebhookOutcome::AlreadyProcessed {
                session_id: purchase.session_id,
            }),
        }
    }

    /// Account and purchase for a paid session: from Creator metadata when
    /// present, otherwise from the buyer's email and the product table.
    async fn resolve(&self, session: &ProviderSession) -> Result<PaidSession> {
        if PurchaseIntent::is_present(&session.metadata) {
            let intent = PurchaseIntent::from_metadata(&session.metadata)?;
            return Ok(PaidSession::from_intent(
                session.id.clone(),
                &intent,
                session.amount_total,
                PurchaseSource::Webhook,
            ));
        }

        let email = session
            .customer_email
            .as_deref()
            .ok_or_else(|| PaymentError::MissingMetadata("customer_email".into()))?;
        let account = self
            .accounts
            .find_by_email(email)?
            .ok_or_else(|| CreatorError::AccountNotFound(format!("no account for {email}")))?;
        let buyer = match &account.owner {
            AccountRef::User(user) => Some(user.clone()),
            AccountRef::Team(_) => None,
        };

        // Event payloads omit line items; fetch them when needed
        let expanded;
        let session = if session.line_items.is_empty() {
            expanded = self.provider.retrieve_session(&session.id).await?;
            &expanded
        } else {
            session
        };

        let catalog = self.reconciler.catalog();
        let plan = session
            .product_id()
            .and_then(|product| catalog.by_product(product))
            .or_else(|| session.price_id().and_then(|price| catalog.by_price(price)))
            .ok_or_else(|| {
                PaymentError::UnknownProduct(
                    session
                        .product_id()
                        .or_else(|| session.price_id())
                        .unwrap_or("none")
                        .to_string(),
                )
            })?;

        // Payment links let the buyer pick a quantity; packages stack, plans do not
        let quantity = session.line_items.first().map_or(1, |item| item.quantity.max(1));
        let kind = if quantity == 1 {
            PurchaseKind::Plan {
                plan_id: plan.id.clone(),
            }
        } else if plan.is_subscription() {
            return Err(PaymentError::InvalidMetadata(format!(
                "subscription {} bought with quantity {quantity}",
                plan.id
            )));
        } else {
            let credits = plan.credits.checked_mul(quantity).ok_or_else(|| {
                PaymentError::InvalidMetadata(format!("quantity {quantity} of {} overflows", plan.id))
            })?;
            PurchaseKind::Custom { credits }
        };

        tracing::info!(
            session_id = %session.id,
            account = %account.owner,
            plan_id = %plan.id,
            quantity,
            "Resolved session by email and product"
        );

        Ok(PaidSession {
            session_id: session.id.clone(),
            account: account.owner,
            buyer,
            kind,
            amount_cents: session.amount_total,
            source: PurchaseSource::Webhook,
        })
    }
}
