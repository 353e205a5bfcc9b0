//! In-memory payment provider
//!
//! Sessions live in a map, payment is simulated with `mark_paid`, and
//! webhook events are signed with the same `t=,v1=` scheme Stripe uses so the
//! receiver's signature check runs unchanged in tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use creator_core::PlanCatalog;

use crate::error::{PaymentError, Result};
use crate::provider::{
    CreateSessionParams, LineItem, PaymentProvider, PaymentStatus, ProviderEvent, ProviderSession,
    SessionLine,
};
use crate::signature::{self, DEFAULT_TOLERANCE_SECS};

const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Serialize, Deserialize)]
struct MockEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: MockEventData,
}

#[derive(Serialize, Deserialize)]
struct MockEventData {
    object: serde_json::Value,
}

/// Mock payment provider
pub struct MockPaymentProvider {
    webhook_secret: String,
    sessions: Mutex<HashMap<String, ProviderSession>>,
    /// price id -> product id
    products: HashMap<String, String>,
    next_id: AtomicU64,
    create_calls: AtomicUsize,
    retrieve_calls: AtomicUsize,
}

impl MockPaymentProvider {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            sessions: Mutex::new(HashMap::new()),
            products: HashMap::new(),
            next_id: AtomicU64::new(1),
            create_calls: AtomicUsize::new(0),
            retrieve_calls: AtomicUsize::new(0),
        }
    }

    /// Resolve catalog prices to products on created sessions
    pub fn with_catalog(mut self, catalog: &PlanCatalog) -> Self {
        for plan in catalog.plans() {
            if let (Some(price), Some(product)) = (&plan.price_id, &plan.product_id) {
                self.products.insert(price.clone(), product.clone());
            }
        }
        self
    }

    fn sessions(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, ProviderSession>>> {
        self.sessions
            .lock()
            .map_err(|_| PaymentError::Stripe("mock session table poisoned".into()))
    }

    /// Store a session as if it had been created elsewhere
    pub fn insert_session(&self, session: ProviderSession) -> Result<()> {
        self.sessions()?.insert(session.id.clone(), session);
        Ok(())
    }

    /// Simulate the buyer completing payment
    pub fn mark_paid(&self, session_id: &str) -> Result<ProviderSession> {
        let mut sessions = self.sessions()?;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| PaymentError::Stripe(format!("No such checkout session: {session_id}")))?;
        session.payment_status = PaymentStatus::Paid;
        session.url = None;
        Ok(session.clone())
    }

    pub fn session(&self, session_id: &str) -> Result<Option<ProviderSession>> {
        Ok(self.sessions()?.get(session_id).cloned())
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn retrieve_calls(&self) -> usize {
        self.retrieve_calls.load(Ordering::SeqCst)
    }

    /// Signed `checkout.session.completed` payload and its signature header
    pub fn completed_event(&self, session: &ProviderSession) -> Result<(String, String)> {
        let object =
            serde_json::to_value(session).map_err(|e| PaymentError::WebhookParse(e.to_string()))?;
        self.signed_event(CHECKOUT_COMPLETED, object)
    }

    /// Signed payload of an arbitrary event type
    pub fn signed_event(&self, event_type: &str, object: serde_json::Value) -> Result<(String, String)> {
        let payload = serde_json::to_string(&MockEvent {
            event_type: event_type.to_string(),
            data: MockEventData { object },
        })
        .map_err(|e| PaymentError::WebhookParse(e.to_string()))?;
        let header = signature::sign(&self.webhook_secret, Utc::now().timestamp(), &payload)?;
        Ok((payload, header))
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_session(&self, params: CreateSessionParams) -> Result<ProviderSession> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let id = format!("cs_test_{:04}", self.next_id.fetch_add(1, Ordering::SeqCst));

        let (line_item, unit_amount) = match &params.line {
            SessionLine::Price { price_id } => (
                LineItem {
                    price_id: Some(price_id.clone()),
                    product_id: self.products.get(price_id).cloned(),
                    quantity: params.quantity,
                },
                None,
            ),
            SessionLine::Custom {
                unit_amount_cents, ..
            } => (
                LineItem {
                    price_id: None,
                    product_id: None,
                    quantity: params.quantity,
                },
                Some(*unit_amount_cents),
            ),
        };

        let session = ProviderSession {
            url: Some(format!("https://checkout.mock/pay/{id}")),
            id,
            payment_status: PaymentStatus::Unpaid,
            metadata: params.metadata,
            customer_email: params.customer_email,
            amount_total: unit_amount.and_then(|cents| {
                i64::try_from(params.quantity)
                    .ok()
                    .and_then(|q| cents.checked_mul(q))
            }),
            line_items: vec![line_item],
        };

        self.insert_session(session.clone())?;
        Ok(session)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<ProviderSession> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        self.session(session_id)?
            .ok_or_else(|| PaymentError::Stripe(format!("No such checkout session: {session_id}")))
    }

    fn construct_event(&self, payload: &str, signature: &str) -> Result<ProviderEvent> {
        signature::verify(
            &self.webhook_secret,
            signature,
            payload,
            Utc::now().timestamp(),
            DEFAULT_TOLERANCE_SECS,
        )?;

        let event: MockEvent =
            serde_json::from_str(payload).map_err(|e| PaymentError::WebhookParse(e.to_string()))?;

        if event.event_type == CHECKOUT_COMPLETED {
            let session = serde_json::from_value(event.data.object)
                .map_err(|e| PaymentError::WebhookParse(e.to_string()))?;
            Ok(ProviderEvent::CheckoutCompleted(session))
        } else {
            Ok(ProviderEvent::Other {
                event_type: event.event_type,
            })
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
