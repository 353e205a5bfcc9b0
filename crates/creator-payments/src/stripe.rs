//! Stripe Checkout Integration
//!
//! Hosted checkout: the buyer is redirected to Stripe and comes back to the
//! success URL carrying the session id, which the payment verifier
//! reconciles. `checkout.session.completed` webhooks reconcile the same
//! session on the asynchronous path.

use async_trait::async_trait;
use stripe::{
    CheckoutSession, CheckoutSessionId, CheckoutSessionMode, CheckoutSessionPaymentStatus, Client,
    CreateCheckoutSession, CreateCheckoutSessionLineItems, CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData, Currency, CustomerId, Event, EventObject,
    EventType, Webhook,
};

use crate::error::{PaymentError, Result};
use crate::provider::{
    CreateSessionParams, LineItem, PaymentProvider, PaymentStatus, ProviderEvent, ProviderSession,
    SessionLine, SessionMode,
};

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
    webhook_secret: String,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str, webhook_secret: &str) -> Self {
        Self {
            client: Client::new(secret_key),
            webhook_secret: webhook_secret.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| PaymentError::Config("STRIPE_WEBHOOK_SECRET not set".into()))?;

        Ok(Self::new(&secret_key, &webhook_secret))
    }

    fn line_item(params: &CreateSessionParams) -> CreateCheckoutSessionLineItems {
        match &params.line {
            SessionLine::Price { price_id } => CreateCheckoutSessionLineItems {
                price: Some(price_id.clone()),
                quantity: Some(params.quantity),
                ..Default::default()
            },
            SessionLine::Custom {
                name,
                description,
                unit_amount_cents,
            } => CreateCheckoutSessionLineItems {
                quantity: Some(params.quantity),
                price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                    currency: Currency::USD,
                    unit_amount: Some(*unit_amount_cents),
                    product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                        name: name.clone(),
                        description: Some(description.clone()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
        }
    }

    fn convert_session(session: CheckoutSession) -> ProviderSession {
        let payment_status = match session.payment_status {
            CheckoutSessionPaymentStatus::Paid => PaymentStatus::Paid,
            CheckoutSessionPaymentStatus::NoPaymentRequired => PaymentStatus::NoPaymentRequired,
            CheckoutSessionPaymentStatus::Unpaid => PaymentStatus::Unpaid,
        };

        let customer_email = session.customer_email.clone().or_else(|| {
            session
                .customer_details
                .as_ref()
                .and_then(|details| details.email.clone())
        });

        let line_items = session
            .line_items
            .map(|list| {
                list.data
                    .into_iter()
                    .map(|item| LineItem {
                        price_id: item.price.as_ref().map(|p| p.id.to_string()),
                        product_id: item
                            .price
                            .as_ref()
                            .and_then(|p| p.product.as_ref())
                            .map(|product| product.id().to_string()),
                        quantity: item.quantity.unwrap_or(1),
                    })
                    .collect()
            })
            .unwrap_or_default();

        ProviderSession {
            id: session.id.to_string(),
            url: session.url,
            payment_status,
            metadata: session.metadata.unwrap_or_default(),
            customer_email,
            amount_total: session.amount_total,
            line_items,
        }
    }

    fn convert_event(event: Event) -> Result<ProviderEvent> {
        match event.type_ {
            EventType::CheckoutSessionCompleted => {
                if let EventObject::CheckoutSession(session) = event.data.object {
                    Ok(ProviderEvent::CheckoutCompleted(Self::convert_session(session)))
                } else {
                    Err(PaymentError::WebhookParse("Invalid checkout session data".into()))
                }
            }
            other => Ok(ProviderEvent::Other {
                event_type: other.to_string(),
            }),
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_session(&self, params: CreateSessionParams) -> Result<ProviderSession> {
        let customer = params
            .customer_id
            .as_deref()
            .map(|id| {
                id.parse::<CustomerId>()
                    .map_err(|_| PaymentError::Validation(format!("invalid customer id '{id}'")))
            })
            .transpose()?;

        let mut create = CreateCheckoutSession::new();
        create.mode = Some(match params.mode {
            SessionMode::Payment => CheckoutSessionMode::Payment,
            SessionMode::Subscription => CheckoutSessionMode::Subscription,
        });
        create.success_url = Some(&params.success_url);
        create.cancel_url = Some(&params.cancel_url);
        create.line_items = Some(vec![Self::line_item(&params)]);
        create.metadata = Some(params.metadata.clone());
        if customer.is_some() {
            create.customer = customer;
        } else {
            create.customer_email = params.customer_email.as_deref();
        }

        let session = CheckoutSession::create(&self.client, create)
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        if session.url.is_none() {
            return Err(PaymentError::Stripe("No checkout URL returned".into()));
        }

        Ok(Self::convert_session(session))
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<ProviderSession> {
        let id: CheckoutSessionId = session_id
            .parse()
            .map_err(|_| PaymentError::Validation(format!("invalid session id '{session_id}'")))?;

        let session = CheckoutSession::retrieve(&self.client, &id, &["line_items"])
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        Ok(Self::convert_session(session))
    }

    fn construct_event(&self, payload: &str, signature: &str) -> Result<ProviderEvent> {
        let event = Webhook::construct_event(payload, signature, &self.webhook_secret)
            .map_err(|e| PaymentError::WebhookSignature(e.to_string()))?;

        tracing::debug!(event_id = %event.id, event_type = %event.type_, "Verified Stripe event");
        Self::convert_event(event)
    }

    fn name(&self) -> &str {
        "stripe"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn params(line: SessionLine) -> CreateSessionParams {
        CreateSessionParams {
            mode: SessionMode::Payment,
            line,
            quantity: 20,
            success_url: "https://app/success?session_id={CHECKOUT_SESSION_ID}".into(),
            cancel_url: "https://app/billing".into(),
            customer_id: None,
            customer_email: Some("a@b.c".into()),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_custom_line_uses_price_data() {
        let item = StripeClient::line_item(&params(SessionLine::Custom {
            name: "20 Creator credits".into(),
            description: "One-time credit purchase".into(),
            unit_amount_cents: 10,
        }));
        assert_eq!(item.quantity, Some(20));
        assert!(item.price.is_none());
        let price_data = item.price_data.unwrap();
        assert_eq!(price_data.unit_amount, Some(10));
    }

    #[test]
    fn test_catalog_line_uses_price_id() {
        let item = StripeClient::line_item(&params(SessionLine::Price {
            price_id: "price_pack_250".into(),
        }));
        assert_eq!(item.price.as_deref(), Some("price_pack_250"));
        assert!(item.price_data.is_none());
    }

    #[test]
    fn test_bad_signature_is_signature_error() {
        let client = StripeClient::new("sk_test_x", "whsec_x");
        let result = client.construct_event("{}", "t=1,v1=00");
        assert!(matches!(result, Err(PaymentError::WebhookSignature(_))));
    }
}
