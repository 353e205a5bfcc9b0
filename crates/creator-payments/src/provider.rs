//! Payment provider seam
//!
//! The reconciliation code only sees these types. `StripeClient` maps them to
//! and from the Stripe API; `MockPaymentProvider` keeps them in memory.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

impl PaymentStatus {
    pub const fn is_paid(self) -> bool {
        matches!(self, Self::Paid)
    }
}

/// What a checkout line charges for
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionLine {
    /// A catalog price known to the provider
    Price { price_id: String },

    /// An ad hoc priced line
    Custom {
        name: String,
        description: String,
        unit_amount_cents: i64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionMode {
    /// One-time charge
    Payment,

    /// Recurring price, first period charged at checkout
    Subscription,
}

/// Parameters for a new checkout session
#[derive(Clone, Debug)]
pub struct CreateSessionParams {
    pub mode: SessionMode,
    pub line: SessionLine,
    pub quantity: u64,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// A purchased line as reported by the provider
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub price_id: Option<String>,
    pub product_id: Option<String>,
    pub quantity: u64,
}

/// Provider-side view of a checkout session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSession {
    pub id: String,

    /// Hosted checkout page, present while the session is open
    pub url: Option<String>,

    pub payment_status: PaymentStatus,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    pub customer_email: Option<String>,

    pub amount_total: Option<i64>,

    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

impl ProviderSession {
    /// Product of the first line item, used when metadata is absent
    pub fn product_id(&self) -> Option<&str> {
        self.line_items
            .iter()
            .find_map(|item| item.product_id.as_deref())
    }

    pub fn price_id(&self) -> Option<&str> {
        self.line_items
            .iter()
            .find_map(|item| item.price_id.as_deref())
    }
}

/// A verified webhook event
#[derive(Clone, Debug)]
pub enum ProviderEvent {
    /// `checkout.session.completed`
    CheckoutCompleted(ProviderSession),

    /// Anything else, acknowledged and ignored
    Other { event_type: String },
}

/// Payment provider operations used by checkout and reconciliation
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a hosted checkout session
    async fn create_session(&self, params: CreateSessionParams) -> Result<ProviderSession>;

    /// Fetch a session with its line items
    async fn retrieve_session(&self, session_id: &str) -> Result<ProviderSession>;

    /// Verify the signature header and parse the event body
    fn construct_event(&self, payload: &str, signature: &str) -> Result<ProviderEvent>;

    fn name(&self) -> &str;
}
