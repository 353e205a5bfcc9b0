//! Credit Purchases
//!
//! One record per checkout session. The session id is unique, and the
//! `pending -> completed` transition happens at most once; together these are
//! the idempotence gate shared by the payment verifier and the webhook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::{AccountRef, UserId};
use crate::error::Result;

/// What was bought
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PurchaseKind {
    /// Catalog plan or credit package
    Plan { plan_id: String },

    /// Free-form credit quantity
    Custom { credits: u64 },
}

impl PurchaseKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Plan { .. } => "plan",
            Self::Custom { .. } => "custom",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Completed,
}

/// Which reconciliation path wrote the record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseSource {
    Verifier,
    Webhook,
}

/// A payment record keyed by checkout session id
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreditPurchase {
    pub session_id: String,
    pub account: AccountRef,
    pub buyer: Option<UserId>,
    pub kind: PurchaseKind,
    pub credits: u64,
    pub amount_cents: Option<i64>,
    pub status: PurchaseStatus,
    pub source: PurchaseSource,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CreditPurchase {
    /// New pending record
    pub fn pending(
        session_id: impl Into<String>,
        account: AccountRef,
        kind: PurchaseKind,
        credits: u64,
        source: PurchaseSource,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            account,
            buyer: None,
            kind,
            credits,
            amount_cents: None,
            status: PurchaseStatus::Pending,
            source,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn with_buyer(mut self, buyer: Option<UserId>) -> Self {
        self.buyer = buyer;
        self
    }

    pub const fn with_amount_cents(mut self, amount_cents: Option<i64>) -> Self {
        self.amount_cents = amount_cents;
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == PurchaseStatus::Completed
    }
}

/// Result of claiming a session id
#[derive(Clone, Debug)]
pub enum ClaimOutcome {
    /// Record inserted by this call
    Claimed(CreditPurchase),

    /// A pending record already existed (concurrent or interrupted run)
    InFlight(CreditPurchase),

    /// Already completed
    Completed(CreditPurchase),
}

/// Purchase storage trait
pub trait PurchaseStore: Send + Sync {
    /// Get purchase by session id
    fn get(&self, session_id: &str) -> Result<Option<CreditPurchase>>;

    /// Insert a pending record unless one exists for the session id
    fn claim(&self, purchase: &CreditPurchase) -> Result<ClaimOutcome>;

    /// Move a pending record to completed. Returns `true` only for the call
    /// that performed the transition.
    fn complete(&self, session_id: &str) -> Result<bool>;

    /// Purchases of an account, newest first
    fn list(&self, account: &AccountRef) -> Result<Vec<CreditPurchase>>;
}
