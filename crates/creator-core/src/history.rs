//! Credit History
//!
//! Append-only audit trail of balance mutations. Amounts are always positive;
//! the direction says whether the balance went up or down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::{AccountRef, UserId};
use crate::error::Result;
use crate::ledger::BalanceChange;

/// Why the balance changed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Purchase,
    Consumption,
    Reset,
    Refund,
}

impl ActionType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Consumption => "consumption",
            Self::Reset => "reset",
            Self::Refund => "refund",
        }
    }
}

/// Which way the balance moved
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    /// Direction that takes `before` to `after`
    pub const fn between(before: u64, after: u64) -> Self {
        if after >= before {
            Self::Credit
        } else {
            Self::Debit
        }
    }
}

/// One immutable history record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreditHistoryEntry {
    pub id: Uuid,

    /// Ledger row that changed
    pub account: AccountRef,

    /// User who triggered the change (None for provider-initiated changes)
    pub actor: Option<UserId>,

    pub action: ActionType,

    pub direction: Direction,

    /// Size of the change, always positive
    pub amount: u64,

    pub balance_before: u64,

    pub balance_after: u64,

    pub description: String,

    #[serde(default)]
    pub metadata: serde_json::Value,

    /// Unique when present; a second append with the same key is dropped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl CreditHistoryEntry {
    /// Build an entry from the observed balance change
    pub fn new(
        account: AccountRef,
        action: ActionType,
        change: BalanceChange,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account,
            actor: None,
            action,
            direction: Direction::between(change.before, change.after),
            amount: change.before.abs_diff(change.after),
            balance_before: change.before,
            balance_after: change.after,
            description: description.into(),
            metadata: serde_json::Value::Null,
            idempotency_key: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_actor(mut self, actor: Option<UserId>) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Signed view of the change (credits positive, debits negative)
    pub fn signed_delta(&self) -> i128 {
        match self.direction {
            Direction::Credit => i128::from(self.amount),
            Direction::Debit => -i128::from(self.amount),
        }
    }
}

/// History storage trait
pub trait HistoryStore: Send + Sync {
    /// Append an entry. Returns `false` when an entry with the same
    /// idempotency key already exists (nothing is written).
    fn append(&self, entry: &CreditHistoryEntry) -> Result<bool>;

    /// Entries for an account, newest first
    fn list(&self, account: &AccountRef, limit: usize) -> Result<Vec<CreditHistoryEntry>>;

    /// Entry recorded under an idempotency key
    fn find_by_key(&self, key: &str) -> Result<Option<CreditHistoryEntry>>;
}
