//! Credit Ledger
//!
//! `LedgerStore` is the row-level accessor for balances; every operation is a
//! single conditional update of one account row. `Ledger` pairs it with the
//! history store so each mutation leaves an audit entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::account::{AccountRef, UserId};
use crate::error::{CreatorError, Result};
use crate::history::{ActionType, CreditHistoryEntry, HistoryStore};

/// Balance observed before and after a mutation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub before: u64,
    pub after: u64,
}

impl BalanceChange {
    pub const fn unchanged(balance: u64) -> Self {
        Self {
            before: balance,
            after: balance,
        }
    }
}

/// Plan switch applied together with a subscription grant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanChange {
    pub plan_id: String,
    pub period_end: DateTime<Utc>,
}

/// Credits (and optionally a plan) granted by a purchase
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditGrant {
    pub amount: u64,
    pub plan: Option<PlanChange>,
}

impl CreditGrant {
    pub const fn credits(amount: u64) -> Self {
        Self { amount, plan: None }
    }

    pub fn with_plan(mut self, plan_id: impl Into<String>, period_end: DateTime<Utc>) -> Self {
        self.plan = Some(PlanChange {
            plan_id: plan_id.into(),
            period_end,
        });
        self
    }
}

/// Result of a keyed grant
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantOutcome {
    /// Applied by this call
    Applied(BalanceChange),

    /// Applied earlier under the same key; carries the recorded change
    AlreadyApplied(BalanceChange),
}

impl GrantOutcome {
    pub const fn change(&self) -> BalanceChange {
        match self {
            Self::Applied(change) | Self::AlreadyApplied(change) => *change,
        }
    }

    pub const fn was_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Row-level balance accessor
pub trait LedgerStore: Send + Sync {
    /// Current balance (`AccountNotFound` when the row is missing)
    fn balance(&self, owner: &AccountRef) -> Result<u64>;

    /// Subtract `amount` unless that would go below zero, in which case
    /// nothing changes and `InsufficientCredits` is returned
    fn debit(&self, owner: &AccountRef, amount: u64) -> Result<BalanceChange>;

    /// Add `amount`
    fn credit(&self, owner: &AccountRef, amount: u64) -> Result<BalanceChange>;

    /// Apply a grant at most once per `key`
    fn credit_once(&self, owner: &AccountRef, key: &str, grant: &CreditGrant) -> Result<GrantOutcome>;

    /// Overwrite the balance
    fn set_balance(&self, owner: &AccountRef, credits: u64) -> Result<BalanceChange>;
}

/// Result of a purchase grant
#[derive(Clone, Debug)]
pub struct GrantReceipt {
    pub change: BalanceChange,

    /// Whether this call moved the balance
    pub newly_applied: bool,

    /// The history entry recorded for the grant key
    pub entry: CreditHistoryEntry,
}

/// Result of a consumption
#[derive(Clone, Debug)]
pub struct ConsumptionReceipt {
    pub change: BalanceChange,

    /// None when the cost was zero or the history write failed
    pub entry: Option<CreditHistoryEntry>,
}

/// Ledger facade: balance mutations plus their history
#[derive(Clone)]
pub struct Ledger {
    accounts: Arc<dyn LedgerStore>,
    history: Arc<dyn HistoryStore>,
}

impl Ledger {
    pub fn new(accounts: Arc<dyn LedgerStore>, history: Arc<dyn HistoryStore>) -> Self {
        Self { accounts, history }
    }

    pub fn balance(&self, owner: &AccountRef) -> Result<u64> {
        self.accounts.balance(owner)
    }

    /// Fail with `InsufficientCredits` if the balance is below `cost`.
    /// Returns the available balance.
    pub fn ensure_sufficient(&self, owner: &AccountRef, cost: u64) -> Result<u64> {
        let available = self.accounts.balance(owner)?;
        if available < cost {
            return Err(CreatorError::InsufficientCredits {
                required: cost,
                available,
            });
        }
        Ok(available)
    }

    /// Deduct the cost of a completed action. The history entry is written
    /// after the debit; a failed history write is logged, not returned.
    pub fn consume(
        &self,
        owner: &AccountRef,
        actor: &UserId,
        cost: u64,
        description: &str,
        metadata: serde_json::Value,
    ) -> Result<ConsumptionReceipt> {
        if cost == 0 {
            let balance = self.accounts.balance(owner)?;
            return Ok(ConsumptionReceipt {
                change: BalanceChange::unchanged(balance),
                entry: None,
            });
        }

        let change = self.accounts.debit(owner, cost)?;
        let entry = CreditHistoryEntry::new(owner.clone(), ActionType::Consumption, change, description)
            .with_actor(Some(actor.clone()))
            .with_metadata(metadata);

        let entry = match self.history.append(&entry) {
            Ok(_) => Some(entry),
            Err(e) => {
                tracing::warn!(
                    account = %owner,
                    cost,
                    error = %e,
                    "Failed to record consumption history"
                );
                None
            }
        };

        tracing::info!(
            account = %owner,
            cost,
            before = change.before,
            after = change.after,
            "Credits consumed"
        );

        Ok(ConsumptionReceipt { change, entry })
    }

    /// Apply a purchase grant under `key` and record it. Safe to repeat:
    /// the balance moves once and one history entry exists per key.
    pub fn grant_purchase(
        &self,
        owner: &AccountRef,
        actor: Option<&UserId>,
        key: &str,
        grant: &CreditGrant,
        description: &str,
        metadata: serde_json::Value,
    ) -> Result<GrantReceipt> {
        let outcome = self.accounts.credit_once(owner, key, grant)?;
        let change = outcome.change();

        let entry = CreditHistoryEntry::new(owner.clone(), ActionType::Purchase, change, description)
            .with_actor(actor.cloned())
            .with_metadata(metadata)
            .with_idempotency_key(key);

        let entry = if self.history.append(&entry)? {
            entry
        } else {
            self.history.find_by_key(key)?.unwrap_or(entry)
        };

        if outcome.was_applied() {
            tracing::info!(
                account = %owner,
                key,
                amount = grant.amount,
                before = change.before,
                after = change.after,
                "Credits granted"
            );
        } else {
            tracing::debug!(account = %owner, key, "Grant already applied");
        }

        Ok(GrantReceipt {
            change,
            newly_applied: outcome.was_applied(),
            entry,
        })
    }

    /// Give credits back
    pub fn refund(
        &self,
        owner: &AccountRef,
        actor: Option<&UserId>,
        amount: u64,
        reason: &str,
    ) -> Result<CreditHistoryEntry> {
        if amount == 0 {
            return Err(CreatorError::Validation("refund amount must be positive".into()));
        }
        let change = self.accounts.credit(owner, amount)?;
        let entry = CreditHistoryEntry::new(owner.clone(), ActionType::Refund, change, reason)
            .with_actor(actor.cloned());
        self.history.append(&entry)?;

        tracing::info!(account = %owner, amount, after = change.after, "Credits refunded");
        Ok(entry)
    }

    /// Overwrite the balance (plan renewal, admin correction)
    pub fn reset(
        &self,
        owner: &AccountRef,
        actor: Option<&UserId>,
        credits: u64,
        reason: &str,
    ) -> Result<CreditHistoryEntry> {
        let change = self.accounts.set_balance(owner, credits)?;
        let entry = CreditHistoryEntry::new(owner.clone(), ActionType::Reset, change, reason)
            .with_actor(actor.cloned());
        self.history.append(&entry)?;

        tracing::info!(
            account = %owner,
            before = change.before,
            after = change.after,
            "Credits reset"
        );
        Ok(entry)
    }

    pub fn history(&self, owner: &AccountRef, limit: usize) -> Result<Vec<CreditHistoryEntry>> {
        self.history.list(owner, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, AccountStore};
    use crate::history::Direction;
    use crate::memory::MemoryStore;

    fn ledger_with(balance: u64) -> (Arc<MemoryStore>, Ledger, AccountRef) {
        let store = Arc::new(MemoryStore::new());
        let owner = AccountRef::user("u1");
        store
            .save(&Account::new(owner.clone()).with_credits(balance))
            .unwrap();
        let ledger = Ledger::new(store.clone(), store.clone());
        (store, ledger, owner)
    }

    #[test]
    fn test_consume_records_history() {
        let (_, ledger, owner) = ledger_with(50);
        let actor = UserId::from_string("u1");

        let receipt = ledger
            .consume(&owner, &actor, 15, "image", serde_json::json!({"feature": "image"}))
            .unwrap();

        assert_eq!(receipt.change, BalanceChange { before: 50, after: 35 });
        assert_eq!(ledger.balance(&owner).unwrap(), 35);

        let history = ledger.history(&owner, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].balance_before, 50);
        assert_eq!(history[0].balance_after, 35);
        assert_eq!(history[0].signed_delta(), -15);
        assert_eq!(history[0].action, ActionType::Consumption);
    }

    #[test]
    fn test_consume_insufficient_leaves_balance() {
        let (_, ledger, owner) = ledger_with(10);
        let actor = UserId::from_string("u1");

        let err = ledger
            .consume(&owner, &actor, 15, "video", serde_json::Value::Null)
            .unwrap_err();
        assert!(matches!(
            err,
            CreatorError::InsufficientCredits { required: 15, available: 10 }
        ));
        assert_eq!(ledger.balance(&owner).unwrap(), 10);
        assert!(ledger.history(&owner, 10).unwrap().is_empty());
    }

    #[test]
    fn test_ensure_sufficient_reports_numbers() {
        let (_, ledger, owner) = ledger_with(10);
        assert_eq!(ledger.ensure_sufficient(&owner, 10).unwrap(), 10);
        assert!(matches!(
            ledger.ensure_sufficient(&owner, 11),
            Err(CreatorError::InsufficientCredits { required: 11, available: 10 })
        ));
    }

    #[test]
    fn test_grant_purchase_is_idempotent() {
        let (_, ledger, owner) = ledger_with(5);
        let grant = CreditGrant::credits(20);

        let first = ledger
            .grant_purchase(&owner, None, "cs_1", &grant, "20 credits", serde_json::Value::Null)
            .unwrap();
        let second = ledger
            .grant_purchase(&owner, None, "cs_1", &grant, "20 credits", serde_json::Value::Null)
            .unwrap();

        assert!(first.newly_applied);
        assert!(!second.newly_applied);
        assert_eq!(first.change, BalanceChange { before: 5, after: 25 });
        assert_eq!(second.change, first.change);
        assert_eq!(second.entry.id, first.entry.id);
        assert_eq!(ledger.balance(&owner).unwrap(), 25);

        let history = ledger.history(&owner, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].direction, Direction::Credit);
        assert_eq!(history[0].amount, 20);
    }

    #[test]
    fn test_grant_with_plan_updates_account() {
        let (store, ledger, owner) = ledger_with(0);
        let period_end = Utc::now() + chrono::Duration::days(30);
        let grant = CreditGrant::credits(500).with_plan("pro", period_end);

        ledger
            .grant_purchase(&owner, None, "cs_plan", &grant, "Pro", serde_json::Value::Null)
            .unwrap();

        let account = store.get(&owner).unwrap().unwrap();
        assert_eq!(account.credits, 500);
        assert_eq!(account.plan_id.as_deref(), Some("pro"));
        assert_eq!(account.current_period_end, Some(period_end));
        assert!(account.has_active_subscription(Utc::now()));
    }

    #[test]
    fn test_refund_and_reset() {
        let (_, ledger, owner) = ledger_with(40);

        let refund = ledger.refund(&owner, None, 15, "failed render").unwrap();
        assert_eq!(refund.balance_after, 55);
        assert_eq!(refund.action, ActionType::Refund);

        let reset = ledger.reset(&owner, None, 100, "monthly renewal").unwrap();
        assert_eq!(reset.balance_before, 55);
        assert_eq!(reset.balance_after, 100);
        assert_eq!(reset.direction, Direction::Credit);

        assert!(ledger.refund(&owner, None, 0, "nothing").is_err());
        assert_eq!(ledger.history(&owner, 10).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_account() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Ledger::new(store.clone(), store);
        assert!(matches!(
            ledger.balance(&AccountRef::user("ghost")),
            Err(CreatorError::AccountNotFound(_))
        ));
    }
}
