//! In-memory stores (for development and tests)
//!
//! Each operation takes the table lock once, so reads and writes of a single
//! row behave like the conditional row updates of the hosted database.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use crate::account::{Account, AccountRef, AccountStore, SubscriptionStatus, TeamMembership, UserId};
use crate::error::{CreatorError, Result};
use crate::history::{CreditHistoryEntry, HistoryStore};
use crate::ledger::{BalanceChange, CreditGrant, GrantOutcome, LedgerStore};
use crate::notification::{EmailMessage, EmailSender, Notification, NotificationStore};
use crate::purchase::{ClaimOutcome, CreditPurchase, PurchaseStatus, PurchaseStore};

fn poisoned<T>(_: T) -> CreatorError {
    CreatorError::Storage("store lock poisoned".into())
}

fn not_found(owner: &AccountRef) -> CreatorError {
    CreatorError::AccountNotFound(owner.to_string())
}

/// All Creator tables in one process
#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<AccountRef, Account>>,
    /// Applied grant receipts, keyed by row and idempotence key
    grants: RwLock<HashMap<(AccountRef, String), BalanceChange>>,
    memberships: RwLock<HashMap<UserId, TeamMembership>>,
    history: RwLock<Vec<CreditHistoryEntry>>,
    purchases: RwLock<HashMap<String, CreditPurchase>>,
    notifications: RwLock<Vec<Notification>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_account<T>(
        &self,
        owner: &AccountRef,
        f: impl FnOnce(&mut Account) -> Result<T>,
    ) -> Result<T> {
        let mut accounts = self.accounts.write().map_err(poisoned)?;
        let account = accounts.get_mut(owner).ok_or_else(|| not_found(owner))?;
        let result = f(account)?;
        account.updated_at = Utc::now();
        Ok(result)
    }
}

impl AccountStore for MemoryStore {
    fn save(&self, account: &Account) -> Result<()> {
        let mut accounts = self.accounts.write().map_err(poisoned)?;
        accounts.insert(account.owner.clone(), account.clone());
        Ok(())
    }

    fn insert_if_absent(&self, account: &Account) -> Result<bool> {
        let mut accounts = self.accounts.write().map_err(poisoned)?;
        if accounts.contains_key(&account.owner) {
            return Ok(false);
        }
        accounts.insert(account.owner.clone(), account.clone());
        Ok(true)
    }

    fn get(&self, owner: &AccountRef) -> Result<Option<Account>> {
        let accounts = self.accounts.read().map_err(poisoned)?;
        Ok(accounts.get(owner).cloned())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.read().map_err(poisoned)?;
        Ok(accounts
            .values()
            .filter(|a| matches!(a.owner, AccountRef::User(_)))
            .find(|a| {
                a.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .cloned())
    }

    fn save_membership(&self, membership: &TeamMembership) -> Result<()> {
        let mut memberships = self.memberships.write().map_err(poisoned)?;
        memberships.insert(membership.user_id.clone(), membership.clone());
        Ok(())
    }

    fn membership(&self, user: &UserId) -> Result<Option<TeamMembership>> {
        let memberships = self.memberships.read().map_err(poisoned)?;
        Ok(memberships.get(user).cloned())
    }
}

impl LedgerStore for MemoryStore {
    fn balance(&self, owner: &AccountRef) -> Result<u64> {
        let accounts = self.accounts.read().map_err(poisoned)?;
        accounts
            .get(owner)
            .map(|a| a.credits)
            .ok_or_else(|| not_found(owner))
    }

    fn debit(&self, owner: &AccountRef, amount: u64) -> Result<BalanceChange> {
        self.with_account(owner, |account| {
            let before = account.credits;
            let after = before
                .checked_sub(amount)
                .ok_or(CreatorError::InsufficientCredits {
                    required: amount,
                    available: before,
                })?;
            account.credits = after;
            Ok(BalanceChange { before, after })
        })
    }

    fn credit(&self, owner: &AccountRef, amount: u64) -> Result<BalanceChange> {
        self.with_account(owner, |account| {
            let before = account.credits;
            let after = before
                .checked_add(amount)
                .ok_or_else(|| CreatorError::Validation("credit balance overflow".into()))?;
            account.credits = after;
            Ok(BalanceChange { before, after })
        })
    }

    fn credit_once(&self, owner: &AccountRef, key: &str, grant: &CreditGrant) -> Result<GrantOutcome> {
        // Lock order: accounts, then grants
        let mut accounts = self.accounts.write().map_err(poisoned)?;
        let mut grants = self.grants.write().map_err(poisoned)?;

        let receipt = (owner.clone(), key.to_string());
        if let Some(change) = grants.get(&receipt) {
            return Ok(GrantOutcome::AlreadyApplied(*change));
        }

        let account = accounts.get_mut(owner).ok_or_else(|| not_found(owner))?;

        let before = account.credits;
        let after = before
            .checked_add(grant.amount)
            .ok_or_else(|| CreatorError::Validation("credit balance overflow".into()))?;
        account.credits = after;

        if let Some(plan) = &grant.plan {
            account.plan_id = Some(plan.plan_id.clone());
            account.subscription_status = SubscriptionStatus::Active;
            account.current_period_end = Some(plan.period_end);
        }

        let change = BalanceChange { before, after };
        account.updated_at = Utc::now();
        grants.insert(receipt, change);
        Ok(GrantOutcome::Applied(change))
    }

    fn set_balance(&self, owner: &AccountRef, credits: u64) -> Result<BalanceChange> {
        self.with_account(owner, |account| {
            let before = account.credits;
            account.credits = credits;
            Ok(BalanceChange {
                before,
                after: credits,
            })
        })
    }
}

impl HistoryStore for MemoryStore {
    fn append(&self, entry: &CreditHistoryEntry) -> Result<bool> {
        let mut history = self.history.write().map_err(poisoned)?;
        if let Some(key) = &entry.idempotency_key {
            if history
                .iter()
                .any(|e| e.idempotency_key.as_deref() == Some(key.as_str()))
            {
                return Ok(false);
            }
        }
        history.push(entry.clone());
        Ok(true)
    }

    fn list(&self, account: &AccountRef, limit: usize) -> Result<Vec<CreditHistoryEntry>> {
        let history = self.history.read().map_err(poisoned)?;
        Ok(history
            .iter()
            .rev()
            .filter(|e| &e.account == account)
            .take(limit)
            .cloned()
            .collect())
    }

    fn find_by_key(&self, key: &str) -> Result<Option<CreditHistoryEntry>> {
        let history = self.history.read().map_err(poisoned)?;
        Ok(history
            .iter()
            .find(|e| e.idempotency_key.as_deref() == Some(key))
            .cloned())
    }
}

impl PurchaseStore for MemoryStore {
    fn get(&self, session_id: &str) -> Result<Option<CreditPurchase>> {
        let purchases = self.purchases.read().map_err(poisoned)?;
        Ok(purchases.get(session_id).cloned())
    }

    fn claim(&self, purchase: &CreditPurchase) -> Result<ClaimOutcome> {
        let mut purchases = self.purchases.write().map_err(poisoned)?;
        if let Some(existing) = purchases.get(&purchase.session_id) {
            return Ok(match existing.status {
                PurchaseStatus::Completed => ClaimOutcome::Completed(existing.clone()),
                PurchaseStatus::Pending => ClaimOutcome::InFlight(existing.clone()),
            });
        }
        purchases.insert(purchase.session_id.clone(), purchase.clone());
        Ok(ClaimOutcome::Claimed(purchase.clone()))
    }

    fn complete(&self, session_id: &str) -> Result<bool> {
        let mut purchases = self.purchases.write().map_err(poisoned)?;
        let purchase = purchases
            .get_mut(session_id)
            .ok_or_else(|| CreatorError::Storage(format!("no purchase for session {session_id}")))?;
        if purchase.status == PurchaseStatus::Completed {
            return Ok(false);
        }
        purchase.status = PurchaseStatus::Completed;
        purchase.completed_at = Some(Utc::now());
        Ok(true)
    }

    fn list(&self, account: &AccountRef) -> Result<Vec<CreditPurchase>> {
        let purchases = self.purchases.read().map_err(poisoned)?;
        let mut result: Vec<_> = purchases
            .values()
            .filter(|p| &p.account == account)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }
}

impl NotificationStore for MemoryStore {
    fn create(&self, notification: &Notification) -> Result<()> {
        let mut notifications = self.notifications.write().map_err(poisoned)?;
        notifications.push(notification.clone());
        Ok(())
    }

    fn list(&self, account: &AccountRef, limit: usize) -> Result<Vec<Notification>> {
        let notifications = self.notifications.read().map_err(poisoned)?;
        Ok(notifications
            .iter()
            .rev()
            .filter(|n| &n.account == account)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Email sender that keeps messages in memory
#[derive(Default)]
pub struct MemoryOutbox {
    sent: Mutex<Vec<EmailMessage>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far
    pub fn messages(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailSender for MemoryOutbox {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let mut sent = self.sent.lock().map_err(poisoned)?;
        sent.push(message.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{TeamId, TeamRole, provision_team, provision_user};
    use crate::history::ActionType;
    use crate::purchase::{PurchaseKind, PurchaseSource};
    use std::sync::Arc;

    fn store_with(owner: &AccountRef, credits: u64) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .save(&Account::new(owner.clone()).with_credits(credits))
            .unwrap();
        store
    }

    #[test]
    fn test_debit_never_goes_negative() {
        let owner = AccountRef::user("u1");
        let store = store_with(&owner, 3);

        assert!(store.debit(&owner, 4).is_err());
        assert_eq!(store.balance(&owner).unwrap(), 3);
        assert_eq!(
            store.debit(&owner, 3).unwrap(),
            BalanceChange { before: 3, after: 0 }
        );
    }

    #[test]
    fn test_concurrent_debits_do_not_overspend() {
        let owner = AccountRef::user("u1");
        let store = Arc::new(store_with(&owner, 100));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                let owner = owner.clone();
                std::thread::spawn(move || store.debit(&owner, 10).is_ok())
            })
            .collect();

        let succeeded = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(succeeded, 10);
        assert_eq!(store.balance(&owner).unwrap(), 0);
    }

    #[test]
    fn test_concurrent_credit_once_applies_once() {
        let owner = AccountRef::team("t1");
        let store = Arc::new(store_with(&owner, 0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let owner = owner.clone();
                std::thread::spawn(move || {
                    store
                        .credit_once(&owner, "cs_race", &CreditGrant::credits(20))
                        .unwrap()
                        .was_applied()
                })
            })
            .collect();

        let applied = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|applied| *applied)
            .count();

        assert_eq!(applied, 1);
        assert_eq!(store.balance(&owner).unwrap(), 20);
    }

    #[test]
    fn test_resaving_row_keeps_grant_receipts() {
        let owner = AccountRef::user("u1");
        let store = store_with(&owner, 0);
        let grant = CreditGrant::credits(20);

        assert!(store.credit_once(&owner, "cs_1", &grant).unwrap().was_applied());

        let row = AccountStore::get(&store, &owner).unwrap().unwrap();
        store.save(&row.with_email("ana@example.com")).unwrap();

        let again = store.credit_once(&owner, "cs_1", &grant).unwrap();
        assert!(!again.was_applied());
        assert_eq!(store.balance(&owner).unwrap(), 20);
    }

    #[test]
    fn test_insert_if_absent_keeps_existing_row() {
        let owner = AccountRef::user("u1");
        let store = store_with(&owner, 40);

        assert!(!store.insert_if_absent(&Account::new(owner.clone())).unwrap());
        assert_eq!(store.balance(&owner).unwrap(), 40);

        let fresh = AccountRef::user("u2");
        assert!(store.insert_if_absent(&Account::new(fresh.clone())).unwrap());
        assert_eq!(store.balance(&fresh).unwrap(), 0);
    }

    #[test]
    fn test_provision_user_and_team() {
        let store = MemoryStore::new();
        let ana = UserId::from_string("ana");
        let team = TeamId::from_string("t1");

        let own = provision_user(&store, &ana, Some("ana@example.com")).unwrap();
        assert_eq!(own, AccountRef::User(ana.clone()));
        assert_eq!(store.balance(&own).unwrap(), 0);

        store.credit(&own, 5).unwrap();
        provision_user(&store, &ana, None).unwrap();
        assert_eq!(store.balance(&own).unwrap(), 5);

        let row = provision_team(
            &store,
            &team,
            Some("billing@example.com"),
            &[(ana.clone(), TeamRole::Admin), (UserId::from_string("bo"), TeamRole::Member)],
        )
        .unwrap();
        assert_eq!(row.credits, 0);
        assert_eq!(provision_user(&store, &ana, None).unwrap(), AccountRef::Team(team.clone()));
        assert!(AccountStore::get(&store, &AccountRef::user("bo")).unwrap().is_some());
        assert!(store.membership(&UserId::from_string("bo")).unwrap().is_some_and(|m| !m.is_admin()));
    }

    #[test]
    fn test_history_key_is_unique() {
        let store = MemoryStore::new();
        let owner = AccountRef::user("u1");
        let change = BalanceChange { before: 0, after: 20 };

        let entry = CreditHistoryEntry::new(owner.clone(), ActionType::Purchase, change, "a")
            .with_idempotency_key("cs_1");
        let duplicate = CreditHistoryEntry::new(owner.clone(), ActionType::Purchase, change, "b")
            .with_idempotency_key("cs_1");

        assert!(store.append(&entry).unwrap());
        assert!(!store.append(&duplicate).unwrap());
        assert_eq!(HistoryStore::list(&store, &owner, 10).unwrap().len(), 1);
        assert_eq!(store.find_by_key("cs_1").unwrap().unwrap().id, entry.id);
    }

    #[test]
    fn test_purchase_claim_and_complete() {
        let store = MemoryStore::new();
        let purchase = CreditPurchase::pending(
            "cs_1",
            AccountRef::user("u1"),
            PurchaseKind::Custom { credits: 20 },
            20,
            PurchaseSource::Verifier,
        );

        assert!(matches!(store.claim(&purchase).unwrap(), ClaimOutcome::Claimed(_)));
        assert!(matches!(store.claim(&purchase).unwrap(), ClaimOutcome::InFlight(_)));
        assert!(store.complete("cs_1").unwrap());
        assert!(!store.complete("cs_1").unwrap());
        assert!(matches!(store.claim(&purchase).unwrap(), ClaimOutcome::Completed(_)));
        assert!(PurchaseStore::get(&store, "cs_1").unwrap().unwrap().is_completed());
    }

    #[test]
    fn test_find_by_email_and_membership() {
        let store = MemoryStore::new();
        store
            .save(&Account::new(AccountRef::user("u1")).with_email("Ana@Example.com"))
            .unwrap();
        store
            .save_membership(&TeamMembership {
                team_id: TeamId::from_string("t1"),
                user_id: UserId::from_string("u1"),
                role: TeamRole::Admin,
            })
            .unwrap();

        let found = store.find_by_email("ana@example.com").unwrap().unwrap();
        assert_eq!(found.owner, AccountRef::user("u1"));
        assert!(store
            .membership(&UserId::from_string("u1"))
            .unwrap()
            .unwrap()
            .is_admin());
        assert!(store.membership(&UserId::from_string("u2")).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_outbox() {
        let outbox = MemoryOutbox::new();
        outbox
            .send(&EmailMessage {
                to: "a@example.com".into(),
                subject: "Hi".into(),
                html: "<p>Hi</p>".into(),
            })
            .await
            .unwrap();
        assert_eq!(outbox.messages().len(), 1);
    }
}
