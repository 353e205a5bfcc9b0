//! Consumption Guard
//!
//! Wraps a paid action: check the balance, run the action, and charge only
//! if it succeeded. Nothing is reserved up front, so a failed action leaves
//! the balance exactly as it was.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use creator_core::account::effective_account;
use creator_core::{AccountRef, AccountStore, CreatorError, CreditHistoryEntry, Ledger, Result, UserId};

/// A successful, charged action
#[derive(Clone, Debug, Serialize)]
pub struct Charged<T> {
    pub value: T,
    pub account: AccountRef,
    pub cost: u64,
    pub balance: u64,

    /// None when the history write failed (the charge still happened)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<CreditHistoryEntry>,
}

/// Balance check plus deferred charge
#[derive(Clone)]
pub struct ConsumptionGuard {
    ledger: Ledger,
    accounts: Arc<dyn AccountStore>,
}

impl ConsumptionGuard {
    pub fn new(ledger: Ledger, accounts: Arc<dyn AccountStore>) -> Self {
        Self { ledger, accounts }
    }

    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Account the user spends from: the team's when they belong to one
    pub fn resolve(&self, user: &UserId) -> Result<AccountRef> {
        effective_account(self.accounts.as_ref(), user)
    }

    /// Fail with `InsufficientCredits` unless `cost` is covered
    pub fn check(&self, account: &AccountRef, cost: u64) -> Result<u64> {
        self.ledger.ensure_sufficient(account, cost)
    }

    /// Run `work` on behalf of `user` and charge `cost` once it succeeds
    pub async fn run<T, F, Fut>(
        &self,
        user: &UserId,
        cost: u64,
        description: &str,
        metadata: serde_json::Value,
        work: F,
    ) -> Result<Charged<T>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let account = self.resolve(user)?;
        let available = self.check(&account, cost)?;

        let value = match work().await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    account = %account,
                    user = %user,
                    cost,
                    error = %e,
                    "Action failed, no credits charged"
                );
                return Err(e);
            }
        };

        let receipt = self
            .ledger
            .consume(&account, user, cost, description, metadata)
            .inspect_err(|e| {
                if matches!(e, CreatorError::InsufficientCredits { .. }) {
                    tracing::warn!(
                        account = %account,
                        cost,
                        checked = available,
                        "Balance spent concurrently while the action ran"
                    );
                }
            })?;

        Ok(Charged {
            value,
            account,
            cost,
            balance: receipt.change.after,
            entry: receipt.entry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use creator_core::{Account, MemoryStore, TeamId, TeamMembership, TeamRole};
    use creator_core::history::HistoryStore;
    use serde_json::json;

    fn guard_with(balance: u64) -> (Arc<MemoryStore>, ConsumptionGuard) {
        let store = Arc::new(MemoryStore::default());
        store
            .save(&Account::new(AccountRef::user("u1")).with_credits(balance))
            .unwrap();
        let guard = ConsumptionGuard::new(Ledger::new(store.clone(), store.clone()), store.clone());
        (store, guard)
    }

    #[tokio::test]
    async fn test_success_charges_after_work() {
        let (store, guard) = guard_with(50);
        let user = UserId::from_string("u1");

        let charged = guard
            .run(&user, 15, "Video", json!({}), || async { Ok("done") })
            .await
            .unwrap();
        assert_eq!(charged.value, "done");
        assert_eq!(charged.balance, 35);

        let history = HistoryStore::list(store.as_ref(), &AccountRef::user("u1"), 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!((history[0].balance_before, history[0].balance_after), (50, 35));
        assert_eq!(history[0].signed_delta(), -15);
    }

    #[tokio::test]
    async fn test_insufficient_balance_skips_work() {
        let (store, guard) = guard_with(10);
        let user = UserId::from_string("u1");
        let mut ran = false;

        let result = guard
            .run(&user, 15, "Video", json!({}), || {
                ran = true;
                async { Ok(()) }
            })
            .await;

        match result {
            Err(CreatorError::InsufficientCredits { required, available }) => {
                assert_eq!((required, available), (15, 10));
            }
            other => panic!("expected insufficient credits, got {other:?}"),
        }
        assert!(!ran);
        assert_eq!(guard.ledger().balance(&AccountRef::user("u1")).unwrap(), 10);
        assert!(HistoryStore::list(store.as_ref(), &AccountRef::user("u1"), 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_work_is_free() {
        let (store, guard) = guard_with(20);
        let user = UserId::from_string("u1");

        let result: Result<Charged<()>> = guard
            .run(&user, 5, "Image", json!({}), || async {
                Err(CreatorError::RateLimited("slow down".into()))
            })
            .await;
        assert!(matches!(result, Err(CreatorError::RateLimited(_))));
        assert_eq!(guard.ledger().balance(&AccountRef::user("u1")).unwrap(), 20);
        assert!(HistoryStore::list(store.as_ref(), &AccountRef::user("u1"), 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_team_member_spends_team_credits() {
        let (store, guard) = guard_with(0);
        store.save(&Account::new(AccountRef::team("t1")).with_credits(30)).unwrap();
        store
            .save_membership(&TeamMembership {
                team_id: TeamId::from_string("t1"),
                user_id: UserId::from_string("u1"),
                role: TeamRole::Member,
            })
            .unwrap();

        let charged = guard
            .run(&UserId::from_string("u1"), 10, "Plan", json!({}), || async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(charged.account, AccountRef::team("t1"));
        assert_eq!(charged.balance, 20);

        let entry = charged.entry.unwrap();
        assert_eq!(entry.actor, Some(UserId::from_string("u1")));
    }

    #[tokio::test]
    async fn test_zero_cost_needs_no_balance() {
        let (_store, guard) = guard_with(0);
        let charged = guard
            .run(&UserId::from_string("u1"), 0, "Free", json!({}), || async { Ok(1) })
            .await
            .unwrap();
        assert_eq!(charged.balance, 0);
        assert!(charged.entry.is_none());
    }
}
