//! Purchase reconciliation
//!
//! Shared by the payment verifier and the webhook receiver. Both may run for
//! the same checkout session, in any order and concurrently, so every step is
//! keyed by the session id:
//!
//! 1. claim a pending `CreditPurchase` (unique on session id)
//! 2. credit the account once per session id
//! 3. record one history entry per session id
//! 4. flip the purchase to completed; only the caller that flips it goes on
//! 5. create the in-app notification (best-effort)
//!
//! A crash between any two steps is repaired by running the sequence again.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;

use creator_core::{
    AccountRef, BalanceChange, ClaimOutcome, CreditGrant, CreditPurchase, Ledger, Notification,
    NotificationKind, NotificationStore, PlanCatalog, PurchaseKind, PurchaseSource, PurchaseStore,
    UserId,
};

use crate::error::Result;
use crate::intent::PurchaseIntent;

/// Length of a subscription period granted by a plan purchase
pub const SUBSCRIPTION_PERIOD_DAYS: i64 = 30;

/// A paid session resolved to an account and a purchase
#[derive(Clone, Debug)]
pub struct PaidSession {
    pub session_id: String,
    pub account: AccountRef,
    pub buyer: Option<UserId>,
    pub kind: PurchaseKind,
    pub amount_cents: Option<i64>,
    pub source: PurchaseSource,
}

impl PaidSession {
    pub fn from_intent(
        session_id: impl Into<String>,
        intent: &PurchaseIntent,
        amount_cents: Option<i64>,
        source: PurchaseSource,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            account: intent.account(),
            buyer: Some(intent.buyer.clone()),
            kind: intent.kind.clone(),
            amount_cents,
            source,
        }
    }
}

/// Result of reconciling a paid session
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// This call completed the purchase
    Credited {
        purchase: CreditPurchase,
        change: BalanceChange,
    },

    /// Another call (or an earlier one) completed it
    AlreadyProcessed { purchase: CreditPurchase },
}

impl ReconcileOutcome {
    pub const fn purchase(&self) -> &CreditPurchase {
        match self {
            Self::Credited { purchase, .. } | Self::AlreadyProcessed { purchase } => purchase,
        }
    }

    pub const fn is_already_processed(&self) -> bool {
        matches!(self, Self::AlreadyProcessed { .. })
    }
}

/// Applies paid sessions to the ledger exactly once
#[derive(Clone)]
pub struct Reconciler {
    ledger: Ledger,
    purchases: Arc<dyn PurchaseStore>,
    notifications: Arc<dyn NotificationStore>,
    catalog: Arc<PlanCatalog>,
}

impl Reconciler {
    pub fn new(
        ledger: Ledger,
        purchases: Arc<dyn PurchaseStore>,
        notifications: Arc<dyn NotificationStore>,
        catalog: Arc<PlanCatalog>,
    ) -> Self {
        Self {
            ledger,
            purchases,
            notifications,
            catalog,
        }
    }

    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub const fn catalog(&self) -> &Arc<PlanCatalog> {
        &self.catalog
    }

    /// Completed purchase for a session, if any
    pub fn completed(&self, session_id: &str) -> Result<Option<CreditPurchase>> {
        Ok(self
            .purchases
            .get(session_id)?
            .filter(CreditPurchase::is_completed))
    }

    pub fn purchase(&self, session_id: &str) -> Result<Option<CreditPurchase>> {
        Ok(self.purchases.get(session_id)?)
    }

    /// Credits and optional plan change a purchase grants
    fn grant_for(&self, kind: &PurchaseKind) -> Result<(CreditGrant, String)> {
        match kind {
            PurchaseKind::Plan { plan_id } => {
                let plan = self.catalog.require(plan_id)?;
                let mut grant = CreditGrant::credits(plan.credits);
                if plan.is_subscription() {
                    grant = grant.with_plan(
                        plan.id.clone(),
                        Utc::now() + Duration::days(SUBSCRIPTION_PERIOD_DAYS),
                    );
                }
                Ok((grant, format!("Purchased {} ({} credits)", plan.name, plan.credits)))
            }
            PurchaseKind::Custom { credits } => Ok((
                CreditGrant::credits(*credits),
                format!("Purchased {credits} credits"),
            )),
        }
    }

    pub fn reconcile(&self, paid: PaidSession) -> Result<ReconcileOutcome> {
        let (grant, description) = self.grant_for(&paid.kind)?;

        let claim = CreditPurchase::pending(
            paid.session_id.clone(),
            paid.account.clone(),
            paid.kind.clone(),
            grant.amount,
            paid.source,
        )
        .with_buyer(paid.buyer.clone())
        .with_amount_cents(paid.amount_cents);

        // The first claim fixes what the session buys; later paths reuse it.
        let record = match self.purchases.claim(&claim)? {
            ClaimOutcome::Completed(purchase) => {
                tracing::info!(
                    session_id = %paid.session_id,
                    source = ?paid.source,
                    "Purchase already processed"
                );
                return Ok(ReconcileOutcome::AlreadyProcessed { purchase });
            }
            ClaimOutcome::Claimed(purchase) => purchase,
            ClaimOutcome::InFlight(purchase) => {
                tracing::debug!(
                    session_id = %paid.session_id,
                    first_source = ?purchase.source,
                    "Resuming in-flight purchase"
                );
                purchase
            }
        };

        let (grant, description) = if record.kind == paid.kind {
            (grant, description)
        } else {
            self.grant_for(&record.kind)?
        };

        let metadata = json!({
            "session_id": record.session_id,
            "purchase_type": record.kind.as_str(),
            "purchase": record.kind,
            "amount_cents": record.amount_cents,
            "source": paid.source,
        });

        let receipt = self.ledger.grant_purchase(
            &record.account,
            record.buyer.as_ref(),
            &record.session_id,
            &grant,
            &description,
            metadata,
        )?;

        if !self.purchases.complete(&record.session_id)? {
            let purchase = self.purchases.get(&record.session_id)?.unwrap_or(record);
            return Ok(ReconcileOutcome::AlreadyProcessed { purchase });
        }

        let notification = Notification::new(
            record.account.clone(),
            NotificationKind::CreditsAdded,
            "Credits added",
            format!(
                "{} credits were added. Your balance is now {}.",
                grant.amount, receipt.change.after
            ),
        )
        .for_user(record.buyer.clone());
        if let Err(e) = self.notifications.create(&notification) {
            tracing::warn!(
                session_id = %record.session_id,
                error = %e,
                "Failed to create purchase notification"
            );
        }

        tracing::info!(
            session_id = %record.session_id,
            account = %record.account,
            source = ?paid.source,
            credits = grant.amount,
            balance = receipt.change.after,
            "Purchase completed"
        );

        let purchase = self
            .purchases
            .get(&record.session_id)?
            .unwrap_or(record);
        Ok(ReconcileOutcome::Credited {
            purchase,
            change: receipt.change,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use creator_core::history::HistoryStore;
    use creator_core::{Account, AccountStore, MemoryStore, SubscriptionStatus};

    pub(crate) fn reconciler(store: &Arc<MemoryStore>) -> Reconciler {
        Reconciler::new(
            Ledger::new(store.clone(), store.clone()),
            store.clone(),
            store.clone(),
            Arc::new(PlanCatalog::standard()),
        )
    }

    fn custom(session_id: &str, credits: u64, source: PurchaseSource) -> PaidSession {
        PaidSession {
            session_id: session_id.into(),
            account: AccountRef::user("u1"),
            buyer: Some(UserId::from_string("u1")),
            kind: PurchaseKind::Custom { credits },
            amount_cents: Some(200),
            source,
        }
    }

    fn store_with(credits: u64) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store
            .save(&Account::new(AccountRef::user("u1")).with_credits(credits))
            .unwrap();
        store
    }

    #[test]
    fn test_custom_purchase_credits_once() {
        let store = store_with(7);
        let reconciler = reconciler(&store);

        let first = reconciler
            .reconcile(custom("cs_1", 20, PurchaseSource::Verifier))
            .unwrap();
        match &first {
            ReconcileOutcome::Credited { change, purchase } => {
                assert_eq!((change.before, change.after), (7, 27));
                assert!(purchase.is_completed());
            }
            ReconcileOutcome::AlreadyProcessed { .. } => panic!("first call must credit"),
        }

        let second = reconciler
            .reconcile(custom("cs_1", 20, PurchaseSource::Webhook))
            .unwrap();
        assert!(second.is_already_processed());
        assert_eq!(second.purchase().source, PurchaseSource::Verifier);

        let account = AccountRef::user("u1");
        assert_eq!(reconciler.ledger().balance(&account).unwrap(), 27);
        let history = HistoryStore::list(store.as_ref(), &account, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].amount, 20);
        assert_eq!(history[0].idempotency_key.as_deref(), Some("cs_1"));
        assert_eq!(NotificationStore::list(store.as_ref(), &account, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_subscription_plan_updates_account() {
        let store = store_with(0);
        let reconciler = reconciler(&store);
        reconciler
            .reconcile(PaidSession {
                kind: PurchaseKind::Plan {
                    plan_id: "pro".into(),
                },
                ..custom("cs_plan", 0, PurchaseSource::Webhook)
            })
            .unwrap();

        let account = AccountStore::get(store.as_ref(), &AccountRef::user("u1"))
            .unwrap()
            .unwrap();
        assert_eq!(account.credits, 500);
        assert_eq!(account.plan_id.as_deref(), Some("pro"));
        assert_eq!(account.subscription_status, SubscriptionStatus::Active);
        assert!(account.has_active_subscription(Utc::now()));
    }

    #[test]
    fn test_package_adds_credits_only() {
        let store = store_with(10);
        let reconciler = reconciler(&store);
        reconciler
            .reconcile(PaidSession {
                kind: PurchaseKind::Plan {
                    plan_id: "pack-250".into(),
                },
                ..custom("cs_pack", 0, PurchaseSource::Verifier)
            })
            .unwrap();

        let account = AccountStore::get(store.as_ref(), &AccountRef::user("u1"))
            .unwrap()
            .unwrap();
        assert_eq!(account.credits, 260);
        assert_eq!(account.plan_id, None);
    }

    #[test]
    fn test_unknown_plan_claims_nothing() {
        let store = store_with(10);
        let reconciler = reconciler(&store);
        let result = reconciler.reconcile(PaidSession {
            kind: PurchaseKind::Plan {
                plan_id: "gold".into(),
            },
            ..custom("cs_gold", 0, PurchaseSource::Verifier)
        });
        assert!(result.is_err());
        assert!(reconciler.purchase("cs_gold").unwrap().is_none());
    }

    #[test]
    fn test_resumes_after_interrupted_run() {
        let store = store_with(0);
        let reconciler = reconciler(&store);

        // First run stopped after the claim and the credit
        let pending = CreditPurchase::pending(
            "cs_crash",
            AccountRef::user("u1"),
            PurchaseKind::Custom { credits: 30 },
            30,
            PurchaseSource::Webhook,
        );
        store.claim(&pending).unwrap();
        reconciler
            .ledger()
            .grant_purchase(
                &AccountRef::user("u1"),
                None,
                "cs_crash",
                &CreditGrant::credits(30),
                "Purchased 30 credits",
                serde_json::Value::Null,
            )
            .unwrap();

        let outcome = reconciler
            .reconcile(custom("cs_crash", 30, PurchaseSource::Verifier))
            .unwrap();
        assert!(!outcome.is_already_processed());
        assert!(outcome.purchase().is_completed());
        assert_eq!(reconciler.ledger().balance(&AccountRef::user("u1")).unwrap(), 30);
        assert_eq!(
            HistoryStore::list(store.as_ref(), &AccountRef::user("u1"), 10)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_concurrent_paths_credit_once() {
        let store = store_with(0);
        let reconciler = reconciler(&store);

        std::thread::scope(|scope| {
            for i in 0..8 {
                let reconciler = reconciler.clone();
                scope.spawn(move || {
                    let source = if i % 2 == 0 {
                        PurchaseSource::Verifier
                    } else {
                        PurchaseSource::Webhook
                    };
                    reconciler.reconcile(custom("cs_race", 20, source)).unwrap();
                });
            }
        });

        let account = AccountRef::user("u1");
        assert_eq!(reconciler.ledger().balance(&account).unwrap(), 20);
        assert_eq!(HistoryStore::list(store.as_ref(), &account, 10).unwrap().len(), 1);
        assert_eq!(NotificationStore::list(store.as_ref(), &account, 10).unwrap().len(), 1);
    }
}
