//! Payment Verifier
//!
//! Called by the client after the checkout redirect with the session id.
//! Repeated calls (page refreshes) are answered from the purchase record.

use std::sync::Arc;

use serde::Serialize;

use creator_core::{CreditPurchase, PurchaseSource, UserId};

use crate::error::{PaymentError, Result};
use crate::intent::PurchaseIntent;
use crate::provider::{PaymentProvider, PaymentStatus};
use crate::reconcile::{PaidSession, ReconcileOutcome, Reconciler};

/// Verifier response
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerifyOutcome {
    Completed {
        purchase: CreditPurchase,
        credits_added: u64,
        balance: u64,

        /// Set when an earlier call or the webhook completed it
        already_processed: bool,
    },

    /// Provider has not confirmed payment yet; nothing was written
    Pending {
        session_id: String,
        payment_status: PaymentStatus,
    },
}

/// Reconciles checkout sessions on the synchronous path
#[derive(Clone)]
pub struct PaymentVerifier {
    provider: Arc<dyn PaymentProvider>,
    reconciler: Reconciler,
}

impl PaymentVerifier {
    pub fn new(provider: Arc<dyn PaymentProvider>, reconciler: Reconciler) -> Self {
        Self {
            provider,
            reconciler,
        }
    }

    pub async fn verify(&self, caller: &UserId, session_id: &str) -> Result<VerifyOutcome> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(PaymentError::Validation("session_id is required".into()));
        }

        if let Some(purchase) = self.reconciler.completed(session_id)? {
            Self::check_buyer(caller, purchase.buyer.as_ref())?;
            tracing::debug!(session_id, "Verify short-circuit: already processed");
            return self.completed(purchase, true);
        }

        let session = self.provider.retrieve_session(session_id).await?;
        if !session.payment_status.is_paid() {
            tracing::info!(
                session_id,
                payment_status = ?session.payment_status,
                "Checkout session not paid yet"
            );
            return Ok(VerifyOutcome::Pending {
                session_id: session.id,
                payment_status: session.payment_status,
            });
        }

        let intent = PurchaseIntent::from_metadata(&session.metadata)?;
        Self::check_buyer(caller, Some(&intent.buyer))?;

        let outcome = self.reconciler.reconcile(PaidSession::from_intent(
            session.id.clone(),
            &intent,
            session.amount_total,
            PurchaseSource::Verifier,
        ))?;

        match outcome {
            ReconcileOutcome::Credited { purchase, change } => Ok(VerifyOutcome::Completed {
                credits_added: purchase.credits,
                balance: change.after,
                purchase,
                already_processed: false,
            }),
            ReconcileOutcome::AlreadyProcessed { purchase } => self.completed(purchase, true),
        }
    }

    fn completed(&self, purchase: CreditPurchase, already_processed: bool) -> Result<VerifyOutcome> {
        let balance = self.reconciler.ledger().balance(&purchase.account)?;
        Ok(VerifyOutcome::Completed {
            credits_added: purchase.credits,
            balance,
            purchase,
            already_processed,
        })
    }

    fn check_buyer(caller: &UserId, buyer: Option<&UserId>) -> Result<()> {
        match buyer {
            Some(buyer) if buyer != caller => Err(PaymentError::Forbidden(
                "checkout session belongs to another user".into(),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::{CheckoutBuilder, CheckoutConfig, CheckoutItem, CheckoutRequest};
    use crate::mock::MockPaymentProvider;
    use crate::reconcile::tests::reconciler;
    use creator_core::history::HistoryStore;
    use creator_core::{Account, AccountRef, AccountStore, MemoryStore, PlanCatalog};

    struct Fixture {
        store: Arc<MemoryStore>,
        mock: Arc<MockPaymentProvider>,
        checkout: CheckoutBuilder,
        verifier: PaymentVerifier,
    }

    fn fixture(balance: u64) -> Fixture {
        let store = Arc::new(MemoryStore::default());
        store
            .save(&Account::new(AccountRef::user("u1")).with_credits(balance))
            .unwrap();
        store.save(&Account::new(AccountRef::user("u2"))).unwrap();

        let mock = Arc::new(MockPaymentProvider::new("whsec_test"));
        let checkout = CheckoutBuilder::new(
            mock.clone(),
            store.clone(),
            Arc::new(PlanCatalog::standard()),
            CheckoutConfig::default(),
        );
        let verifier = PaymentVerifier::new(mock.clone(), reconciler(&store));
        Fixture {
            store,
            mock,
            checkout,
            verifier,
        }
    }

    async fn open_custom(f: &Fixture, credits: u64) -> String {
        f.checkout
            .create(
                &UserId::from_string("u1"),
                CheckoutRequest {
                    item: CheckoutItem::Custom { credits },
                    team_id: None,
                    return_url: None,
                },
            )
            .await
            .unwrap()
            .session_id
    }

    fn history_len(store: &MemoryStore) -> usize {
        HistoryStore::list(store, &AccountRef::user("u1"), 100)
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn test_paid_custom_purchase_credits_quantity() {
        let f = fixture(100);
        let session_id = open_custom(&f, 20).await;
        f.mock.mark_paid(&session_id).unwrap();

        let outcome = f.verifier.verify(&UserId::from_string("u1"), &session_id).await.unwrap();
        match outcome {
            VerifyOutcome::Completed {
                credits_added,
                balance,
                already_processed,
                purchase,
            } => {
                assert_eq!(credits_added, 20);
                assert_eq!(balance, 120);
                assert!(!already_processed);
                assert!(purchase.is_completed());
                assert_eq!(purchase.amount_cents, Some(200));
            }
            VerifyOutcome::Pending { .. } => panic!("session was paid"),
        }

        let history = HistoryStore::list(f.store.as_ref(), &AccountRef::user("u1"), 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!((history[0].balance_before, history[0].balance_after), (100, 120));
        assert_eq!(history[0].signed_delta(), 20);
    }

    #[tokio::test]
    async fn test_duplicate_verify_credits_once() {
        let f = fixture(0);
        let session_id = open_custom(&f, 40).await;
        f.mock.mark_paid(&session_id).unwrap();
        let caller = UserId::from_string("u1");

        for _ in 0..5 {
            f.verifier.verify(&caller, &session_id).await.unwrap();
        }
        let last = f.verifier.verify(&caller, &session_id).await.unwrap();
        assert!(matches!(
            last,
            VerifyOutcome::Completed { already_processed: true, balance: 40, .. }
        ));
        assert_eq!(history_len(&f.store), 1);
        // Completed purchases are answered without asking the provider again
        assert_eq!(f.mock.retrieve_calls(), 1);
    }

    #[tokio::test]
    async fn test_unpaid_session_is_pending_without_writes() {
        let f = fixture(10);
        let session_id = open_custom(&f, 20).await;

        let outcome = f.verifier.verify(&UserId::from_string("u1"), &session_id).await.unwrap();
        assert!(matches!(
            outcome,
            VerifyOutcome::Pending { payment_status: PaymentStatus::Unpaid, .. }
        ));
        assert_eq!(f.verifier.reconciler.ledger().balance(&AccountRef::user("u1")).unwrap(), 10);
        assert_eq!(history_len(&f.store), 0);
        assert!(f.verifier.reconciler.purchase(&session_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_other_user_cannot_verify() {
        let f = fixture(0);
        let session_id = open_custom(&f, 20).await;
        f.mock.mark_paid(&session_id).unwrap();

        let result = f.verifier.verify(&UserId::from_string("u2"), &session_id).await;
        assert!(matches!(result, Err(PaymentError::Forbidden(_))));
        assert_eq!(history_len(&f.store), 0);
    }

    #[tokio::test]
    async fn test_missing_metadata_is_hard_failure() {
        let f = fixture(0);
        let session_id = open_custom(&f, 20).await;
        let mut session = f.mock.mark_paid(&session_id).unwrap();
        session.metadata.clear();
        f.mock.insert_session(session).unwrap();

        let result = f.verifier.verify(&UserId::from_string("u1"), &session_id).await;
        assert!(matches!(result, Err(PaymentError::MissingMetadata(_))));
        assert_eq!(history_len(&f.store), 0);
    }

    #[tokio::test]
    async fn test_empty_session_id_rejected() {
        let f = fixture(0);
        let result = f.verifier.verify(&UserId::from_string("u1"), "  ").await;
        assert!(matches!(result, Err(PaymentError::Validation(_))));
        assert_eq!(f.mock.retrieve_calls(), 0);
    }
}
