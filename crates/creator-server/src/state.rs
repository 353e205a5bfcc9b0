//! Application State

use std::collections::HashSet;
use std::sync::Arc;

use creator_core::{
    AccountStore, CreatorError, EmailSender, HistoryStore, Ledger, LedgerStore, NotificationStore, PlanCatalog,
    PurchaseStore, UserId,
};
use creator_payments::{
    CheckoutBuilder, CheckoutConfig, PaymentProvider, PaymentVerifier, Reconciler, WebhookReceiver,
};
use creator_studio::Studio;

use crate::email::EmailTemplates;

/// Everything the store layer provides
pub trait Stores: AccountStore + LedgerStore + HistoryStore + PurchaseStore + NotificationStore {}

impl<T> Stores for T where T: AccountStore + LedgerStore + HistoryStore + PurchaseStore + NotificationStore {}

/// Checkout, verification and webhook handling over one provider
#[derive(Clone)]
pub struct Payments {
    pub provider: String,
    pub checkout: CheckoutBuilder,
    pub verifier: PaymentVerifier,
    pub webhook: WebhookReceiver,
}

impl Payments {
    pub fn new<S: Stores + 'static>(
        provider: Arc<dyn PaymentProvider>,
        store: &Arc<S>,
        catalog: &Arc<PlanCatalog>,
        config: CheckoutConfig,
    ) -> Self {
        let ledger = Ledger::new(store.clone(), store.clone());
        let reconciler = Reconciler::new(ledger, store.clone(), store.clone(), catalog.clone());
        Self {
            provider: provider.name().to_string(),
            checkout: CheckoutBuilder::new(provider.clone(), store.clone(), catalog.clone(), config),
            verifier: PaymentVerifier::new(provider.clone(), reconciler.clone()),
            webhook: WebhookReceiver::new(provider, store.clone(), reconciler),
        }
    }
}

/// Signed auth-email hook
#[derive(Clone)]
pub struct EmailHook {
    pub secret: String,
    pub sender: Arc<dyn EmailSender>,
    pub templates: Arc<EmailTemplates>,
}

impl EmailHook {
    pub fn new(secret: impl Into<String>, sender: Arc<dyn EmailSender>) -> Result<Self, CreatorError> {
        Ok(Self {
            secret: secret.into(),
            sender,
            templates: Arc::new(EmailTemplates::new()?),
        })
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<dyn AccountStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub ledger: Ledger,
    pub catalog: Arc<PlanCatalog>,
    pub studio: Studio,

    /// Payments (optional - None if not configured)
    pub payments: Option<Payments>,

    /// Email hook (optional - None if not configured)
    pub email: Option<EmailHook>,

    pub admins: Arc<HashSet<UserId>>,
    pub public_url: Arc<str>,
}

impl AppState {
    pub fn new<S: Stores + 'static>(
        store: &Arc<S>,
        catalog: Arc<PlanCatalog>,
        studio: Studio,
        admins: HashSet<UserId>,
        public_url: &str,
    ) -> Self {
        Self {
            accounts: store.clone(),
            notifications: store.clone(),
            ledger: Ledger::new(store.clone(), store.clone()),
            catalog,
            studio,
            payments: None,
            email: None,
            admins: Arc::new(admins),
            public_url: Arc::from(public_url),
        }
    }

    pub fn with_payments(mut self, payments: Payments) -> Self {
        self.payments = Some(payments);
        self
    }

    pub fn with_email(mut self, hook: EmailHook) -> Self {
        self.email = Some(hook);
        self
    }

    pub fn is_admin(&self, user: &UserId) -> bool {
        self.admins.contains(user)
    }
}
