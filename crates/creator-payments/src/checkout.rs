//! Checkout Session Builder
//!
//! Validates a purchase request, prices it and opens a hosted checkout
//! session whose metadata carries everything reconciliation needs. The
//! ledger is not touched here.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use creator_core::{
    AccountRef, AccountStore, CreatorError, PlanCatalog, PurchaseKind, TeamId, UserId,
};

use crate::error::{PaymentError, Result};
use crate::intent::PurchaseIntent;
use crate::provider::{CreateSessionParams, PaymentProvider, SessionLine, SessionMode};

/// Smallest custom credit purchase
pub const MIN_CUSTOM_CREDITS: u64 = 20;

/// Largest custom credit purchase
pub const MAX_CUSTOM_CREDITS: u64 = 100_000;

/// Checkout configuration
#[derive(Clone, Debug)]
pub struct CheckoutConfig {
    /// Public base URL of the app, used for redirects
    pub public_url: String,

    /// Price of one custom credit in dollars
    pub unit_price: Decimal,

    pub min_credits: u64,
    pub max_credits: u64,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            public_url: "http://localhost:3000".into(),
            unit_price: dec!(0.10),
            min_credits: MIN_CUSTOM_CREDITS,
            max_credits: MAX_CUSTOM_CREDITS,
        }
    }
}

impl CheckoutConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let unit_price = match lookup("CREATOR_UNIT_PRICE") {
            Some(raw) => Decimal::from_str(raw.trim()).map_err(|e| {
                PaymentError::Config(format!("CREATOR_UNIT_PRICE '{raw}' is not a decimal: {e}"))
            })?,
            None => defaults.unit_price,
        };
        if unit_price <= Decimal::ZERO {
            return Err(PaymentError::Config("CREATOR_UNIT_PRICE must be positive".into()));
        }

        Ok(Self {
            public_url: lookup("CREATOR_PUBLIC_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_url),
            unit_price,
            ..defaults
        })
    }

    /// Total price of a custom purchase, in cents
    pub fn custom_price_cents(&self, credits: u64) -> Result<i64> {
        self.unit_price
            .checked_mul(Decimal::from(credits))
            .and_then(|total| total.checked_mul(dec!(100)))
            .map(|cents| cents.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|cents| cents.to_i64())
            .filter(|cents| *cents > 0)
            .ok_or_else(|| PaymentError::Validation(format!("cannot price {credits} credits")))
    }

    fn success_url(&self) -> String {
        format!("{}/billing/success?session_id={{CHECKOUT_SESSION_ID}}", self.public_url)
    }

    fn default_cancel_url(&self) -> String {
        format!("{}/billing", self.public_url)
    }

    /// Whether `url` points into the app: the public URL itself or a path,
    /// query or fragment under it. `https://app.test.evil` does not qualify.
    fn is_app_url(&self, url: &str) -> bool {
        url.strip_prefix(self.public_url.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?', '#']))
    }
}

/// What the client asks to buy
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "purchase_type", rename_all = "snake_case")]
pub enum CheckoutItem {
    /// Catalog plan or package. `price_id`, when sent, must match the plan.
    Plan {
        plan_id: String,
        #[serde(default)]
        price_id: Option<String>,
    },

    Custom { credits: u64 },
}

/// Request to create a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutRequest {
    #[serde(flatten)]
    pub item: CheckoutItem,

    /// Buy for this team instead of the caller
    #[serde(default)]
    pub team_id: Option<TeamId>,

    /// Where cancel sends the buyer; must be under the public URL
    #[serde(default)]
    pub return_url: Option<String>,
}

/// Result of creating a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,

    /// URL to redirect the buyer to
    pub checkout_url: String,

    pub account: AccountRef,
    pub credits: u64,
    pub amount_cents: i64,
}

struct PricedLine {
    kind: PurchaseKind,
    mode: SessionMode,
    line: SessionLine,
    credits: u64,
    amount_cents: i64,
}

/// Builds checkout sessions
#[derive(Clone)]
pub struct CheckoutBuilder {
    provider: Arc<dyn PaymentProvider>,
    accounts: Arc<dyn AccountStore>,
    catalog: Arc<PlanCatalog>,
    config: CheckoutConfig,
}

impl CheckoutBuilder {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        accounts: Arc<dyn AccountStore>,
        catalog: Arc<PlanCatalog>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            provider,
            accounts,
            catalog,
            config,
        }
    }

    pub const fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Validate, price and open a checkout session for `caller`
    pub async fn create(&self, caller: &UserId, request: CheckoutRequest) -> Result<CheckoutSession> {
        let priced = self.price(&request.item)?;
        let cancel_url = self.cancel_url(request.return_url.as_deref())?;
        let account = self.authorize(caller, request.team_id.as_ref())?;

        let target = self
            .accounts
            .get(&account)?
            .ok_or_else(|| CreatorError::AccountNotFound(account.to_string()))?;
        let buyer_email = match &account {
            AccountRef::User(_) => target.email.clone(),
            AccountRef::Team(_) => self
                .accounts
                .get(&AccountRef::User(caller.clone()))?
                .and_then(|buyer| buyer.email),
        };

        let intent = PurchaseIntent {
            buyer: caller.clone(),
            team: request.team_id.clone(),
            kind: priced.kind.clone(),
            return_url: request.return_url.clone(),
        };

        let session = self
            .provider
            .create_session(CreateSessionParams {
                mode: priced.mode,
                line: priced.line,
                quantity: 1,
                success_url: self.config.success_url(),
                cancel_url,
                customer_id: target.customer_id.clone(),
                customer_email: buyer_email,
                metadata: intent.to_metadata(),
            })
            .await?;

        let checkout_url = session
            .url
            .ok_or_else(|| PaymentError::Stripe("No checkout URL returned".into()))?;

        tracing::info!(
            session_id = %session.id,
            account = %account,
            buyer = %caller,
            purchase_type = priced.kind.as_str(),
            credits = priced.credits,
            amount_cents = priced.amount_cents,
            provider = self.provider.name(),
            "Created checkout session"
        );

        Ok(CheckoutSession {
            session_id: session.id,
            checkout_url,
            account,
            credits: priced.credits,
            amount_cents: priced.amount_cents,
        })
    }

    fn price(&self, item: &CheckoutItem) -> Result<PricedLine> {
        match item {
            CheckoutItem::Plan { plan_id, price_id } => {
                let plan = self
                    .catalog
                    .get(plan_id)
                    .ok_or_else(|| PaymentError::Validation(format!("unknown plan '{plan_id}'")))?;
                let plan_price = plan
                    .price_id
                    .clone()
                    .ok_or_else(|| PaymentError::Validation(format!("plan '{plan_id}' is not for sale")))?;
                if let Some(requested) = price_id.as_ref().filter(|p| **p != plan_price) {
                    return Err(PaymentError::Validation(format!(
                        "price '{requested}' does not belong to plan '{plan_id}'"
                    )));
                }

                Ok(PricedLine {
                    kind: PurchaseKind::Plan {
                        plan_id: plan.id.clone(),
                    },
                    mode: if plan.is_subscription() {
                        SessionMode::Subscription
                    } else {
                        SessionMode::Payment
                    },
                    line: SessionLine::Price { price_id: plan_price },
                    credits: plan.credits,
                    amount_cents: plan.price_cents,
                })
            }
            CheckoutItem::Custom { credits } => {
                let credits = *credits;
                if credits < self.config.min_credits {
                    return Err(PaymentError::Validation(format!(
                        "minimum custom purchase is {} credits",
                        self.config.min_credits
                    )));
                }
                if credits > self.config.max_credits {
                    return Err(PaymentError::Validation(format!(
                        "maximum custom purchase is {} credits",
                        self.config.max_credits
                    )));
                }
                let amount_cents = self.config.custom_price_cents(credits)?;

                Ok(PricedLine {
                    kind: PurchaseKind::Custom { credits },
                    mode: SessionMode::Payment,
                    line: SessionLine::Custom {
                        name: format!("{credits} Creator credits"),
                        description: "One-time credit purchase".into(),
                        unit_amount_cents: amount_cents,
                    },
                    credits,
                    amount_cents,
                })
            }
        }
    }

    fn cancel_url(&self, return_url: Option<&str>) -> Result<String> {
        match return_url {
            None => Ok(self.config.default_cancel_url()),
            Some(url) if self.config.is_app_url(url) => Ok(url.to_string()),
            Some(url) => Err(PaymentError::Validation(format!(
                "return url '{url}' is outside the app"
            ))),
        }
    }

    /// Ledger row the purchase is for. Team purchases need an admin.
    fn authorize(&self, caller: &UserId, team: Option<&TeamId>) -> Result<AccountRef> {
        let Some(team) = team else {
            return Ok(AccountRef::User(caller.clone()));
        };

        match self.accounts.membership(caller)? {
            Some(membership) if membership.team_id == *team && membership.is_admin() => {
                Ok(AccountRef::Team(team.clone()))
            }
            Some(membership) if membership.team_id == *team => Err(PaymentError::Forbidden(
                "only team admins can buy credits for the team".into(),
            )),
            _ => Err(PaymentError::Forbidden(format!("not a member of team {team}"))),
        }
    }
}
