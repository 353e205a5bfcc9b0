//! Plan Catalog
//!
//! Subscription plans and one-off credit packages with their credit grants.
//! The catalog doubles as the product table the webhook uses when a session
//! carries no Creator metadata.

use serde::{Deserialize, Serialize};

use crate::error::{CreatorError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanKind {
    /// Grants credits and sets the account plan for a billing period
    Subscription,

    /// Grants credits only
    Package,
}

/// A catalog entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub kind: PlanKind,

    /// Credits granted per purchase
    pub credits: u64,

    /// Price in cents
    pub price_cents: i64,

    /// Payment provider price id
    #[serde(default)]
    pub price_id: Option<String>,

    /// Payment provider product id
    #[serde(default)]
    pub product_id: Option<String>,
}

impl Plan {
    pub const fn is_subscription(&self) -> bool {
        matches!(self.kind, PlanKind::Subscription)
    }
}

/// Read-only plan catalog
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    pub const fn new(plans: Vec<Plan>) -> Self {
        Self { plans }
    }

    /// Parse a JSON array of plans
    pub fn from_json(json: &str) -> Result<Self> {
        let plans: Vec<Plan> = serde_json::from_str(json)?;
        for plan in &plans {
            if plan.credits == 0 {
                return Err(CreatorError::Config(format!(
                    "plan {} grants no credits",
                    plan.id
                )));
            }
        }
        Ok(Self { plans })
    }

    /// Built-in catalog
    pub fn standard() -> Self {
        Self::new(vec![
            Plan {
                id: "starter".into(),
                name: "Starter".into(),
                kind: PlanKind::Subscription,
                credits: 100,
                price_cents: 1900,
                price_id: Some("price_starter_monthly".into()),
                product_id: Some("prod_starter".into()),
            },
            Plan {
                id: "pro".into(),
                name: "Pro".into(),
                kind: PlanKind::Subscription,
                credits: 500,
                price_cents: 4900,
                price_id: Some("price_pro_monthly".into()),
                product_id: Some("prod_pro".into()),
            },
            Plan {
                id: "agency".into(),
                name: "Agency".into(),
                kind: PlanKind::Subscription,
                credits: 2000,
                price_cents: 14900,
                price_id: Some("price_agency_monthly".into()),
                product_id: Some("prod_agency".into()),
            },
            Plan {
                id: "pack-250".into(),
                name: "250 credit pack".into(),
                kind: PlanKind::Package,
                credits: 250,
                price_cents: 2900,
                price_id: Some("price_pack_250".into()),
                product_id: Some("prod_pack_250".into()),
            },
        ])
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }

    pub fn get(&self, id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == id)
    }

    /// Lookup that fails with `PlanNotFound`
    pub fn require(&self, id: &str) -> Result<&Plan> {
        self.get(id)
            .ok_or_else(|| CreatorError::PlanNotFound(id.to_string()))
    }

    pub fn by_price(&self, price_id: &str) -> Option<&Plan> {
        self.plans
            .iter()
            .find(|p| p.price_id.as_deref() == Some(price_id))
    }

    pub fn by_product(&self, product_id: &str) -> Option<&Plan> {
        self.plans
            .iter()
            .find(|p| p.product_id.as_deref() == Some(product_id))
    }
}
