//! Studio
//!
//! Credit-metered content features. Each request is priced by feature,
//! routed to a generation provider under the consumption guard, and charged
//! only when the provider returns content.

use serde_json::json;

use creator_core::{GenerationOutput, GenerationRequest, ProviderRouter, Result, UserId};

use crate::costs::CreditCosts;
use crate::guard::{Charged, ConsumptionGuard};

#[derive(Clone)]
pub struct Studio {
    guard: ConsumptionGuard,
    router: ProviderRouter,
    costs: CreditCosts,
}

impl Studio {
    pub const fn new(guard: ConsumptionGuard, router: ProviderRouter, costs: CreditCosts) -> Self {
        Self {
            guard,
            router,
            costs,
        }
    }

    pub const fn costs(&self) -> &CreditCosts {
        &self.costs
    }

    pub const fn guard(&self) -> &ConsumptionGuard {
        &self.guard
    }

    pub const fn router(&self) -> &ProviderRouter {
        &self.router
    }

    pub async fn generate(
        &self,
        user: &UserId,
        request: GenerationRequest,
    ) -> Result<Charged<GenerationOutput>> {
        request.validate()?;

        let feature = request.feature;
        let cost = self.costs.cost(feature);
        let description = match &request.brand {
            Some(brand) => format!("Generated {feature} for {}", brand.name),
            None => format!("Generated {feature}"),
        };
        let metadata = json!({
            "feature": feature,
            "model": request.model,
            "brand": request.brand.as_ref().map(|b| b.name.clone()),
        });

        let router = &self.router;
        let request = &request;
        let charged = self
            .guard
            .run(user, cost, &description, metadata, || router.generate(request))
            .await?;

        tracing::info!(
            user = %user,
            account = %charged.account,
            feature = %feature,
            provider = %charged.value.provider,
            cost,
            balance = charged.balance,
            "Generation charged"
        );

        Ok(charged)
    }
}
