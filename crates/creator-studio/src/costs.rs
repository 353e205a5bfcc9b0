//! Feature Costs

use serde::{Deserialize, Serialize};

use creator_core::{CreatorError, Feature, Result};

/// Credits charged per successful generation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCosts {
    pub image: u64,
    pub caption: u64,
    pub video: u64,
    pub content_plan: u64,
    pub review: u64,
}

impl Default for CreditCosts {
    fn default() -> Self {
        Self {
            image: 5,
            caption: 1,
            video: 15,
            content_plan: 10,
            review: 2,
        }
    }
}

impl CreditCosts {
    pub const fn cost(&self, feature: Feature) -> u64 {
        match feature {
            Feature::Image => self.image,
            Feature::Caption => self.caption,
            Feature::Video => self.video,
            Feature::ContentPlan => self.content_plan,
            Feature::Review => self.review,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overrides come from `CREATOR_COST_IMAGE`, `CREATOR_COST_CAPTION`, ...
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut costs = Self::default();
        for feature in Feature::ALL {
            let key = format!("CREATOR_COST_{}", feature.as_str().to_uppercase());
            let Some(raw) = lookup(&key) else {
                continue;
            };
            let value: u64 = raw
                .trim()
                .parse()
                .map_err(|_| CreatorError::Config(format!("{key} '{raw}' is not a credit count")))?;
            match feature {
                Feature::Image => costs.image = value,
                Feature::Caption => costs.caption = value,
                Feature::Video => costs.video = value,
                Feature::ContentPlan => costs.content_plan = value,
                Feature::Review => costs.review = value,
            }
        }
        Ok(costs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_costs() {
        let costs = CreditCosts::default();
        assert_eq!(costs.cost(Feature::Image), 5);
        assert_eq!(costs.cost(Feature::Caption), 1);
        assert_eq!(costs.cost(Feature::Video), 15);
        assert_eq!(costs.cost(Feature::ContentPlan), 10);
        assert_eq!(costs.cost(Feature::Review), 2);
    }

    #[test]
    fn test_overrides() {
        let costs = CreditCosts::from_lookup(|key| match key {
            "CREATOR_COST_VIDEO" => Some("25".into()),
            "CREATOR_COST_CONTENT_PLAN" => Some(" 8 ".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(costs.video, 25);
        assert_eq!(costs.content_plan, 8);
        assert_eq!(costs.image, 5);

        assert!(CreditCosts::from_lookup(|key| (key == "CREATOR_COST_IMAGE").then(|| "-1".into())).is_err());
    }
}
