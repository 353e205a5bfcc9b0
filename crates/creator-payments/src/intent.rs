//! Purchase Intent
//!
//! Typed form of the metadata attached to a checkout session. It is written
//! when the session is created and parsed back when the session is
//! reconciled; nothing in between handles the raw key-value map.

use std::collections::HashMap;

use creator_core::{AccountRef, PurchaseKind, TeamId, UserId};

use crate::error::{PaymentError, Result};

const USER_ID: &str = "user_id";
const TEAM_ID: &str = "team_id";
const PURCHASE_TYPE: &str = "purchase_type";
const PLAN_ID: &str = "plan_id";
const CREDITS: &str = "credits";
const RETURN_URL: &str = "return_url";

/// Who is buying what
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurchaseIntent {
    pub buyer: UserId,

    /// Set for team-scoped purchases
    pub team: Option<TeamId>,

    pub kind: PurchaseKind,

    /// Page to return to after verification
    pub return_url: Option<String>,
}

impl PurchaseIntent {
    /// Ledger row the purchase credits
    pub fn account(&self) -> AccountRef {
        match &self.team {
            Some(team) => AccountRef::Team(team.clone()),
            None => AccountRef::User(self.buyer.clone()),
        }
    }

    pub fn to_metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert(USER_ID.to_string(), self.buyer.to_string());
        if let Some(team) = &self.team {
            metadata.insert(TEAM_ID.to_string(), team.to_string());
        }
        metadata.insert(PURCHASE_TYPE.to_string(), self.kind.as_str().to_string());
        match &self.kind {
            PurchaseKind::Plan { plan_id } => {
                metadata.insert(PLAN_ID.to_string(), plan_id.clone());
            }
            PurchaseKind::Custom { credits } => {
                metadata.insert(CREDITS.to_string(), credits.to_string());
            }
        }
        if let Some(url) = &self.return_url {
            metadata.insert(RETURN_URL.to_string(), url.clone());
        }
        metadata
    }

    pub fn from_metadata(metadata: &HashMap<String, String>) -> Result<Self> {
        let field = |key: &str| {
            metadata
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| field(key).ok_or_else(|| PaymentError::MissingMetadata(key.to_string()));

        let buyer = UserId::from_string(required(USER_ID)?);
        let team = field(TEAM_ID).map(TeamId::from_string);

        let kind = match required(PURCHASE_TYPE)? {
            "plan" | "package" => PurchaseKind::Plan {
                plan_id: required(PLAN_ID)?.to_string(),
            },
            "custom" => {
                let raw = required(CREDITS)?;
                let credits: u64 = raw
                    .parse()
                    .map_err(|_| PaymentError::InvalidMetadata(format!("credits '{raw}' is not a count")))?;
                if credits == 0 {
                    return Err(PaymentError::InvalidMetadata("credits must be positive".into()));
                }
                PurchaseKind::Custom { credits }
            }
            other => {
                return Err(PaymentError::InvalidMetadata(format!(
                    "unknown purchase_type '{other}'"
                )));
            }
        };

        Ok(Self {
            buyer,
            team,
            kind,
            return_url: field(RETURN_URL).map(str::to_string),
        })
    }

    /// Whether the map carries Creator purchase metadata at all
    pub fn is_present(metadata: &HashMap<String, String>) -> bool {
        metadata.contains_key(PURCHASE_TYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_custom_team_intent_metadata() {
        let intent = PurchaseIntent {
            buyer: UserId::from_string("u1"),
            team: Some(TeamId::from_string("t1")),
            kind: PurchaseKind::Custom { credits: 40 },
            return_url: Some("https://app/billing".into()),
        };
        let metadata = intent.to_metadata();
        assert_eq!(metadata["purchase_type"], "custom");
        assert_eq!(metadata["credits"], "40");
        assert_eq!(metadata["team_id"], "t1");

        let parsed = PurchaseIntent::from_metadata(&metadata).unwrap();
        assert_eq!(parsed, intent);
        assert_eq!(parsed.account(), AccountRef::team("t1"));
    }

    #[test]
    fn test_plan_metadata_without_team_credits_user() {
        let parsed = PurchaseIntent::from_metadata(&meta(&[
            ("user_id", "u1"),
            ("purchase_type", "plan"),
            ("plan_id", "pro"),
            ("team_id", ""),
        ]))
        .unwrap();
        assert_eq!(parsed.kind, PurchaseKind::Plan { plan_id: "pro".into() });
        assert_eq!(parsed.account(), AccountRef::user("u1"));
    }

    #[test]
    fn test_missing_and_invalid_metadata() {
        assert!(matches!(
            PurchaseIntent::from_metadata(&meta(&[("purchase_type", "custom"), ("credits", "20")])),
            Err(PaymentError::MissingMetadata(field)) if field == "user_id"
        ));
        assert!(matches!(
            PurchaseIntent::from_metadata(&meta(&[("user_id", "u1"), ("purchase_type", "custom"), ("credits", "lots")])),
            Err(PaymentError::InvalidMetadata(_))
        ));
        assert!(matches!(
            PurchaseIntent::from_metadata(&meta(&[("user_id", "u1"), ("purchase_type", "gift")])),
            Err(PaymentError::InvalidMetadata(_))
        ));
        assert!(!PurchaseIntent::is_present(&meta(&[("user_id", "u1")])));
    }
}
