//! Server Configuration

use std::collections::HashSet;

use creator_core::{PlanCatalog, Result, UserId};

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,

    /// Public base URL, used in email links
    pub public_url: String,

    /// Users allowed to reset and refund balances
    pub admins: HashSet<UserId>,

    pub catalog: PlanCatalog,

    /// Secret for the signed email hook; the hook is disabled without it
    pub email_hook_secret: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let catalog = match lookup("CREATOR_PLANS") {
            Some(json) => PlanCatalog::from_json(&json)?,
            None => PlanCatalog::standard(),
        };

        let admins = lookup("CREATOR_ADMINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(UserId::from_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            public_url: lookup("CREATOR_PUBLIC_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "http://localhost:3000".into()),
            admins,
            catalog,
            email_hook_secret: lookup("EMAIL_HOOK_SECRET").filter(|s| !s.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert!(config.admins.is_empty());
        assert!(config.catalog.get("pro").is_some());
        assert!(config.email_hook_secret.is_none());
    }

    #[test]
    fn test_admins_and_plans() {
        let config = ServerConfig::from_lookup(|key| match key {
            "CREATOR_ADMINS" => Some("alice, bob,,".into()),
            "CREATOR_PLANS" => Some(
                r#"[{"id":"solo","name":"Solo","kind":"package","credits":50,"price_cents":900}]"#.into(),
            ),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.admins.len(), 2);
        assert!(config.admins.contains(&UserId::from_string("bob")));
        assert_eq!(config.catalog.plans().len(), 1);
        assert!(config.catalog.get("solo").is_some());
    }

    #[test]
    fn test_bad_plans_json_fails() {
        assert!(ServerConfig::from_lookup(|key| (key == "CREATOR_PLANS").then(|| "{".into())).is_err());
    }
}
