//! Accounts
//!
//! A ledger row belongs either to a user profile or to a team. Team members
//! spend and purchase against the team row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CreatorError, Result};

/// User identifier (as issued by the auth backend)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Team identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(String);

impl TeamId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of a ledger row
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AccountRef {
    User(UserId),
    Team(TeamId),
}

impl AccountRef {
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(UserId::from_string(id))
    }

    pub fn team(id: impl Into<String>) -> Self {
        Self::Team(TeamId::from_string(id))
    }

    pub const fn is_team(&self) -> bool {
        matches!(self, Self::Team(_))
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Team(id) => write!(f, "team:{id}"),
        }
    }
}

/// Subscription state mirrored from the payment provider
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Inactive,
    Active,
    PastDue,
    Canceled,
}

/// A user profile or team record holding a credit balance
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    /// Row key
    pub owner: AccountRef,

    /// Contact email (users, and team billing contacts)
    pub email: Option<String>,

    /// Current balance
    pub credits: u64,

    /// Active plan
    pub plan_id: Option<String>,

    pub subscription_status: SubscriptionStatus,

    pub current_period_end: Option<DateTime<Utc>>,

    /// Payment provider customer id
    pub customer_id: Option<String>,

    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create an empty account
    pub fn new(owner: AccountRef) -> Self {
        Self {
            owner,
            email: None,
            credits: 0,
            plan_id: None,
            subscription_status: SubscriptionStatus::Inactive,
            current_period_end: None,
            customer_id: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub const fn with_credits(mut self, credits: u64) -> Self {
        self.credits = credits;
        self
    }

    /// Whether the subscription is paid up at `now`
    pub fn has_active_subscription(&self, now: DateTime<Utc>) -> bool {
        self.subscription_status == SubscriptionStatus::Active
            && self.current_period_end.is_none_or(|end| end > now)
    }
}

/// Role inside a team
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Admin,
    Member,
}

/// Membership of a user in a team
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMembership {
    pub team_id: TeamId,
    pub user_id: UserId,
    pub role: TeamRole,
}

impl TeamMembership {
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, TeamRole::Admin)
    }
}

/// Account and membership directory
pub trait AccountStore: Send + Sync {
    /// Create or replace an account row
    fn save(&self, account: &Account) -> Result<()>;

    /// Insert `account` unless its row exists; false when it already did
    fn insert_if_absent(&self, account: &Account) -> Result<bool>;

    /// Get account by key
    fn get(&self, owner: &AccountRef) -> Result<Option<Account>>;

    /// Find a user account by contact email (case-insensitive)
    fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Record a team membership
    fn save_membership(&self, membership: &TeamMembership) -> Result<()>;

    /// Team membership of a user, if any
    fn membership(&self, user: &UserId) -> Result<Option<TeamMembership>>;
}

/// Resolve the account a user spends from: the team row for team members,
/// the user's own row otherwise.
pub fn effective_account(store: &dyn AccountStore, user: &UserId) -> Result<AccountRef> {
    Ok(match store.membership(user)? {
        Some(membership) => AccountRef::Team(membership.team_id),
        None => AccountRef::User(user.clone()),
    })
}

/// Make sure the user has a profile row (0 credits when new) and resolve the
/// account they spend from.
pub fn provision_user(
    store: &dyn AccountStore,
    user: &UserId,
    email: Option<&str>,
) -> Result<AccountRef> {
    let mut fresh = Account::new(AccountRef::User(user.clone()));
    fresh.email = email.map(String::from);
    if store.insert_if_absent(&fresh)? {
        tracing::info!(user = %user, "Provisioned user account");
    }
    effective_account(store, user)
}

/// Create a team row (if missing) and attach members to it
pub fn provision_team(
    store: &dyn AccountStore,
    team: &TeamId,
    email: Option<&str>,
    members: &[(UserId, TeamRole)],
) -> Result<Account> {
    let mut fresh = Account::new(AccountRef::Team(team.clone()));
    fresh.email = email.map(String::from);
    store.insert_if_absent(&fresh)?;

    for (user, role) in members {
        store.insert_if_absent(&Account::new(AccountRef::User(user.clone())))?;
        store.save_membership(&TeamMembership {
            team_id: team.clone(),
            user_id: user.clone(),
            role: *role,
        })?;
    }

    tracing::info!(team = %team, members = members.len(), "Provisioned team");
    store
        .get(&fresh.owner)?
        .ok_or_else(|| CreatorError::AccountNotFound(fresh.owner.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_account_ref_display() {
        assert_eq!(AccountRef::user("u1").to_string(), "user:u1");
        assert_eq!(AccountRef::team("t1").to_string(), "team:t1");
    }

    #[test]
    fn test_account_ref_serde_is_tagged() {
        let json = serde_json::to_value(AccountRef::team("t1")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "team", "id": "t1"}));
    }

    #[test]
    fn test_subscription_activity() {
        let now = Utc::now();
        let mut account = Account::new(AccountRef::user("u1"));
        assert!(!account.has_active_subscription(now));

        account.subscription_status = SubscriptionStatus::Active;
        account.current_period_end = Some(now + Duration::days(3));
        assert!(account.has_active_subscription(now));
        assert!(!account.has_active_subscription(now + Duration::days(4)));
    }
}
