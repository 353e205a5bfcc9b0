//! Notifications and outbound email

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::{AccountRef, UserId};
use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    CreditsAdded,
    CreditsReset,
    CreditsRefunded,
}

/// In-app notification
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub account: AccountRef,
    pub user: Option<UserId>,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        account: AccountRef,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account,
            user: None,
            kind,
            title: title.into(),
            body: body.into(),
            read: false,
            created_at: Utc::now(),
        }
    }

    pub fn for_user(mut self, user: Option<UserId>) -> Self {
        self.user = user;
        self
    }
}

pub trait NotificationStore: Send + Sync {
    fn create(&self, notification: &Notification) -> Result<()>;

    /// Notifications visible to an account, newest first
    fn list(&self, account: &AccountRef, limit: usize) -> Result<Vec<Notification>>;
}

/// A rendered email
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Outbound email sink
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;

    fn name(&self) -> &str;
}
