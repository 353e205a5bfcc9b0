//! # creator-core
//!
//! Credit accounting for the Creator platform: accounts, the balance ledger,
//! the append-only credit history, purchase records and the provider
//! abstraction behind the paid content features.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Ledger                             │
//! │  ┌───────────────┐  ┌────────────────┐  ┌─────────────────┐  │
//! │  │  LedgerStore  │  │  HistoryStore  │  │  PurchaseStore  │  │
//! │  │ (row updates) │──│ (append-only)  │──│ (session gate)  │  │
//! │  └───────────────┘  └────────────────┘  └─────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stores are traits so the hosted database can be swapped for the in-memory
//! implementation in `memory` during development and tests.

pub mod account;
pub mod error;
pub mod generation;
pub mod history;
pub mod ledger;
pub mod memory;
pub mod notification;
pub mod plan;
pub mod purchase;

pub use account::{
    Account, AccountRef, AccountStore, SubscriptionStatus, TeamId, TeamMembership, TeamRole, UserId,
};
pub use error::{CreatorError, Result};
pub use generation::{
    BrandContext, Feature, GenerationOutput, GenerationProvider, GenerationRequest, ProviderRouter,
};
pub use history::{ActionType, CreditHistoryEntry, Direction, HistoryStore};
pub use ledger::{BalanceChange, CreditGrant, Ledger, LedgerStore};
pub use memory::{MemoryOutbox, MemoryStore};
pub use notification::{
    EmailMessage, EmailSender, Notification, NotificationKind, NotificationStore,
};
pub use plan::{Plan, PlanCatalog, PlanKind};
pub use purchase::{
    ClaimOutcome, CreditPurchase, PurchaseKind, PurchaseSource, PurchaseStatus, PurchaseStore,
};
