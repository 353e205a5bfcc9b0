//! # creator-studio
//!
//! Credit-metered content features.
//!
//! ## Charging rule
//!
//! Credits are spent only for delivered work:
//!
//! ```text
//! ┌──────────────┐   balance >= cost?   ┌──────────────┐   Ok    ┌──────────────┐
//! │   request    │─────────────────────▶│   provider   │────────▶│ debit + log  │
//! └──────────────┘          │ no        └──────────────┘         └──────────────┘
//!                           ▼                   │ Err
//!                 402 {required, available}     ▼
//!                                        balance untouched
//! ```
//!
//! | feature        | credits |
//! |----------------|---------|
//! | image          | 5       |
//! | caption        | 1       |
//! | video          | 15      |
//! | content plan   | 10      |
//! | review         | 2       |

pub mod costs;
pub mod guard;
pub mod mock;
pub mod studio;

pub use costs::CreditCosts;
pub use guard::{Charged, ConsumptionGuard};
pub use mock::{Scripted, ScriptedProvider};
pub use studio::Studio;
