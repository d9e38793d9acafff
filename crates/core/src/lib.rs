//! `cardlink-core`: domain building blocks shared by the partner adapters, the
//! invocation coordinator and the job runners.
//!
//! This crate contains **pure domain** primitives (no IO, no async).

pub mod card;
pub mod deal;
pub mod error;
pub mod id;
pub mod outcome;
pub mod partner;

pub use card::{Card, CardBrand};
pub use deal::{Deal, Discount};
pub use error::{DomainError, DomainResult};
pub use id::{CardId, DealId, RequestId, UserId};
pub use outcome::ResultCode;
pub use partner::{Partner, PartnerCardInfo, PartnerDealInfo};
