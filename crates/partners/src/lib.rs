//! `cardlink-partners`
//!
//! **Responsibility:** translate generic card/deal operations into partner-specific
//! wire requests and classify partner responses into canonical `ResultCode`s.
//!
//! Adapters never reconcile across partners; that is the coordinator's job
//! (`cardlink-operations`). The only retrying done here is the caller-level
//! `PartnerRetry` wrapper around a single transport call.

pub mod adapter;
pub mod amex;
pub mod mastercard;
pub mod registry;
pub mod retry;
pub mod transport;
pub mod visa;

pub use adapter::{CardRequest, ClaimRequest, DealRequest, PartnerAdapter, PartnerError, PartnerReply};
pub use amex::{AmexAdapter, AmexTransport};
pub use mastercard::{MasterCardAdapter, MasterCardTransport};
pub use registry::{PartnerAdapters, PartnerTransports};
pub use retry::{PartnerRetry, PartnerRetryPolicy};
pub use transport::TransportError;
pub use visa::{VisaAdapter, VisaTransport};
