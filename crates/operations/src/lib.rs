//! `cardlink-operations`: relays one logical card/deal operation to every
//! applicable partner and reconciles their outcomes into one `ResultCode`.
//!
//! ## Flow
//!
//! ```text
//! OperationContext (subject + operation)
//!   ↓
//! 1. Partner set from PartnerRouting / subject associations (call order)
//!   ↓
//! 2. Each adapter called sequentially; adapter failures isolated per partner
//!   ↓
//! 3. Outcomes reduced through the operation's PrecedenceTable
//!   ↓
//! 4. OperationConcluder finalizes the context and builds the response
//! ```

pub mod concluder;
pub mod context;
pub mod coordinator;
pub mod precedence;
pub mod routing;
pub mod store;

pub use concluder::{OperationConcluder, OperationResponse, ResponseConcluder, StoreConcluder};
pub use context::{ClaimSubject, OperationContext, OperationKind, PartnerOperation, PartnerOutcome};
pub use coordinator::{CoordinatorError, PartnerInvocationCoordinator};
pub use precedence::{PrecedenceRule, PrecedenceTable, PrecedenceTables};
pub use routing::PartnerRouting;
pub use store::{
    CardStore, ClaimRecord, ClaimStore, DealStore, InMemoryCardStore, InMemoryClaimStore, InMemoryDealStore,
    StoreError,
};
