//! Built-in job handlers.

mod claim_deal_for_existing_cards;
mod claim_deals_for_new_card;
mod ping;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use cardlink_core::{Card, Deal, Partner};
use cardlink_operations::{
    CardStore, ClaimStore, DealStore, OperationContext, PartnerInvocationCoordinator, StoreConcluder,
};

use crate::error::JobError;
use crate::orchestrator::OrchestratedTask;
use crate::types::{ExecutionResult, JobRecord};

pub use claim_deal_for_existing_cards::ClaimDealForExistingCards;
pub use claim_deals_for_new_card::ClaimDealsForNewCard;
pub use ping::PingJob;

/// Payload key of `ClaimDealsForNewCard`.
pub const CARD_ID_KEY: &str = "card_id";
/// Payload key of `ClaimDealForExistingCards`.
pub const DEAL_ID_KEY: &str = "deal_id";

/// Collaborators shared by the claim jobs.
#[derive(Clone)]
pub struct ClaimJobDeps {
    pub coordinator: Arc<PartnerInvocationCoordinator<StoreConcluder>>,
    pub cards: Arc<dyn CardStore>,
    pub deals: Arc<dyn DealStore>,
    pub claims: Arc<dyn ClaimStore>,
    /// Maximum claims per batch
    pub batch_size: usize,
}

impl ClaimJobDeps {
    pub const DEFAULT_BATCH_SIZE: usize = 50;

    pub fn new(
        coordinator: Arc<PartnerInvocationCoordinator<StoreConcluder>>,
        cards: Arc<dyn CardStore>,
        deals: Arc<dyn DealStore>,
        claims: Arc<dyn ClaimStore>,
    ) -> Self {
        Self {
            coordinator,
            cards,
            deals,
            claims,
            batch_size: Self::DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// True if a settled claim already exists for the pair.
    async fn already_claimed(&self, card: &Card, deal: &Deal) -> Result<bool, JobError> {
        Ok(self.claims.get(card.id, deal.id).await?.is_some())
    }
}

impl std::fmt::Debug for ClaimJobDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimJobDeps")
            .field("coordinator", &self.coordinator)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

/// Parse a required payload value.
fn payload_id<T: FromStr>(record: &JobRecord, key: &str) -> Result<T, JobError>
where
    T::Err: std::fmt::Display,
{
    let raw = record
        .payload_value(key)
        .ok_or_else(|| JobError::invalid_payload(format!("missing {key}")))?;
    raw.parse::<T>()
        .map_err(|e| JobError::invalid_payload(format!("{key}: {e}")))
}

/// True if the card and the deal share at least one partner.
fn shares_partner(card: &Card, deal: &Deal) -> bool {
    let registered: Vec<Partner> = deal.registered_partners();
    card.linked_partners().iter().any(|p| registered.contains(p))
}

/// Claim one deal for one card through the coordinator.
///
/// Transient outcomes fail the task with `JobError::Outcome` so the batch is
/// retried; any other outcome settles the pair.
struct ClaimTask {
    coordinator: Arc<PartnerInvocationCoordinator<StoreConcluder>>,
    card: Card,
    deal: Deal,
}

#[async_trait]
impl OrchestratedTask for ClaimTask {
    fn name(&self) -> String {
        format!("claim:{}:{}", self.card.id, self.deal.id)
    }

    async fn execute(&mut self) -> Result<ExecutionResult, JobError> {
        let mut ctx = OperationContext::claim_deal(self.card.clone(), self.deal.clone());
        let response = self.coordinator.invoke(&mut ctx).await;
        debug!(
            card_id = %self.card.id,
            deal_id = %self.deal.id,
            outcome = %response.code,
            "claim attempted"
        );
        if response.code.is_transient() {
            return Err(JobError::Outcome(response.code));
        }
        Ok(ExecutionResult::Success)
    }
}
