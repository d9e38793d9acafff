use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use cardlink_core::{Card, CardId, ResultCode};

use super::{CARD_ID_KEY, ClaimJobDeps, ClaimTask, payload_id, shares_partner};
use crate::error::JobError;
use crate::orchestrator::{OrchestratedJob, OrchestratedTask};
use crate::types::{ExecutionResult, JobRecord};

/// Claims every active deal for a newly added card, `batch_size` deals per batch.
///
/// Pairs with a settled claim record are skipped, so a re-leased run picks up where
/// the previous one stopped.
pub struct ClaimDealsForNewCard {
    card_id: CardId,
    deps: ClaimJobDeps,
    /// Unclaimed deals left over after the latest batch.
    remaining: usize,
}

impl ClaimDealsForNewCard {
    pub fn from_record(record: &JobRecord, deps: ClaimJobDeps) -> Result<Self, JobError> {
        Ok(Self {
            card_id: payload_id(record, CARD_ID_KEY)?,
            deps,
            remaining: 0,
        })
    }

    pub fn card_id(&self) -> CardId {
        self.card_id
    }

    async fn active_card(&self) -> Result<Option<Card>, JobError> {
        Ok(self.deps.cards.get(self.card_id).await?.filter(|c| c.active))
    }
}

#[async_trait]
impl OrchestratedJob for ClaimDealsForNewCard {
    async fn next_tasks(&mut self) -> Result<Vec<Box<dyn OrchestratedTask>>, JobError> {
        let Some(card) = self.active_card().await? else {
            warn!(card_id = %self.card_id, "card missing or inactive");
            return Err(JobError::Outcome(ResultCode::CardNotEnrolled));
        };

        let mut pending = Vec::new();
        for deal in self.deps.deals.list_active(Utc::now()).await? {
            if shares_partner(&card, &deal) && !self.deps.already_claimed(&card, &deal).await? {
                pending.push(deal);
            }
        }

        let take = pending.len().min(self.deps.batch_size);
        let rest = pending.split_off(take);
        self.remaining = rest.len();
        debug!(card_id = %self.card_id, batch = pending.len(), remaining = self.remaining, "claim batch prepared");

        Ok(pending
            .into_iter()
            .map(|deal| {
                Box::new(ClaimTask {
                    coordinator: self.deps.coordinator.clone(),
                    card: card.clone(),
                    deal,
                }) as Box<dyn OrchestratedTask>
            })
            .collect())
    }

    async fn cleanup(&mut self, result: ExecutionResult) -> ExecutionResult {
        match result {
            ExecutionResult::NonTerminalError => match self.active_card().await {
                Ok(None) => {
                    info!(card_id = %self.card_id, "card gone, canceling claim job");
                    ExecutionResult::TerminalError
                }
                _ => result,
            },
            _ => result,
        }
    }

    fn has_more_work(&self) -> bool {
        self.remaining > 0
    }
}

impl std::fmt::Debug for ClaimDealsForNewCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimDealsForNewCard")
            .field("card_id", &self.card_id)
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}
