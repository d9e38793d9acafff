use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use cardlink_core::{Deal, DealId, ResultCode};

use super::{ClaimJobDeps, ClaimTask, DEAL_ID_KEY, payload_id, shares_partner};
use crate::error::JobError;
use crate::orchestrator::{OrchestratedJob, OrchestratedTask};
use crate::types::{ExecutionResult, JobRecord};

/// Claims a newly registered deal for every active card linked to one of the
/// deal's partners, `batch_size` cards per batch.
pub struct ClaimDealForExistingCards {
    deal_id: DealId,
    deps: ClaimJobDeps,
    remaining: usize,
}

impl ClaimDealForExistingCards {
    pub fn from_record(record: &JobRecord, deps: ClaimJobDeps) -> Result<Self, JobError> {
        Ok(Self {
            deal_id: payload_id(record, DEAL_ID_KEY)?,
            deps,
            remaining: 0,
        })
    }

    pub fn deal_id(&self) -> DealId {
        self.deal_id
    }

    /// The deal if it exists and has not ended.
    async fn claimable_deal(&self) -> Result<Result<Deal, ResultCode>, JobError> {
        let Some(deal) = self.deps.deals.get(self.deal_id).await? else {
            return Ok(Err(ResultCode::DealNotFound));
        };
        if Utc::now() >= deal.ends_at {
            return Ok(Err(ResultCode::DealExpired));
        }
        Ok(Ok(deal))
    }
}

#[async_trait]
impl OrchestratedJob for ClaimDealForExistingCards {
    async fn next_tasks(&mut self) -> Result<Vec<Box<dyn OrchestratedTask>>, JobError> {
        let deal = match self.claimable_deal().await? {
            Ok(deal) => deal,
            Err(code) => {
                warn!(deal_id = %self.deal_id, outcome = %code, "deal cannot be claimed");
                return Err(JobError::Outcome(code));
            }
        };

        let mut pending = Vec::new();
        for card in self.deps.cards.list_active().await? {
            if shares_partner(&card, &deal) && !self.deps.already_claimed(&card, &deal).await? {
                pending.push(card);
            }
        }

        let take = pending.len().min(self.deps.batch_size);
        let rest = pending.split_off(take);
        self.remaining = rest.len();
        debug!(deal_id = %self.deal_id, batch = pending.len(), remaining = self.remaining, "claim batch prepared");

        Ok(pending
            .into_iter()
            .map(|card| {
                Box::new(ClaimTask {
                    coordinator: self.deps.coordinator.clone(),
                    card,
                    deal: deal.clone(),
                }) as Box<dyn OrchestratedTask>
            })
            .collect())
    }

    async fn cleanup(&mut self, result: ExecutionResult) -> ExecutionResult {
        match result {
            ExecutionResult::NonTerminalError => match self.claimable_deal().await {
                Ok(Err(code)) => {
                    info!(deal_id = %self.deal_id, outcome = %code, "deal no longer claimable, canceling job");
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

impl std::fmt::Debug for ClaimDealForExistingCards {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimDealForExistingCards")
            .field("deal_id", &self.deal_id)
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}
