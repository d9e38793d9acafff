//! Final step of an operation: fix the outcome on the context and produce the
//! response handed back to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use cardlink_core::{Card, Deal, RequestId, ResultCode};

use crate::context::{ClaimSubject, OperationContext, OperationKind, PartnerOutcome};
use crate::store::{CardStore, ClaimRecord, ClaimStore, DealStore, StoreError};

/// Response returned for one logical operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResponse {
    pub request_id: RequestId,
    pub operation: OperationKind,
    pub code: ResultCode,
    pub partner_outcomes: Vec<PartnerOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl OperationResponse {
    pub fn from_context<S>(ctx: &OperationContext<S>, code: ResultCode) -> Self {
        Self {
            request_id: ctx.request_id,
            operation: ctx.operation,
            code,
            partner_outcomes: ctx.partner_outcomes.clone(),
            explanation: None,
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }
}

#[async_trait]
pub trait OperationConcluder<S: Send>: Send + Sync {
    async fn conclude(&self, ctx: &mut OperationContext<S>, outcome: ResultCode) -> OperationResponse;
}

/// Records the outcome and echoes it back. No persistence.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseConcluder;

#[async_trait]
impl<S: Send + Sync> OperationConcluder<S> for ResponseConcluder {
    async fn conclude(&self, ctx: &mut OperationContext<S>, outcome: ResultCode) -> OperationResponse {
        ctx.outcome = Some(outcome);
        OperationResponse::from_context(ctx, outcome)
    }
}

/// Persists the subject after the outcome is known.
///
/// Cards and deals are saved on success. Claims are recorded for every outcome that
/// is not transient so the claim jobs can skip settled pairs. A store failure turns
/// the response into `UnknownError`; partner-side effects are not rolled back.
#[derive(Clone)]
pub struct StoreConcluder {
    cards: Arc<dyn CardStore>,
    deals: Arc<dyn DealStore>,
    claims: Arc<dyn ClaimStore>,
}

impl StoreConcluder {
    pub fn new(cards: Arc<dyn CardStore>, deals: Arc<dyn DealStore>, claims: Arc<dyn ClaimStore>) -> Self {
        Self { cards, deals, claims }
    }

    fn finish<S>(
        ctx: &mut OperationContext<S>,
        outcome: ResultCode,
        persisted: Result<(), StoreError>,
    ) -> OperationResponse {
        match persisted {
            Ok(()) => {
                ctx.outcome = Some(outcome);
                OperationResponse::from_context(ctx, outcome)
            }
            Err(err) => {
                error!(
                    request_id = %ctx.request_id,
                    operation = %ctx.operation,
                    partner_outcome = %outcome,
                    error = %err,
                    "failed to persist operation result"
                );
                ctx.outcome = Some(ResultCode::UnknownError);
                OperationResponse::from_context(ctx, ResultCode::UnknownError)
                    .with_explanation(format!("partners returned {outcome} but the result was not stored"))
            }
        }
    }
}

impl core::fmt::Debug for StoreConcluder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StoreConcluder").finish_non_exhaustive()
    }
}

#[async_trait]
impl OperationConcluder<Card> for StoreConcluder {
    async fn conclude(&self, ctx: &mut OperationContext<Card>, outcome: ResultCode) -> OperationResponse {
        let persisted = if outcome.is_success() {
            if ctx.operation == OperationKind::RemoveCard && ctx.subject.linked_partners().is_empty() {
                ctx.subject.deactivate();
            }
            self.cards.save(&ctx.subject).await
        } else {
            Ok(())
        };
        Self::finish(ctx, outcome, persisted)
    }
}

#[async_trait]
impl OperationConcluder<Deal> for StoreConcluder {
    async fn conclude(&self, ctx: &mut OperationContext<Deal>, outcome: ResultCode) -> OperationResponse {
        let persisted = if outcome.is_success() {
            self.deals.save(&ctx.subject).await
        } else {
            Ok(())
        };
        Self::finish(ctx, outcome, persisted)
    }
}

#[async_trait]
impl OperationConcluder<ClaimSubject> for StoreConcluder {
    async fn conclude(&self, ctx: &mut OperationContext<ClaimSubject>, outcome: ResultCode) -> OperationResponse {
        let persisted = if outcome.is_transient() {
            Ok(())
        } else {
            let record = ClaimRecord {
                card_id: ctx.subject.card.id,
                deal_id: ctx.subject.deal.id,
                outcome,
                partner_references: ctx.subject.claim_references.clone(),
                recorded_at: Utc::now(),
            };
            info!(
                card_id = %record.card_id,
                deal_id = %record.deal_id,
                outcome = %outcome,
                "claim recorded"
            );
            self.claims.record(record).await
        };
        Self::finish(ctx, outcome, persisted)
    }
}
