//! Partner invocation coordinator.
//!
//! Calls every applicable partner for one logical operation, isolates per-partner
//! failures, reduces the outcomes through the operation's precedence table, and hands
//! the result to the concluder. Always produces a response.

use thiserror::Error;
use tracing::{Instrument, debug, error, info_span, warn};

use cardlink_core::{Partner, ResultCode};
use cardlink_partners::{PartnerAdapters, PartnerError, PartnerReply};

use crate::concluder::{OperationConcluder, OperationResponse};
use crate::context::{OperationContext, OperationKind, PartnerOperation, PartnerOutcome};
use crate::precedence::PrecedenceTables;
use crate::routing::PartnerRouting;

/// Failures that abort the coordinator body. Caught in `invoke` and turned into
/// `ResultCode::UnknownError`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("{partner} returned no outcome")]
    NoOutcome { partner: Partner },

    #[error("operation {operation} is not applicable to this subject")]
    UnsupportedOperation { operation: OperationKind },
}

pub struct PartnerInvocationCoordinator<C> {
    adapters: PartnerAdapters,
    routing: PartnerRouting,
    tables: PrecedenceTables,
    concluder: C,
}

impl<C> PartnerInvocationCoordinator<C> {
    pub fn new(adapters: PartnerAdapters, concluder: C) -> Self {
        Self {
            adapters,
            routing: PartnerRouting::default(),
            tables: PrecedenceTables::default(),
            concluder,
        }
    }

    pub fn with_routing(mut self, routing: PartnerRouting) -> Self {
        self.routing = routing;
        self
    }

    pub fn with_tables(mut self, tables: PrecedenceTables) -> Self {
        self.tables = tables;
        self
    }

    pub fn routing(&self) -> &PartnerRouting {
        &self.routing
    }

    /// Run `ctx.operation` against every applicable partner and conclude.
    pub async fn invoke<S>(&self, ctx: &mut OperationContext<S>) -> OperationResponse
    where
        S: PartnerOperation,
        C: OperationConcluder<S>,
    {
        let span = info_span!(
            "partner_invocation",
            request_id = %ctx.request_id,
            operation = %ctx.operation,
        );

        async {
            let outcome = match self.try_invoke(ctx).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(error = %err, "partner invocation aborted");
                    ResultCode::UnknownError
                }
            };
            debug!(outcome = %outcome, "partner invocation reduced");
            self.concluder.conclude(ctx, outcome).await
        }
        .instrument(span)
        .await
    }

    async fn try_invoke<S: PartnerOperation>(&self, ctx: &mut OperationContext<S>) -> Result<ResultCode, CoordinatorError> {
        let operation = ctx.operation;
        let table = self.tables.for_operation(operation);

        let partners = ctx
            .subject
            .partners(operation, &self.routing)
            .ok_or(CoordinatorError::UnsupportedOperation { operation })?;
        let partners = Partner::in_call_order(partners);

        if partners.is_empty() {
            debug!("no applicable partners");
            return Ok(table.no_partners);
        }

        let mut outcome = table.initial;
        for partner in partners {
            let reply = self.call_partner(ctx, partner).await;
            ctx.partner_outcomes.push(PartnerOutcome {
                partner,
                code: reply.code,
                partner_reference: reply.partner_reference.clone(),
            });

            if reply.code == ResultCode::None {
                return Err(CoordinatorError::NoOutcome { partner });
            }

            outcome = table.apply(outcome, reply.code);
            if table.rule(reply.code).link {
                ctx.subject.apply_link(operation, partner, &reply);
            }
        }

        Ok(outcome)
    }

    /// One partner call with failures folded into a classified reply.
    async fn call_partner<S: PartnerOperation>(&self, ctx: &OperationContext<S>, partner: Partner) -> PartnerReply {
        let Some(adapter) = self.adapters.get(partner) else {
            warn!(%partner, "no adapter configured for partner");
            return PartnerReply::new(ResultCode::UnknownError);
        };

        match ctx.subject.call(ctx.operation, ctx.request_id, adapter.as_ref()).await {
            Ok(reply) => {
                debug!(%partner, code = %reply.code, "partner replied");
                reply
            }
            Err(PartnerError::NotSupported { .. }) => {
                debug!(%partner, "operation not supported by partner");
                PartnerReply::new(ResultCode::OperationNotSupported)
            }
            Err(err) => {
                warn!(%partner, error = %err, "partner call failed");
                PartnerReply::new(ResultCode::UnknownError)
            }
        }
    }
}

impl<C> core::fmt::Debug for PartnerInvocationCoordinator<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PartnerInvocationCoordinator")
            .field("adapters", &self.adapters)
            .field("routing", &self.routing)
            .finish_non_exhaustive()
    }
}
