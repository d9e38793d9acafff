//! Request-scoped operation state.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cardlink_core::{Card, Deal, Partner, RequestId, ResultCode};
use cardlink_partners::{CardRequest, ClaimRequest, DealRequest, PartnerAdapter, PartnerError, PartnerReply};

use crate::routing::PartnerRouting;

/// Logical operation relayed to partners.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    AddCard,
    RemoveCard,
    RegisterDeal,
    /// Claim (redeem) a deal for a card with every partner holding both.
    ClaimDeal,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::AddCard => "add_card",
            OperationKind::RemoveCard => "remove_card",
            OperationKind::RegisterDeal => "register_deal",
            OperationKind::ClaimDeal => "claim_deal",
        }
    }
}

impl core::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One partner's classified answer, in call order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerOutcome {
    pub partner: Partner,
    pub code: ResultCode,
    pub partner_reference: Option<String>,
}

/// Subject of a `ClaimDeal` operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSubject {
    pub card: Card,
    pub deal: Deal,
    /// Claim identifiers returned by partners that accepted the claim.
    pub claim_references: BTreeMap<Partner, String>,
}

impl ClaimSubject {
    pub fn new(card: Card, deal: Deal) -> Self {
        Self {
            card,
            deal,
            claim_references: BTreeMap::new(),
        }
    }
}

/// Per-request state of one logical operation.
///
/// Created at request entry with the subject populated; owned by the executing
/// task until the response is produced.
#[derive(Debug, Clone)]
pub struct OperationContext<S> {
    pub request_id: RequestId,
    pub operation: OperationKind,
    pub subject: S,
    pub partner_outcomes: Vec<PartnerOutcome>,
    /// Final outcome; set by the concluder.
    pub outcome: Option<ResultCode>,
    pub started_at: DateTime<Utc>,
}

impl<S> OperationContext<S> {
    fn new(operation: OperationKind, subject: S) -> Self {
        Self {
            request_id: RequestId::new(),
            operation,
            subject,
            partner_outcomes: Vec::new(),
            outcome: None,
            started_at: Utc::now(),
        }
    }

    /// Override the generated request id (e.g. to correlate with an upstream id).
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn outcome_for(&self, partner: Partner) -> Option<ResultCode> {
        self.partner_outcomes
            .iter()
            .find(|o| o.partner == partner)
            .map(|o| o.code)
    }
}

impl OperationContext<Card> {
    pub fn add_card(card: Card) -> Self {
        Self::new(OperationKind::AddCard, card)
    }

    pub fn remove_card(card: Card) -> Self {
        Self::new(OperationKind::RemoveCard, card)
    }
}

impl OperationContext<Deal> {
    pub fn register_deal(deal: Deal) -> Self {
        Self::new(OperationKind::RegisterDeal, deal)
    }
}

impl OperationContext<ClaimSubject> {
    pub fn claim_deal(card: Card, deal: Deal) -> Self {
        Self::new(OperationKind::ClaimDeal, ClaimSubject::new(card, deal))
    }
}

/// Subject-specific part of partner invocation: which partners apply, how to call
/// an adapter, and what a linking outcome does to the subject.
#[async_trait]
pub trait PartnerOperation: Send + Sync {
    /// Applicable partners, in call order. `None` if the subject cannot take part in
    /// `operation` at all.
    fn partners(&self, operation: OperationKind, routing: &PartnerRouting) -> Option<Vec<Partner>>;

    async fn call(
        &self,
        operation: OperationKind,
        request_id: RequestId,
        adapter: &dyn PartnerAdapter,
    ) -> Result<PartnerReply, PartnerError>;

    /// Record the partner-side effect of a linking outcome, for `partner` only.
    fn apply_link(&mut self, operation: OperationKind, partner: Partner, reply: &PartnerReply);
}

#[async_trait]
impl PartnerOperation for Card {
    fn partners(&self, operation: OperationKind, routing: &PartnerRouting) -> Option<Vec<Partner>> {
        match operation {
            OperationKind::AddCard => Some(routing.partners_for_brand(self.brand)),
            OperationKind::RemoveCard => Some(self.linked_partners()),
            OperationKind::RegisterDeal | OperationKind::ClaimDeal => None,
        }
    }

    async fn call(
        &self,
        operation: OperationKind,
        request_id: RequestId,
        adapter: &dyn PartnerAdapter,
    ) -> Result<PartnerReply, PartnerError> {
        let request = CardRequest::for_card(request_id, self, adapter.partner());
        match operation {
            OperationKind::RemoveCard => adapter.remove_card(&request).await,
            _ => adapter.add_card(&request).await,
        }
    }

    fn apply_link(&mut self, operation: OperationKind, partner: Partner, reply: &PartnerReply) {
        match operation {
            OperationKind::AddCard => {
                if let Some(reference) = &reply.partner_reference {
                    self.link_partner(partner, reference.clone());
                }
            }
            OperationKind::RemoveCard => self.unlink_partner(partner),
            OperationKind::RegisterDeal | OperationKind::ClaimDeal => {}
        }
    }
}

#[async_trait]
impl PartnerOperation for Deal {
    fn partners(&self, operation: OperationKind, routing: &PartnerRouting) -> Option<Vec<Partner>> {
        match operation {
            OperationKind::RegisterDeal => Some(routing.deal_partners()),
            _ => None,
        }
    }

    async fn call(
        &self,
        _operation: OperationKind,
        request_id: RequestId,
        adapter: &dyn PartnerAdapter,
    ) -> Result<PartnerReply, PartnerError> {
        adapter.register_deal(&DealRequest::for_deal(request_id, self)).await
    }

    fn apply_link(&mut self, _operation: OperationKind, partner: Partner, reply: &PartnerReply) {
        if let Some(reference) = &reply.partner_reference {
            self.register_partner(partner, reference.clone());
        }
    }
}

#[async_trait]
impl PartnerOperation for ClaimSubject {
    fn partners(&self, operation: OperationKind, _routing: &PartnerRouting) -> Option<Vec<Partner>> {
        match operation {
            OperationKind::ClaimDeal => {
                let registered = self.deal.registered_partners();
                Some(
                    self.card
                        .linked_partners()
                        .into_iter()
                        .filter(|p| registered.contains(p))
                        .collect(),
                )
            }
            _ => None,
        }
    }

    async fn call(
        &self,
        _operation: OperationKind,
        request_id: RequestId,
        adapter: &dyn PartnerAdapter,
    ) -> Result<PartnerReply, PartnerError> {
        let partner = adapter.partner();
        let (Some(partner_card_id), Some(partner_deal_id)) =
            (self.card.partner_card_id(partner), self.deal.partner_deal_id(partner))
        else {
            return Err(PartnerError::InvalidRequest {
                partner,
                message: "card or deal is not associated with this partner".to_string(),
            });
        };

        let request = ClaimRequest {
            request_id,
            card_id: self.card.id,
            deal_id: self.deal.id,
            partner_card_id: partner_card_id.to_string(),
            partner_deal_id: partner_deal_id.to_string(),
        };
        adapter.claim_deal(&request).await
    }

    fn apply_link(&mut self, _operation: OperationKind, partner: Partner, reply: &PartnerReply) {
        let reference = reply
            .partner_reference
            .clone()
            .unwrap_or_else(|| format!("{}:{}", partner, self.deal.id));
        self.claim_references.insert(partner, reference);
    }
}
