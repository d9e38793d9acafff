//! Partner adapter contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cardlink_core::{Card, CardBrand, CardId, Deal, DealId, Discount, Partner, RequestId, ResultCode, UserId};

use crate::transport::TransportError;

/// Classified partner answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerReply {
    pub code: ResultCode,
    /// Identifier the partner assigned (card token, offer id, claim id), if any.
    pub partner_reference: Option<String>,
}

impl PartnerReply {
    pub fn new(code: ResultCode) -> Self {
        Self {
            code,
            partner_reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.partner_reference = Some(reference.into());
        self
    }
}

/// Adapter-level failure. The coordinator treats every variant except
/// `NotSupported` as `ResultCode::UnknownError` for the failing partner only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PartnerError {
    #[error("{partner} does not support {operation}")]
    NotSupported {
        partner: Partner,
        operation: &'static str,
    },

    /// Every attempt timed out.
    #[error("{partner} timed out after {attempts} attempt(s)")]
    Timeout { partner: Partner, attempts: u32 },

    #[error("transport failure calling {partner}: {source}")]
    Transport {
        partner: Partner,
        #[source]
        source: TransportError,
    },

    #[error("invalid request for {partner}: {message}")]
    InvalidRequest { partner: Partner, message: String },
}

/// Generic card enrollment input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRequest {
    pub request_id: RequestId,
    pub card_id: CardId,
    pub user_id: UserId,
    pub brand: CardBrand,
    pub last_four: String,
    pub pan_token: String,
    /// Existing partner identifier (required for removal).
    pub partner_card_id: Option<String>,
}

impl CardRequest {
    pub fn for_card(request_id: RequestId, card: &Card, partner: Partner) -> Self {
        Self {
            request_id,
            card_id: card.id,
            user_id: card.user_id,
            brand: card.brand,
            last_four: card.last_four.clone(),
            pan_token: card.pan_token.clone(),
            partner_card_id: card.partner_card_id(partner).map(str::to_string),
        }
    }
}

/// Generic deal registration input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealRequest {
    pub request_id: RequestId,
    pub deal_id: DealId,
    pub merchant_name: String,
    pub discount: Discount,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl DealRequest {
    pub fn for_deal(request_id: RequestId, deal: &Deal) -> Self {
        Self {
            request_id,
            deal_id: deal.id,
            merchant_name: deal.merchant_name.clone(),
            discount: deal.discount,
            starts_at: deal.starts_at,
            ends_at: deal.ends_at,
        }
    }
}

/// Generic "claim this deal for this card" input. Both partner identifiers are known
/// because claims only go to partners holding both the card and the deal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    pub request_id: RequestId,
    pub card_id: CardId,
    pub deal_id: DealId,
    pub partner_card_id: String,
    pub partner_deal_id: String,
}

/// Per-network translation and classification.
///
/// Adapters build wire requests, call their transport (optionally through
/// `PartnerRetry`), and map the partner's code onto exactly one `ResultCode`.
/// Unsupported operations return `PartnerError::NotSupported`.
#[async_trait]
pub trait PartnerAdapter: Send + Sync {
    fn partner(&self) -> Partner;

    async fn add_card(&self, request: &CardRequest) -> Result<PartnerReply, PartnerError>;

    async fn remove_card(&self, request: &CardRequest) -> Result<PartnerReply, PartnerError>;

    async fn register_deal(&self, _request: &DealRequest) -> Result<PartnerReply, PartnerError> {
        Err(PartnerError::NotSupported {
            partner: self.partner(),
            operation: "register_deal",
        })
    }

    async fn claim_deal(&self, _request: &ClaimRequest) -> Result<PartnerReply, PartnerError> {
        Err(PartnerError::NotSupported {
            partner: self.partner(),
            operation: "claim_deal",
        })
    }
}
