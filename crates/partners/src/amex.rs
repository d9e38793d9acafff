//! American Express adapter.
//!
//! Amex enrolls cards against a token we propose (`card_token`) and answers with
//! `RC*` response codes. On a duplicate enrollment Amex echoes the token it already
//! holds, which is treated as a successful link.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use cardlink_core::{Discount, Partner, ResultCode};

use crate::adapter::{CardRequest, ClaimRequest, DealRequest, PartnerAdapter, PartnerError, PartnerReply};
use crate::retry::{PartnerRetry, PartnerRetryPolicy};
use crate::transport::TransportError;

pub const SUCCESS: &str = "RCCMP000";
pub const INVALID_CARD_NUMBER: &str = "RCCMU002";
pub const CARD_EXISTS: &str = "RCCMU003";
pub const CARD_OWNED_ELSEWHERE: &str = "RCCMU004";
pub const CARD_NOT_FOUND: &str = "RCCMU005";
pub const INVALID_REQUEST: &str = "RCCMU001";
pub const SYSTEM_UNAVAILABLE: &str = "RCCMP020";
pub const SYSTEM_TIMEOUT: &str = "RCCMP030";

pub const OFFER_CREATED: &str = "RCOFR000";
pub const OFFER_INVALID: &str = "RCOFR001";
pub const OFFER_EXISTS: &str = "RCOFR002";

pub const CLAIM_SUCCESS: &str = "RCCLM000";
pub const CLAIM_DUPLICATE: &str = "RCCLM001";
pub const CLAIM_OFFER_NOT_FOUND: &str = "RCCLM002";
pub const CLAIM_OFFER_EXPIRED: &str = "RCCLM003";

/// Card sync wire request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmexCardSyncRequest {
    /// Token we propose; Amex keeps it as the card's identifier on their side.
    pub card_token: String,
    pub card_number_token: String,
    pub action: AmexCardAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AmexCardAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmexOfferRequest {
    pub offer_id: String,
    pub merchant_name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub discount_percent: Option<u8>,
    pub discount_amount: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmexClaimRequest {
    pub card_token: String,
    pub offer_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmexResponse {
    pub response_code: String,
    pub response_message: Option<String>,
    /// Card token (card calls) or offer id (offer calls) held by Amex.
    pub token: Option<String>,
}

/// Amex client (HTTP in production; fakes in tests).
#[async_trait]
pub trait AmexTransport: Send + Sync {
    async fn sync_card(&self, request: &AmexCardSyncRequest) -> Result<AmexResponse, TransportError>;

    async fn create_offer(&self, request: &AmexOfferRequest) -> Result<AmexResponse, TransportError>;

    async fn claim_offer(&self, request: &AmexClaimRequest) -> Result<AmexResponse, TransportError>;
}

/// Codes that end the retry loop.
pub fn is_terminal(code: &str) -> bool {
    matches!(
        code,
        SUCCESS
            | INVALID_REQUEST
            | INVALID_CARD_NUMBER
            | CARD_EXISTS
            | CARD_OWNED_ELSEWHERE
            | CARD_NOT_FOUND
            | OFFER_CREATED
            | OFFER_INVALID
            | OFFER_EXISTS
            | CLAIM_SUCCESS
            | CLAIM_DUPLICATE
            | CLAIM_OFFER_NOT_FOUND
            | CLAIM_OFFER_EXPIRED
    )
}

/// Map a card sync response code for the given action.
pub fn map_card_code(action: AmexCardAction, code: &str) -> ResultCode {
    match (action, code) {
        (AmexCardAction::Add, SUCCESS) => ResultCode::Created,
        (AmexCardAction::Remove, SUCCESS) => ResultCode::Success,
        (_, INVALID_REQUEST) => ResultCode::InvalidInput,
        (_, INVALID_CARD_NUMBER) => ResultCode::InvalidCardNumber,
        (_, CARD_EXISTS) => ResultCode::CardAlreadyEnrolled,
        (_, CARD_OWNED_ELSEWHERE) => ResultCode::CardRegisteredToDifferentUser,
        (_, CARD_NOT_FOUND) => ResultCode::CardNotEnrolled,
        (_, SYSTEM_UNAVAILABLE) => ResultCode::PartnerUnavailable,
        (_, SYSTEM_TIMEOUT) => ResultCode::Timeout,
        _ => ResultCode::UnknownError,
    }
}

pub fn map_offer_code(code: &str) -> ResultCode {
    match code {
        OFFER_CREATED => ResultCode::Created,
        OFFER_EXISTS => ResultCode::Success,
        OFFER_INVALID => ResultCode::InvalidInput,
        SYSTEM_UNAVAILABLE => ResultCode::PartnerUnavailable,
        SYSTEM_TIMEOUT => ResultCode::Timeout,
        _ => ResultCode::UnknownError,
    }
}

pub fn map_claim_code(code: &str) -> ResultCode {
    match code {
        CLAIM_SUCCESS => ResultCode::Success,
        CLAIM_DUPLICATE => ResultCode::DealAlreadyClaimed,
        CLAIM_OFFER_NOT_FOUND => ResultCode::DealNotFound,
        CLAIM_OFFER_EXPIRED => ResultCode::DealExpired,
        SYSTEM_UNAVAILABLE => ResultCode::PartnerUnavailable,
        SYSTEM_TIMEOUT => ResultCode::Timeout,
        _ => ResultCode::UnknownError,
    }
}

pub struct AmexAdapter {
    transport: Arc<dyn AmexTransport>,
    retry: PartnerRetry,
}

impl AmexAdapter {
    pub fn new(transport: Arc<dyn AmexTransport>, policy: PartnerRetryPolicy) -> Self {
        Self {
            transport,
            retry: PartnerRetry::new(Partner::Amex, policy),
        }
    }

    async fn sync_card(
        &self,
        operation: &'static str,
        request: AmexCardSyncRequest,
    ) -> Result<PartnerReply, PartnerError> {
        let response = self
            .retry
            .call(
                operation,
                || self.transport.sync_card(&request),
                |resp| is_terminal(&resp.response_code),
            )
            .await?;

        let code = map_card_code(request.action, &response.response_code);
        debug!(
            partner = %Partner::Amex,
            operation,
            response_code = %response.response_code,
            result = %code,
            "amex card sync classified"
        );

        let mut reply = PartnerReply::new(code);
        if code.is_success() || code == ResultCode::CardAlreadyEnrolled {
            // Amex returns the token it holds; fall back to the one we proposed.
            reply = reply.with_reference(response.token.unwrap_or(request.card_token));
        }
        Ok(reply)
    }
}

impl core::fmt::Debug for AmexAdapter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AmexAdapter")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PartnerAdapter for AmexAdapter {
    fn partner(&self) -> Partner {
        Partner::Amex
    }

    async fn add_card(&self, request: &CardRequest) -> Result<PartnerReply, PartnerError> {
        let wire = AmexCardSyncRequest {
            card_token: Uuid::now_v7().simple().to_string(),
            card_number_token: request.pan_token.clone(),
            action: AmexCardAction::Add,
        };
        self.sync_card("add_card", wire).await
    }

    async fn remove_card(&self, request: &CardRequest) -> Result<PartnerReply, PartnerError> {
        let card_token = request
            .partner_card_id
            .clone()
            .ok_or_else(|| PartnerError::InvalidRequest {
                partner: Partner::Amex,
                message: "card has no amex token".to_string(),
            })?;
        let wire = AmexCardSyncRequest {
            card_token,
            card_number_token: request.pan_token.clone(),
            action: AmexCardAction::Remove,
        };
        self.sync_card("remove_card", wire).await
    }

    async fn register_deal(&self, request: &DealRequest) -> Result<PartnerReply, PartnerError> {
        let (discount_percent, discount_amount) = match request.discount {
            Discount::Percent(p) => (Some(p), None),
            Discount::Amount(a) => (None, Some(a)),
        };
        let wire = AmexOfferRequest {
            offer_id: request.deal_id.as_uuid().simple().to_string(),
            merchant_name: request.merchant_name.clone(),
            start_date: request.starts_at,
            end_date: request.ends_at,
            discount_percent,
            discount_amount,
        };

        let response = self
            .retry
            .call(
                "register_deal",
                || self.transport.create_offer(&wire),
                |resp| is_terminal(&resp.response_code),
            )
            .await?;

        let code = map_offer_code(&response.response_code);
        let mut reply = PartnerReply::new(code);
        if code.is_success() {
            reply = reply.with_reference(response.token.unwrap_or(wire.offer_id));
        }
        Ok(reply)
    }

    async fn claim_deal(&self, request: &ClaimRequest) -> Result<PartnerReply, PartnerError> {
        let wire = AmexClaimRequest {
            card_token: request.partner_card_id.clone(),
            offer_id: request.partner_deal_id.clone(),
        };

        let response = self
            .retry
            .call(
                "claim_deal",
                || self.transport.claim_offer(&wire),
                |resp| is_terminal(&resp.response_code),
            )
            .await?;

        let mut reply = PartnerReply::new(map_claim_code(&response.response_code));
        if let Some(token) = response.token {
            reply = reply.with_reference(token);
        }
        Ok(reply)
    }
}
