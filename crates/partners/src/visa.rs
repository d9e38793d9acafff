//! Visa adapter.
//!
//! Visa answers `{ success, error_code }`. Enrollment is keyed by a user key we
//! generate per enrollment; Visa assigns the card identifier.

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

pub const CARD_EXISTS: &str = "CARD_EXISTS";
pub const INVALID_CARD: &str = "INVALID_CARD";
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
pub const CARD_OWNED_BY_OTHER_USER: &str = "CARD_OWNED_BY_OTHER_USER";
pub const CARD_NOT_FOUND: &str = "CARD_NOT_FOUND";
pub const OFFER_EXISTS: &str = "OFFER_EXISTS";
pub const OFFER_ALREADY_LINKED: &str = "OFFER_ALREADY_LINKED";
pub const OFFER_NOT_FOUND: &str = "OFFER_NOT_FOUND";
pub const OFFER_EXPIRED: &str = "OFFER_EXPIRED";
pub const MERCHANT_REJECTED: &str = "MERCHANT_REJECTED";
pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
pub const REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";

/// Community all of our enrollments are made under.
pub const COMMUNITY_CODE: &str = "CARDLINK";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisaEnrollRequest {
    pub user_key: String,
    pub community_code: String,
    pub card_number_token: String,
    pub external_card_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisaUnenrollRequest {
    pub community_code: String,
    pub card_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisaOfferRequest {
    pub community_code: String,
    pub offer_key: String,
    pub merchant_name: String,
    pub active_from: DateTime<Utc>,
    pub active_until: DateTime<Utc>,
    pub discount: Discount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisaLinkRequest {
    pub card_id: String,
    pub offer_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisaResponse {
    pub success: bool,
    pub error_code: Option<String>,
    /// Card id (enrollment) or offer/link id (offer calls).
    pub resource_id: Option<String>,
}

impl VisaResponse {
    /// Effective response code: `None` when Visa reports success.
    pub fn code(&self) -> Option<&str> {
        if self.success { None } else { Some(self.error_code.as_deref().unwrap_or("")) }
    }
}

#[async_trait]
pub trait VisaTransport: Send + Sync {
    async fn enroll(&self, request: &VisaEnrollRequest) -> Result<VisaResponse, TransportError>;

    async fn unenroll(&self, request: &VisaUnenrollRequest) -> Result<VisaResponse, TransportError>;

    async fn create_offer(&self, request: &VisaOfferRequest) -> Result<VisaResponse, TransportError>;

    async fn link_offer(&self, request: &VisaLinkRequest) -> Result<VisaResponse, TransportError>;
}

pub fn is_terminal(response: &VisaResponse) -> bool {
    match response.code() {
        None => true,
        Some(code) => matches!(
            code,
            CARD_EXISTS
                | INVALID_CARD
                | INVALID_REQUEST
                | CARD_OWNED_BY_OTHER_USER
                | CARD_NOT_FOUND
                | OFFER_EXISTS
                | OFFER_ALREADY_LINKED
                | OFFER_NOT_FOUND
                | OFFER_EXPIRED
                | MERCHANT_REJECTED
        ),
    }
}

/// Classify a Visa error code. `success` is mapped by the caller, since its meaning
/// depends on the operation.
pub fn map_error_code(code: &str) -> ResultCode {
    match code {
        CARD_EXISTS => ResultCode::CardAlreadyEnrolled,
        INVALID_CARD => ResultCode::InvalidCardNumber,
        INVALID_REQUEST => ResultCode::InvalidInput,
        CARD_OWNED_BY_OTHER_USER => ResultCode::CardRegisteredToDifferentUser,
        CARD_NOT_FOUND => ResultCode::CardNotEnrolled,
        OFFER_EXISTS => ResultCode::Success,
        OFFER_ALREADY_LINKED => ResultCode::DealAlreadyClaimed,
        OFFER_NOT_FOUND => ResultCode::DealNotFound,
        OFFER_EXPIRED => ResultCode::DealExpired,
        MERCHANT_REJECTED => ResultCode::PartnerRejected,
        SERVICE_UNAVAILABLE => ResultCode::PartnerUnavailable,
        REQUEST_TIMEOUT => ResultCode::Timeout,
        _ => ResultCode::UnknownError,
    }
}

fn classify(response: &VisaResponse, on_success: ResultCode) -> ResultCode {
    match response.code() {
        None => on_success,
        Some(code) => map_error_code(code),
    }
}

pub struct VisaAdapter {
    transport: Arc<dyn VisaTransport>,
    retry: PartnerRetry,
}

impl VisaAdapter {
    pub fn new(transport: Arc<dyn VisaTransport>, policy: PartnerRetryPolicy) -> Self {
        Self {
            transport,
            retry: PartnerRetry::new(Partner::Visa, policy),
        }
    }
}

impl core::fmt::Debug for VisaAdapter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VisaAdapter")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PartnerAdapter for VisaAdapter {
    fn partner(&self) -> Partner {
        Partner::Visa
    }

    async fn add_card(&self, request: &CardRequest) -> Result<PartnerReply, PartnerError> {
        let wire = VisaEnrollRequest {
            user_key: Uuid::now_v7().to_string(),
            community_code: COMMUNITY_CODE.to_string(),
            card_number_token: request.pan_token.clone(),
            external_card_id: request.card_id.to_string(),
        };

        let response = self
            .retry
            .call("add_card", || self.transport.enroll(&wire), is_terminal)
            .await?;

        let code = classify(&response, ResultCode::Created);
        debug!(partner = %Partner::Visa, operation = "add_card", result = %code, "visa enrollment classified");

        let mut reply = PartnerReply::new(code);
        if let Some(card_id) = response.resource_id {
            if code.is_success() || code == ResultCode::CardAlreadyEnrolled {
                reply = reply.with_reference(card_id);
            }
        }
        Ok(reply)
    }

    async fn remove_card(&self, request: &CardRequest) -> Result<PartnerReply, PartnerError> {
        let card_id = request
            .partner_card_id
            .clone()
            .ok_or_else(|| PartnerError::InvalidRequest {
                partner: Partner::Visa,
                message: "card has no visa card id".to_string(),
            })?;
        let wire = VisaUnenrollRequest {
            community_code: COMMUNITY_CODE.to_string(),
            card_id,
        };

        let response = self
            .retry
            .call("remove_card", || self.transport.unenroll(&wire), is_terminal)
            .await?;

        Ok(PartnerReply::new(classify(&response, ResultCode::Success)))
    }

    async fn register_deal(&self, request: &DealRequest) -> Result<PartnerReply, PartnerError> {
        let wire = VisaOfferRequest {
            community_code: COMMUNITY_CODE.to_string(),
            offer_key: request.deal_id.to_string(),
            merchant_name: request.merchant_name.clone(),
            active_from: request.starts_at,
            active_until: request.ends_at,
            discount: request.discount,
        };

        let response = self
            .retry
            .call("register_deal", || self.transport.create_offer(&wire), is_terminal)
            .await?;

        let code = classify(&response, ResultCode::Created);
        let mut reply = PartnerReply::new(code);
        if code.is_success() {
            reply = reply.with_reference(response.resource_id.unwrap_or(wire.offer_key));
        }
        Ok(reply)
    }

    async fn claim_deal(&self, request: &ClaimRequest) -> Result<PartnerReply, PartnerError> {
        let wire = VisaLinkRequest {
            card_id: request.partner_card_id.clone(),
            offer_key: request.partner_deal_id.clone(),
        };

        let response = self
            .retry
            .call("claim_deal", || self.transport.link_offer(&wire), is_terminal)
            .await?;

        let mut reply = PartnerReply::new(classify(&response, ResultCode::Success));
        if let Some(link_id) = response.resource_id {
            reply = reply.with_reference(link_id);
        }
        Ok(reply)
    }
}
