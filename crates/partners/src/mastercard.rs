//! MasterCard adapter.
//!
//! MasterCard uses two-digit response codes. We propose the enrollment reference
//! (`bank_customer_number`) and MasterCard keeps it as the card's identifier.
//! Offers are provisioned out of band, so deal registration is not supported.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cardlink_core::{Partner, ResultCode};

use crate::adapter::{CardRequest, ClaimRequest, PartnerAdapter, PartnerError, PartnerReply};
use crate::retry::{PartnerRetry, PartnerRetryPolicy};
use crate::transport::TransportError;

pub const APPROVED: &str = "00";
pub const INVALID_CARD_NUMBER: &str = "14";
pub const INVALID_FORMAT: &str = "30";
pub const ALREADY_ENROLLED: &str = "21";
pub const NOT_ENROLLED: &str = "25";
pub const CLAIM_EXISTS: &str = "40";
pub const OFFER_UNKNOWN: &str = "41";
pub const OFFER_ENDED: &str = "42";
pub const RULE_VIOLATION: &str = "57";
pub const TIMEOUT: &str = "68";
pub const SYSTEM_UNAVAILABLE: &str = "91";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterCardEnrollment {
    pub bank_customer_number: String,
    pub card_number_token: String,
    pub member_ica: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterCardOfferClaim {
    pub bank_customer_number: String,
    pub offer_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterCardResponse {
    pub response_code: String,
    pub reference: Option<String>,
}

#[async_trait]
pub trait MasterCardTransport: Send + Sync {
    async fn enroll(&self, request: &MasterCardEnrollment) -> Result<MasterCardResponse, TransportError>;

    async fn cancel(&self, request: &MasterCardEnrollment) -> Result<MasterCardResponse, TransportError>;

    async fn claim(&self, request: &MasterCardOfferClaim) -> Result<MasterCardResponse, TransportError>;
}

pub fn is_terminal(code: &str) -> bool {
    matches!(
        code,
        APPROVED
            | INVALID_CARD_NUMBER
            | INVALID_FORMAT
            | ALREADY_ENROLLED
            | NOT_ENROLLED
            | CLAIM_EXISTS
            | OFFER_UNKNOWN
            | OFFER_ENDED
            | RULE_VIOLATION
    )
}

/// Map a response code; `approved` is the outcome for `00` in the calling operation.
pub fn map_code(code: &str, approved: ResultCode) -> ResultCode {
    match code {
        APPROVED => approved,
        INVALID_CARD_NUMBER => ResultCode::InvalidCardNumber,
        INVALID_FORMAT => ResultCode::InvalidInput,
        ALREADY_ENROLLED => ResultCode::CardAlreadyEnrolled,
        NOT_ENROLLED => ResultCode::CardNotEnrolled,
        CLAIM_EXISTS => ResultCode::DealAlreadyClaimed,
        OFFER_UNKNOWN => ResultCode::DealNotFound,
        OFFER_ENDED => ResultCode::DealExpired,
        RULE_VIOLATION => ResultCode::PartnerRejected,
        TIMEOUT => ResultCode::Timeout,
        SYSTEM_UNAVAILABLE => ResultCode::PartnerUnavailable,
        _ => ResultCode::UnknownError,
    }
}

pub struct MasterCardAdapter {
    transport: Arc<dyn MasterCardTransport>,
    retry: PartnerRetry,
    member_ica: String,
}

impl MasterCardAdapter {
    pub fn new(transport: Arc<dyn MasterCardTransport>, policy: PartnerRetryPolicy, member_ica: impl Into<String>) -> Self {
        Self {
            transport,
            retry: PartnerRetry::new(Partner::MasterCard, policy),
            member_ica: member_ica.into(),
        }
    }
}

impl core::fmt::Debug for MasterCardAdapter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MasterCardAdapter")
            .field("retry", &self.retry)
            .field("member_ica", &self.member_ica)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PartnerAdapter for MasterCardAdapter {
    fn partner(&self) -> Partner {
        Partner::MasterCard
    }

    async fn add_card(&self, request: &CardRequest) -> Result<PartnerReply, PartnerError> {
        let wire = MasterCardEnrollment {
            bank_customer_number: Uuid::now_v7().simple().to_string(),
            card_number_token: request.pan_token.clone(),
            member_ica: self.member_ica.clone(),
        };

        let response = self
            .retry
            .call("add_card", || self.transport.enroll(&wire), |r| is_terminal(&r.response_code))
            .await?;

        let code = map_code(&response.response_code, ResultCode::Created);
        let mut reply = PartnerReply::new(code);
        if code.is_success() || code == ResultCode::CardAlreadyEnrolled {
            reply = reply.with_reference(response.reference.unwrap_or(wire.bank_customer_number));
        }
        Ok(reply)
    }

    async fn remove_card(&self, request: &CardRequest) -> Result<PartnerReply, PartnerError> {
        let bank_customer_number =
            request
                .partner_card_id
                .clone()
                .ok_or_else(|| PartnerError::InvalidRequest {
                    partner: Partner::MasterCard,
                    message: "card has no mastercard enrollment reference".to_string(),
                })?;
        let wire = MasterCardEnrollment {
            bank_customer_number,
            card_number_token: request.pan_token.clone(),
            member_ica: self.member_ica.clone(),
        };

        let response = self
            .retry
            .call("remove_card", || self.transport.cancel(&wire), |r| is_terminal(&r.response_code))
            .await?;

        Ok(PartnerReply::new(map_code(&response.response_code, ResultCode::Success)))
    }

    async fn claim_deal(&self, request: &ClaimRequest) -> Result<PartnerReply, PartnerError> {
        let wire = MasterCardOfferClaim {
            bank_customer_number: request.partner_card_id.clone(),
            offer_id: request.partner_deal_id.clone(),
        };

        let response = self
            .retry
            .call("claim_deal", || self.transport.claim(&wire), |r| is_terminal(&r.response_code))
            .await?;

        let mut reply = PartnerReply::new(map_code(&response.response_code, ResultCode::Success));
        if let Some(reference) = response.reference {
            reply = reply.with_reference(reference);
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardlink_core::{DealId, Discount, RequestId};
    use chrono::{Duration, Utc};

    use crate::adapter::DealRequest;

    struct Unreachable;

    #[async_trait]
    impl MasterCardTransport for Unreachable {
        async fn enroll(&self, _: &MasterCardEnrollment) -> Result<MasterCardResponse, TransportError> {
            Err(TransportError::Timeout)
        }
        async fn cancel(&self, _: &MasterCardEnrollment) -> Result<MasterCardResponse, TransportError> {
            Err(TransportError::Timeout)
        }
        async fn claim(&self, _: &MasterCardOfferClaim) -> Result<MasterCardResponse, TransportError> {
            Err(TransportError::Timeout)
        }
    }

    #[test]
    fn approved_depends_on_operation() {
        assert_eq!(map_code(APPROVED, ResultCode::Created), ResultCode::Created);
        assert_eq!(map_code(APPROVED, ResultCode::Success), ResultCode::Success);
        assert_eq!(map_code(ALREADY_ENROLLED, ResultCode::Created), ResultCode::CardAlreadyEnrolled);
        assert_eq!(map_code("99", ResultCode::Created), ResultCode::UnknownError);
        assert!(!is_terminal(SYSTEM_UNAVAILABLE));
        assert!(!is_terminal(TIMEOUT));
    }

    #[tokio::test]
    async fn register_deal_is_not_supported() {
        let adapter = MasterCardAdapter::new(Arc::new(Unreachable), PartnerRetryPolicy::no_retry(), "1234");
        let now = Utc::now();
        let err = adapter
            .register_deal(&DealRequest {
                request_id: RequestId::new(),
                deal_id: DealId::new(),
                merchant_name: "Cafe".into(),
                discount: Discount::Percent(10),
                starts_at: now,
                ends_at: now + Duration::days(7),
            })
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PartnerError::NotSupported {
                partner: Partner::MasterCard,
                operation: "register_deal",
            }
        );
    }
}
