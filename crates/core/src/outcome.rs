//! Canonical outcome codes.
//!
//! Every partner response, whatever its wire format, is classified into exactly one
//! `ResultCode`. Adapters that cannot classify a response use `UnknownError`.

use serde::{Deserialize, Serialize};

/// Partner-agnostic result of an operation step.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    /// "No outcome produced" sentinel. Never a legal adapter result.
    None,
    Success,
    Created,
    InvalidInput,
    InvalidCardNumber,
    /// The partner already has the card enrolled (duplicate enrollment).
    CardAlreadyEnrolled,
    CardRegisteredToDifferentUser,
    CardNotEnrolled,
    DealNotFound,
    DealAlreadyClaimed,
    DealExpired,
    /// Business-rule rejection not covered by a more specific code.
    PartnerRejected,
    OperationNotSupported,
    UnsupportedCardBrand,
    Timeout,
    PartnerUnavailable,
    UnknownError,
}

impl ResultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::None => "none",
            ResultCode::Success => "success",
            ResultCode::Created => "created",
            ResultCode::InvalidInput => "invalid_input",
            ResultCode::InvalidCardNumber => "invalid_card_number",
            ResultCode::CardAlreadyEnrolled => "card_already_enrolled",
            ResultCode::CardRegisteredToDifferentUser => "card_registered_to_different_user",
            ResultCode::CardNotEnrolled => "card_not_enrolled",
            ResultCode::DealNotFound => "deal_not_found",
            ResultCode::DealAlreadyClaimed => "deal_already_claimed",
            ResultCode::DealExpired => "deal_expired",
            ResultCode::PartnerRejected => "partner_rejected",
            ResultCode::OperationNotSupported => "operation_not_supported",
            ResultCode::UnsupportedCardBrand => "unsupported_card_brand",
            ResultCode::Timeout => "timeout",
            ResultCode::PartnerUnavailable => "partner_unavailable",
            ResultCode::UnknownError => "unknown_error",
        }
    }

    /// `Success` or `Created`.
    pub fn is_success(&self) -> bool {
        matches!(self, ResultCode::Success | ResultCode::Created)
    }

    /// Failures that may clear up on their own (worth another attempt later).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ResultCode::Timeout | ResultCode::PartnerUnavailable | ResultCode::UnknownError
        )
    }
}

impl core::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_name_matches_as_str() {
        let json = serde_json::to_string(&ResultCode::CardAlreadyEnrolled).unwrap();
        assert_eq!(json, "\"card_already_enrolled\"");
        let back: ResultCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ResultCode::CardAlreadyEnrolled);
    }

    #[test]
    fn created_counts_as_success() {
        assert!(ResultCode::Created.is_success());
        assert!(!ResultCode::CardAlreadyEnrolled.is_success());
        assert!(ResultCode::Timeout.is_transient());
        assert!(!ResultCode::InvalidInput.is_transient());
    }
}
