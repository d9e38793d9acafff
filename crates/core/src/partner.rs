//! Payment-network partners and the per-partner association records.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// External payment network a card or deal may be associated with.
///
/// The declaration order is the call order: partners are always invoked in
/// `Partner::ALL` order so outcome reduction is reproducible.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partner {
    Amex,
    Visa,
    MasterCard,
}

impl Partner {
    /// Every partner, in call order.
    pub const ALL: [Partner; 3] = [Partner::Amex, Partner::Visa, Partner::MasterCard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Partner::Amex => "amex",
            Partner::Visa => "visa",
            Partner::MasterCard => "master_card",
        }
    }

    /// Sort and dedup an arbitrary partner set into call order.
    pub fn in_call_order(partners: impl IntoIterator<Item = Partner>) -> Vec<Partner> {
        let mut ordered: Vec<Partner> = partners.into_iter().collect();
        ordered.sort();
        ordered.dedup();
        ordered
    }
}

impl core::fmt::Display for Partner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Partner {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "amex" => Ok(Partner::Amex),
            "visa" => Ok(Partner::Visa),
            "master_card" | "mastercard" => Ok(Partner::MasterCard),
            other => Err(DomainError::invalid_id(format!("Partner: {other}"))),
        }
    }
}

/// A card's enrollment with one partner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerCardInfo {
    pub partner: Partner,
    /// Identifier/token the partner uses for the card.
    pub partner_card_id: String,
}

/// A deal's registration with one partner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerDealInfo {
    pub partner: Partner,
    /// Offer identifier assigned by (or proposed to) the partner.
    pub partner_deal_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_order_is_declaration_order() {
        let ordered = Partner::in_call_order([Partner::MasterCard, Partner::Amex, Partner::MasterCard]);
        assert_eq!(ordered, vec![Partner::Amex, Partner::MasterCard]);
    }

    #[test]
    fn parses_both_mastercard_spellings() {
        assert_eq!("MasterCard".parse::<Partner>().unwrap(), Partner::MasterCard);
        assert_eq!("master_card".parse::<Partner>().unwrap(), Partner::MasterCard);
        assert!("discover".parse::<Partner>().is_err());
    }
}
