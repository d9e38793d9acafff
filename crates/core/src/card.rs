//! Payment card record and its partner enrollments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{CardId, UserId};
use crate::partner::{Partner, PartnerCardInfo};

/// Card network brand, as derived from the card number at registration time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardBrand {
    Amex,
    Visa,
    MasterCard,
    Other,
}

impl CardBrand {
    /// Infer the brand from the leading digits of a card number.
    pub fn from_number(number: &str) -> Self {
        let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.starts_with("34") || digits.starts_with("37") {
            CardBrand::Amex
        } else if digits.starts_with('4') {
            CardBrand::Visa
        } else if (51..=55).contains(&prefix(&digits, 2)) || (2221..=2720).contains(&prefix(&digits, 4)) {
            CardBrand::MasterCard
        } else {
            CardBrand::Other
        }
    }
}

fn prefix(digits: &str, len: usize) -> u32 {
    digits.get(..len).and_then(|p| p.parse().ok()).unwrap_or(0)
}

/// A payment card owned by a user.
///
/// The full card number is never stored; `pan_token` is the vault token handed to
/// partners that accept tokenized enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub user_id: UserId,
    pub brand: CardBrand,
    pub last_four: String,
    pub pan_token: String,
    pub partner_cards: Vec<PartnerCardInfo>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn new(
        user_id: UserId,
        brand: CardBrand,
        last_four: impl Into<String>,
        pan_token: impl Into<String>,
    ) -> DomainResult<Self> {
        let last_four = last_four.into();
        let pan_token = pan_token.into();

        if last_four.len() != 4 || !last_four.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::validation("last_four must be exactly 4 digits"));
        }
        if pan_token.trim().is_empty() {
            return Err(DomainError::validation("pan_token cannot be empty"));
        }

        Ok(Self {
            id: CardId::new(),
            user_id,
            brand,
            last_four,
            pan_token,
            partner_cards: Vec::new(),
            active: true,
            created_at: Utc::now(),
        })
    }

    /// Partner-assigned identifier for this card, if enrolled with `partner`.
    pub fn partner_card_id(&self, partner: Partner) -> Option<&str> {
        self.partner_cards
            .iter()
            .find(|info| info.partner == partner)
            .map(|info| info.partner_card_id.as_str())
    }

    /// Record (or replace) the enrollment with `partner`.
    pub fn link_partner(&mut self, partner: Partner, partner_card_id: impl Into<String>) {
        let partner_card_id = partner_card_id.into();
        match self.partner_cards.iter_mut().find(|info| info.partner == partner) {
            Some(existing) => existing.partner_card_id = partner_card_id,
            None => self.partner_cards.push(PartnerCardInfo {
                partner,
                partner_card_id,
            }),
        }
    }

    pub fn unlink_partner(&mut self, partner: Partner) {
        self.partner_cards.retain(|info| info.partner != partner);
    }

    /// Partners this card is enrolled with, in call order.
    pub fn linked_partners(&self) -> Vec<Partner> {
        Partner::in_call_order(self.partner_cards.iter().map(|info| info.partner))
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }
}
