//! Merchant deals and their partner registrations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::DealId;
use crate::partner::{Partner, PartnerDealInfo};

/// What the card holder gets when the deal is redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// Percentage off the settled amount (1..=100).
    Percent(u8),
    /// Fixed amount off, in minor currency units.
    Amount(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub merchant_name: String,
    pub discount: Discount,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub partner_deals: Vec<PartnerDealInfo>,
}

impl Deal {
    pub fn new(
        merchant_name: impl Into<String>,
        discount: Discount,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let merchant_name = merchant_name.into();
        if merchant_name.trim().is_empty() {
            return Err(DomainError::validation("merchant_name cannot be empty"));
        }
        if ends_at <= starts_at {
            return Err(DomainError::validation("deal must end after it starts"));
        }
        match discount {
            Discount::Percent(p) if p == 0 || p > 100 => {
                return Err(DomainError::validation("percent discount must be in 1..=100"));
            }
            Discount::Amount(a) if a <= 0 => {
                return Err(DomainError::validation("amount discount must be positive"));
            }
            _ => {}
        }

        Ok(Self {
            id: DealId::new(),
            merchant_name,
            discount,
            starts_at,
            ends_at,
            partner_deals: Vec::new(),
        })
    }

    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.starts_at <= at && at < self.ends_at
    }

    pub fn partner_deal_id(&self, partner: Partner) -> Option<&str> {
        self.partner_deals
            .iter()
            .find(|info| info.partner == partner)
            .map(|info| info.partner_deal_id.as_str())
    }

    /// Record (or replace) the registration with `partner`.
    pub fn register_partner(&mut self, partner: Partner, partner_deal_id: impl Into<String>) {
        let partner_deal_id = partner_deal_id.into();
        match self.partner_deals.iter_mut().find(|info| info.partner == partner) {
            Some(existing) => existing.partner_deal_id = partner_deal_id,
            None => self.partner_deals.push(PartnerDealInfo {
                partner,
                partner_deal_id,
            }),
        }
    }

    /// Partners this deal is registered with, in call order.
    pub fn registered_partners(&self) -> Vec<Partner> {
        Partner::in_call_order(self.partner_deals.iter().map(|info| info.partner))
    }
}
