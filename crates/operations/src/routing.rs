//! Which partners an operation is relayed to.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use cardlink_core::{CardBrand, Partner};

/// Partner routing configuration.
///
/// - `card_brands`: partners a newly added card is enrolled with, per brand
/// - `deal_partners`: partners a new deal is registered with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerRouting {
    pub card_brands: BTreeMap<CardBrand, Vec<Partner>>,
    pub deal_partners: Vec<Partner>,
}

impl Default for PartnerRouting {
    fn default() -> Self {
        let card_brands = BTreeMap::from([
            (CardBrand::Amex, vec![Partner::Amex]),
            (CardBrand::Visa, vec![Partner::Visa]),
            (CardBrand::MasterCard, vec![Partner::MasterCard]),
        ]);
        Self {
            card_brands,
            deal_partners: Partner::ALL.to_vec(),
        }
    }
}

impl PartnerRouting {
    /// Route cards of `brand` to `partners` (replacing any previous route).
    pub fn with_brand(mut self, brand: CardBrand, partners: impl IntoIterator<Item = Partner>) -> Self {
        self.card_brands.insert(brand, partners.into_iter().collect());
        self
    }

    pub fn with_deal_partners(mut self, partners: impl IntoIterator<Item = Partner>) -> Self {
        self.deal_partners = partners.into_iter().collect();
        self
    }

    /// Partners for a card brand, in call order (empty for unrouted brands).
    pub fn partners_for_brand(&self, brand: CardBrand) -> Vec<Partner> {
        self.card_brands
            .get(&brand)
            .map(|partners| Partner::in_call_order(partners.iter().copied()))
            .unwrap_or_default()
    }

    pub fn deal_partners(&self) -> Vec<Partner> {
        Partner::in_call_order(self.deal_partners.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_are_returned_in_call_order() {
        let routing = PartnerRouting::default().with_brand(CardBrand::Visa, [Partner::Visa, Partner::Amex]);
        assert_eq!(routing.partners_for_brand(CardBrand::Visa), vec![Partner::Amex, Partner::Visa]);
        assert!(routing.partners_for_brand(CardBrand::Other).is_empty());
    }

    #[test]
    fn loads_from_json() {
        let routing: PartnerRouting = serde_json::from_str(
            r#"{"card_brands": {"master_card": ["master_card", "visa"]}, "deal_partners": ["visa"]}"#,
        )
        .unwrap();
        assert_eq!(
            routing.partners_for_brand(CardBrand::MasterCard),
            vec![Partner::Visa, Partner::MasterCard]
        );
        assert_eq!(routing.deal_partners(), vec![Partner::Visa]);
    }
}
