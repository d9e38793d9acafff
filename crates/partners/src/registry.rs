//! Partner → adapter registry.
//!
//! Adapters are injected, never looked up through global state: production wiring
//! goes through `PartnerAdapters::from_transports`, tests register fakes with
//! `PartnerAdapters::with`.

use std::collections::BTreeMap;
use std::sync::Arc;

use cardlink_core::Partner;

use crate::adapter::PartnerAdapter;
use crate::amex::{AmexAdapter, AmexTransport};
use crate::mastercard::{MasterCardAdapter, MasterCardTransport};
use crate::retry::PartnerRetryPolicy;
use crate::visa::{VisaAdapter, VisaTransport};

/// One transport per partner network.
#[derive(Clone)]
pub struct PartnerTransports {
    pub amex: Arc<dyn AmexTransport>,
    pub visa: Arc<dyn VisaTransport>,
    pub master_card: Arc<dyn MasterCardTransport>,
    /// MasterCard member ICA our enrollments are filed under.
    pub master_card_ica: String,
}

#[derive(Clone, Default)]
pub struct PartnerAdapters {
    adapters: BTreeMap<Partner, Arc<dyn PartnerAdapter>>,
}

impl PartnerAdapters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one adapter per partner from the given transports.
    pub fn from_transports(transports: PartnerTransports, policy: PartnerRetryPolicy) -> Self {
        let mut registry = Self::new();
        for partner in Partner::ALL {
            let adapter: Arc<dyn PartnerAdapter> = match partner {
                Partner::Amex => Arc::new(AmexAdapter::new(transports.amex.clone(), policy.clone())),
                Partner::Visa => Arc::new(VisaAdapter::new(transports.visa.clone(), policy.clone())),
                Partner::MasterCard => Arc::new(MasterCardAdapter::new(
                    transports.master_card.clone(),
                    policy.clone(),
                    transports.master_card_ica.clone(),
                )),
            };
            registry.adapters.insert(partner, adapter);
        }
        registry
    }

    /// Register (or replace) the adapter for `adapter.partner()`.
    pub fn with(mut self, adapter: Arc<dyn PartnerAdapter>) -> Self {
        self.adapters.insert(adapter.partner(), adapter);
        self
    }

    pub fn get(&self, partner: Partner) -> Option<&Arc<dyn PartnerAdapter>> {
        self.adapters.get(&partner)
    }

    pub fn partners(&self) -> Vec<Partner> {
        self.adapters.keys().copied().collect()
    }
}

impl core::fmt::Debug for PartnerAdapters {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PartnerAdapters")
            .field("partners", &self.partners())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::adapter::{CardRequest, PartnerError, PartnerReply};
    use cardlink_core::ResultCode;

    struct Fixed(Partner);

    #[async_trait]
    impl PartnerAdapter for Fixed {
        fn partner(&self) -> Partner {
            self.0
        }
        async fn add_card(&self, _: &CardRequest) -> Result<PartnerReply, PartnerError> {
            Ok(PartnerReply::new(ResultCode::Created))
        }
        async fn remove_card(&self, _: &CardRequest) -> Result<PartnerReply, PartnerError> {
            Ok(PartnerReply::new(ResultCode::Success))
        }
    }

    #[test]
    fn registers_by_adapter_partner() {
        let registry = PartnerAdapters::new()
            .with(Arc::new(Fixed(Partner::Visa)))
            .with(Arc::new(Fixed(Partner::Amex)));

        assert_eq!(registry.partners(), vec![Partner::Amex, Partner::Visa]);
        assert!(registry.get(Partner::MasterCard).is_none());
        assert_eq!(registry.get(Partner::Visa).map(|a| a.partner()), Some(Partner::Visa));
    }
}
