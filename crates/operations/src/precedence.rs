//! Outcome precedence tables.
//!
//! Partner outcomes are folded in call order. For each partner code the table's rule
//! either overwrites the running outcome ("last write wins") or keeps it, and says
//! whether the partner's linkage side effect is recorded on the subject. Codes
//! without a rule overwrite the running outcome with themselves.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use cardlink_core::ResultCode;

use crate::context::OperationKind;

/// What a partner code does to the running outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecedenceRule {
    /// New running outcome; `None` keeps the current one.
    pub set: Option<ResultCode>,
    /// Record the partner linkage (token, registration, claim) on the subject.
    #[serde(default)]
    pub link: bool,
}

impl PrecedenceRule {
    pub fn set(code: ResultCode) -> Self {
        Self { set: Some(code), link: false }
    }

    pub fn set_and_link(code: ResultCode) -> Self {
        Self { set: Some(code), link: true }
    }

    pub fn keep() -> Self {
        Self { set: None, link: false }
    }

    pub fn keep_and_link() -> Self {
        Self { set: None, link: true }
    }
}

/// Reduction table for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecedenceTable {
    /// Running outcome before any partner answered.
    pub initial: ResultCode,
    /// Outcome when no partner applies to the subject.
    pub no_partners: ResultCode,
    #[serde(default)]
    pub rules: BTreeMap<ResultCode, PrecedenceRule>,
}

impl PrecedenceTable {
    pub fn new(initial: ResultCode, no_partners: ResultCode) -> Self {
        Self {
            initial,
            no_partners,
            rules: BTreeMap::new(),
        }
    }

    pub fn with_rule(mut self, code: ResultCode, rule: PrecedenceRule) -> Self {
        self.rules.insert(code, rule);
        self
    }

    pub fn rule(&self, code: ResultCode) -> PrecedenceRule {
        self.rules.get(&code).copied().unwrap_or(PrecedenceRule::set(code))
    }

    /// One reduction step: the running outcome after a partner answered `code`.
    pub fn apply(&self, running: ResultCode, code: ResultCode) -> ResultCode {
        self.rule(code).set.unwrap_or(running)
    }

    /// Fold partner codes (in call order) into an overall outcome. Pure.
    pub fn reduce(&self, codes: impl IntoIterator<Item = ResultCode>) -> ResultCode {
        let mut codes = codes.into_iter().peekable();
        if codes.peek().is_none() {
            return self.no_partners;
        }
        codes.fold(self.initial, |running, code| self.apply(running, code))
    }

    pub fn add_card() -> Self {
        Self::new(ResultCode::OperationNotSupported, ResultCode::UnsupportedCardBrand)
            .with_rule(ResultCode::Created, PrecedenceRule::set_and_link(ResultCode::Created))
            .with_rule(ResultCode::Success, PrecedenceRule::set_and_link(ResultCode::Success))
            // The partner already holds the card: the link exists, report it as created.
            .with_rule(ResultCode::CardAlreadyEnrolled, PrecedenceRule::set_and_link(ResultCode::Created))
            .with_rule(ResultCode::OperationNotSupported, PrecedenceRule::keep())
    }

    pub fn remove_card() -> Self {
        Self::new(ResultCode::Success, ResultCode::Success)
            .with_rule(ResultCode::Success, PrecedenceRule::set_and_link(ResultCode::Success))
            // Already gone on the partner side: drop our association too.
            .with_rule(ResultCode::CardNotEnrolled, PrecedenceRule::keep_and_link())
            .with_rule(ResultCode::OperationNotSupported, PrecedenceRule::keep())
    }

    pub fn register_deal() -> Self {
        Self::new(ResultCode::OperationNotSupported, ResultCode::OperationNotSupported)
            .with_rule(ResultCode::Created, PrecedenceRule::set_and_link(ResultCode::Created))
            .with_rule(ResultCode::Success, PrecedenceRule::set_and_link(ResultCode::Success))
            .with_rule(ResultCode::OperationNotSupported, PrecedenceRule::keep())
    }

    pub fn claim_deal() -> Self {
        Self::new(ResultCode::OperationNotSupported, ResultCode::OperationNotSupported)
            .with_rule(ResultCode::Success, PrecedenceRule::set_and_link(ResultCode::Success))
            .with_rule(ResultCode::DealAlreadyClaimed, PrecedenceRule::set_and_link(ResultCode::Success))
            .with_rule(ResultCode::OperationNotSupported, PrecedenceRule::keep())
    }
}

/// One table per operation; externally configurable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecedenceTables {
    pub add_card: PrecedenceTable,
    pub remove_card: PrecedenceTable,
    pub register_deal: PrecedenceTable,
    pub claim_deal: PrecedenceTable,
}

impl Default for PrecedenceTables {
    fn default() -> Self {
        Self {
            add_card: PrecedenceTable::add_card(),
            remove_card: PrecedenceTable::remove_card(),
            register_deal: PrecedenceTable::register_deal(),
            claim_deal: PrecedenceTable::claim_deal(),
        }
    }
}

impl PrecedenceTables {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn for_operation(&self, operation: OperationKind) -> &PrecedenceTable {
        match operation {
            OperationKind::AddCard => &self.add_card,
            OperationKind::RemoveCard => &self.remove_card,
            OperationKind::RegisterDeal => &self.register_deal,
            OperationKind::ClaimDeal => &self.claim_deal,
        }
    }
}
