//! Card / deal / claim record stores.
//!
//! Durable persistence lives outside this workspace; these traits are the boundary
//! the coordinator's concluder and the claim jobs consume. The in-memory
//! implementations back tests and local runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cardlink_core::{Card, CardId, Deal, DealId, Partner, ResultCode};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
}

fn poisoned() -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

/// Outcome of claiming one deal for one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub card_id: CardId,
    pub deal_id: DealId,
    pub outcome: ResultCode,
    pub partner_references: BTreeMap<Partner, String>,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait CardStore: Send + Sync {
    async fn get(&self, card_id: CardId) -> Result<Option<Card>, StoreError>;

    async fn save(&self, card: &Card) -> Result<(), StoreError>;

    async fn list_active(&self) -> Result<Vec<Card>, StoreError>;
}

#[async_trait]
pub trait DealStore: Send + Sync {
    async fn get(&self, deal_id: DealId) -> Result<Option<Deal>, StoreError>;

    async fn save(&self, deal: &Deal) -> Result<(), StoreError>;

    /// Deals whose window contains `at`.
    async fn list_active(&self, at: DateTime<Utc>) -> Result<Vec<Deal>, StoreError>;
}

#[async_trait]
pub trait ClaimStore: Send + Sync {
    async fn get(&self, card_id: CardId, deal_id: DealId) -> Result<Option<ClaimRecord>, StoreError>;

    /// Insert or replace the record for `(card_id, deal_id)`.
    async fn record(&self, record: ClaimRecord) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCardStore {
    cards: RwLock<HashMap<CardId, Card>>,
}

impl InMemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl CardStore for InMemoryCardStore {
    async fn get(&self, card_id: CardId) -> Result<Option<Card>, StoreError> {
        let cards = self.cards.read().map_err(|_| poisoned())?;
        Ok(cards.get(&card_id).cloned())
    }

    async fn save(&self, card: &Card) -> Result<(), StoreError> {
        let mut cards = self.cards.write().map_err(|_| poisoned())?;
        cards.insert(card.id, card.clone());
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<Card>, StoreError> {
        let cards = self.cards.read().map_err(|_| poisoned())?;
        let mut active: Vec<Card> = cards.values().filter(|c| c.active).cloned().collect();
        active.sort_by_key(|c| c.id);
        Ok(active)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDealStore {
    deals: RwLock<HashMap<DealId, Deal>>,
}

impl InMemoryDealStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl DealStore for InMemoryDealStore {
    async fn get(&self, deal_id: DealId) -> Result<Option<Deal>, StoreError> {
        let deals = self.deals.read().map_err(|_| poisoned())?;
        Ok(deals.get(&deal_id).cloned())
    }

    async fn save(&self, deal: &Deal) -> Result<(), StoreError> {
        let mut deals = self.deals.write().map_err(|_| poisoned())?;
        deals.insert(deal.id, deal.clone());
        Ok(())
    }

    async fn list_active(&self, at: DateTime<Utc>) -> Result<Vec<Deal>, StoreError> {
        let deals = self.deals.read().map_err(|_| poisoned())?;
        let mut active: Vec<Deal> = deals.values().filter(|d| d.is_active_at(at)).cloned().collect();
        active.sort_by_key(|d| d.id);
        Ok(active)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryClaimStore {
    claims: RwLock<HashMap<(CardId, DealId), ClaimRecord>>,
}

impl InMemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn all(&self) -> Vec<ClaimRecord> {
        match self.claims.read() {
            Ok(claims) => claims.values().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl ClaimStore for InMemoryClaimStore {
    async fn get(&self, card_id: CardId, deal_id: DealId) -> Result<Option<ClaimRecord>, StoreError> {
        let claims = self.claims.read().map_err(|_| poisoned())?;
        Ok(claims.get(&(card_id, deal_id)).cloned())
    }

    async fn record(&self, record: ClaimRecord) -> Result<(), StoreError> {
        let mut claims = self.claims.write().map_err(|_| poisoned())?;
        claims.insert((record.card_id, record.deal_id), record);
        Ok(())
    }
}
