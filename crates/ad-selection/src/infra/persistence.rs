//! Storage seams: the buyer groups that participate in auctions and the
//! results of finished auctions.

use {
    crate::domain::{
        audience::{AdTechIdentifier, BuyerGroup},
        selection::result::{AuctionId, AuctionResult},
    },
    rand::Rng,
    std::{
        collections::HashMap,
        sync::{Mutex, MutexGuard},
    },
};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AudienceStore: Send + Sync {
    /// All stored groups of the given buyers.
    async fn groups(&self, buyers: &[AdTechIdentifier]) -> anyhow::Result<Vec<BuyerGroup>>;
}

#[derive(Debug, Default)]
pub struct InMemoryAudiences(Vec<BuyerGroup>);

impl InMemoryAudiences {
    pub fn new(groups: Vec<BuyerGroup>) -> Self {
        Self(groups)
    }
}

#[async_trait::async_trait]
impl AudienceStore for InMemoryAudiences {
    async fn groups(&self, buyers: &[AdTechIdentifier]) -> anyhow::Result<Vec<BuyerGroup>> {
        Ok(self
            .0
            .iter()
            .filter(|group| buyers.contains(&group.buyer))
            .cloned()
            .collect())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Persistence: Send + Sync {
    async fn exists(&self, id: AuctionId) -> anyhow::Result<bool>;
    /// Stores a result. Fails if a result with the same id already exists.
    async fn insert(&self, result: &AuctionResult) -> anyhow::Result<()>;
    async fn get(&self, id: AuctionId) -> anyhow::Result<Option<AuctionResult>>;
}

#[derive(Debug, Default)]
pub struct InMemoryPersistence(Mutex<HashMap<AuctionId, AuctionResult>>);

impl InMemoryPersistence {
    fn results(&self) -> MutexGuard<'_, HashMap<AuctionId, AuctionResult>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl Persistence for InMemoryPersistence {
    async fn exists(&self, id: AuctionId) -> anyhow::Result<bool> {
        Ok(self.results().contains_key(&id))
    }

    async fn insert(&self, result: &AuctionResult) -> anyhow::Result<()> {
        let mut results = self.results();
        anyhow::ensure!(
            !results.contains_key(&result.id),
            "auction {} already stored",
            result.id
        );
        results.insert(result.id, result.clone());
        Ok(())
    }

    async fn get(&self, id: AuctionId) -> anyhow::Result<Option<AuctionResult>> {
        Ok(self.results().get(&id).cloned())
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> AuctionId;
}

/// Uniformly random, never zero.
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&self) -> AuctionId {
        AuctionId(rand::thread_rng().gen_range(1..=u64::MAX))
    }
}
