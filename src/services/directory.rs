//! Collaborator lookups consumed by the engine
//!
//! The livestream pipeline and the product catalog are owned elsewhere; the
//! engine only asks "is this stream live and who hosts it" at creation time
//! and "does this product exist" when a product joins a commerce session.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivestreamInfo {
    pub id: Uuid,
    pub host_id: Uuid,
    pub live: bool,
}

#[async_trait]
pub trait LivestreamDirectory: Send + Sync {
    async fn livestream(&self, id: Uuid) -> anyhow::Result<Option<LivestreamInfo>>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn product_exists(&self, product_id: Uuid) -> anyhow::Result<bool>;
}

/// Fixed in-memory directory for tests and local development
#[derive(Default)]
pub struct StaticDirectory {
    streams: DashMap<Uuid, LivestreamInfo>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_live(&self, id: Uuid, host_id: Uuid) {
        self.streams.insert(
            id,
            LivestreamInfo {
                id,
                host_id,
                live: true,
            },
        );
    }

    pub fn set_offline(&self, id: Uuid) {
        if let Some(mut info) = self.streams.get_mut(&id) {
            info.live = false;
        }
    }
}

#[async_trait]
impl LivestreamDirectory for StaticDirectory {
    async fn livestream(&self, id: Uuid) -> anyhow::Result<Option<LivestreamInfo>> {
        Ok(self.streams.get(&id).map(|info| info.clone()))
    }
}

/// Fixed in-memory catalog for tests and local development
#[derive(Default)]
pub struct StaticCatalog {
    products: DashSet<Uuid>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, product_id: Uuid) {
        self.products.insert(product_id);
    }
}

#[async_trait]
impl ProductCatalog for StaticCatalog {
    async fn product_exists(&self, product_id: Uuid) -> anyhow::Result<bool> {
        Ok(self.products.contains(&product_id))
    }
}
