//! The donor's window onto the rest of the shard and the cluster.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use db::{CatalogRepository, CoordinatorRepository};
use reshard_core::{CollectionEntry, DonorShardContext, NamespaceString, ShardId};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DonorError, Result};

/// Capabilities a donor needs from its surroundings.
///
/// Calls are not retried here; a failure fails the current instance run.
#[async_trait]
pub trait ExternalState: Send + Sync {
    fn my_shard_id(&self) -> ShardId;

    /// Reloads this shard's cached view of `nss`.
    async fn refresh_catalog_cache(&self, nss: &NamespaceString) -> Result<()>;

    /// Blocks until `nss` is durably visible.
    async fn wait_for_collection_flush(&self, nss: &NamespaceString) -> Result<()>;

    /// Records this shard's donor progress in the coordinator's document.
    async fn update_coordinator_document(
        &self,
        resharding_uuid: Uuid,
        shard_id: &ShardId,
        context: &DonorShardContext,
    ) -> Result<()>;
}

/// External state backed by the shard's own catalog and coordinator tables.
pub struct ShardExternalState {
    shard_id: ShardId,
    catalog: CatalogRepository,
    coordinator: CoordinatorRepository,
    poll_interval: Duration,
    cache: RwLock<HashMap<NamespaceString, Option<CollectionEntry>>>,
}

impl ShardExternalState {
    pub fn new(
        shard_id: ShardId,
        catalog: CatalogRepository,
        coordinator: CoordinatorRepository,
        poll_interval: Duration,
    ) -> Self {
        Self {
            shard_id,
            catalog,
            coordinator,
            poll_interval,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Last refreshed view of `nss`; `None` if it was never refreshed.
    pub fn cached(&self, nss: &NamespaceString) -> Option<Option<CollectionEntry>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(nss)
            .cloned()
    }
}

#[async_trait]
impl ExternalState for ShardExternalState {
    fn my_shard_id(&self) -> ShardId {
        self.shard_id.clone()
    }

    async fn refresh_catalog_cache(&self, nss: &NamespaceString) -> Result<()> {
        let entry = self.catalog.find_by_ns(nss).await?;
        debug!(ns = %nss, exists = entry.is_some(), "Refreshed catalog cache");
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(nss.clone(), entry);
        Ok(())
    }

    async fn wait_for_collection_flush(&self, nss: &NamespaceString) -> Result<()> {
        let mut polls: u64 = 0;
        loop {
            if self.catalog.find_by_ns(nss).await?.is_some() {
                debug!(ns = %nss, polls, "Collection is visible");
                return Ok(());
            }
            polls += 1;
            if polls == 1 {
                debug!(ns = %nss, "Waiting for collection to become visible");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn update_coordinator_document(
        &self,
        resharding_uuid: Uuid,
        shard_id: &ShardId,
        context: &DonorShardContext,
    ) -> Result<()> {
        self.coordinator
            .upsert_donor_report(resharding_uuid, shard_id, context)
            .await
            .map_err(DonorError::from)
    }
}
