//! In-memory store implementation
//!
//! Mirrors the cluster store semantics the reconcilers depend on: finalizers
//! hold deletion, a deletion timestamp marks a pending delete, the status
//! subresource is written separately from spec and metadata, and every
//! spec or metadata change is published on a broadcast feed.

use super::traits::*;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use garm_types::{
    Enterprise, Image, ObjectKey, Organization, Pool, PoolStatus, Repository, Resource, Runner,
    RunnerStatus,
};
use std::collections::BTreeMap;
use tokio::sync::{broadcast, RwLock};

/// Objects of one kind, ordered by key
#[derive(Debug)]
struct Collection<T> {
    items: RwLock<BTreeMap<ObjectKey, T>>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T: Resource + Clone> Collection<T> {
    async fn get(&self, key: &ObjectKey) -> Option<T> {
        self.items.read().await.get(key).cloned()
    }

    async fn list(&self) -> Vec<T> {
        self.items.read().await.values().cloned().collect()
    }

    async fn create(&self, obj: T) -> StoreResult<()> {
        let key = obj.key();
        let mut items = self.items.write().await;
        if items.contains_key(&key) {
            return Err(StoreError::Conflict { kind: T::KIND, key });
        }
        items.insert(key, obj);
        Ok(())
    }

    async fn put(&self, obj: T) {
        self.items.write().await.insert(obj.key(), obj);
    }

    /// Apply `f` to the stored object, then drop it if it is pending
    /// deletion with no finalizers left
    async fn update_with<F>(&self, key: &ObjectKey, f: F) -> StoreResult<Option<T>>
    where
        F: FnOnce(&mut T),
    {
        let mut items = self.items.write().await;
        let stored = items.get_mut(key).ok_or_else(|| StoreError::NotFound {
            kind: T::KIND,
            key: key.clone(),
        })?;
        f(stored);

        if stored.meta().is_deleting() && stored.meta().finalizers.is_empty() {
            items.remove(key);
            tracing::debug!(kind = %T::KIND, key = %key, "Finalized object removed");
            return Ok(None);
        }
        Ok(Some(stored.clone()))
    }

    async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        let mut items = self.items.write().await;
        let stored = items.get_mut(key).ok_or_else(|| StoreError::NotFound {
            kind: T::KIND,
            key: key.clone(),
        })?;

        if stored.meta().finalizers.is_empty() {
            items.remove(key);
        } else if !stored.meta().is_deleting() {
            stored.meta_mut().deletion_timestamp = Some(Utc::now());
        }
        Ok(())
    }
}

/// In-memory store for development and testing
#[derive(Debug)]
pub struct InMemoryStore {
    pools: Collection<Pool>,
    enterprises: Collection<Enterprise>,
    organizations: Collection<Organization>,
    repositories: Collection<Repository>,
    images: Collection<Image>,
    runners: Collection<Runner>,
    event_tx: broadcast::Sender<StoreEvent>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            pools: Collection::default(),
            enterprises: Collection::default(),
            organizations: Collection::default(),
            repositories: Collection::default(),
            images: Collection::default(),
            runners: Collection::default(),
            event_tx,
        }
    }

    /// Subscribe to spec and metadata changes
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_tx.subscribe()
    }

    fn emit<T: Resource>(&self, key: &ObjectKey) {
        // No subscribers is fine
        let _ = self.event_tx.send(StoreEvent {
            kind: T::KIND,
            key: key.clone(),
        });
    }
}

#[async_trait]
impl PoolStore for InMemoryStore {
    async fn get_pool(&self, key: &ObjectKey) -> StoreResult<Option<Pool>> {
        Ok(self.pools.get(key).await)
    }

    async fn list_pools(&self) -> StoreResult<Vec<Pool>> {
        Ok(self.pools.list().await)
    }

    async fn list_pools_by_image(
        &self,
        namespace: &str,
        image_name: &str,
    ) -> StoreResult<Vec<Pool>> {
        Ok(self
            .pools
            .list()
            .await
            .into_iter()
            .filter(|p| p.metadata.namespace == namespace && p.spec.image_name == image_name)
            .collect())
    }

    async fn create_pool(&self, mut pool: Pool) -> StoreResult<()> {
        let key = pool.key();
        pool.metadata.generation = 1;
        pool.metadata.deletion_timestamp = None;
        self.pools.create(pool).await?;
        self.emit::<Pool>(&key);
        Ok(())
    }

    async fn update_pool(&self, pool: &Pool) -> StoreResult<Option<Pool>> {
        let key = pool.key();
        let updated = self
            .pools
            .update_with(&key, |stored| {
                if stored.spec != pool.spec {
                    stored.metadata.generation += 1;
                    stored.spec = pool.spec.clone();
                }
                stored.metadata.finalizers = pool.metadata.finalizers.clone();
                stored.metadata.labels = pool.metadata.labels.clone();
            })
            .await?;
        self.emit::<Pool>(&key);
        Ok(updated)
    }

    async fn update_pool_status(&self, key: &ObjectKey, status: &PoolStatus) -> StoreResult<()> {
        self.pools
            .update_with(key, |stored| stored.status = status.clone())
            .await?;
        Ok(())
    }

    async fn delete_pool(&self, key: &ObjectKey) -> StoreResult<()> {
        self.pools.delete(key).await?;
        self.emit::<Pool>(key);
        Ok(())
    }
}

#[async_trait]
impl ScopeStore for InMemoryStore {
    async fn get_enterprise(&self, key: &ObjectKey) -> StoreResult<Option<Enterprise>> {
        Ok(self.enterprises.get(key).await)
    }

    async fn get_organization(&self, key: &ObjectKey) -> StoreResult<Option<Organization>> {
        Ok(self.organizations.get(key).await)
    }

    async fn get_repository(&self, key: &ObjectKey) -> StoreResult<Option<Repository>> {
        Ok(self.repositories.get(key).await)
    }

    async fn put_enterprise(&self, enterprise: Enterprise) -> StoreResult<()> {
        let key = enterprise.key();
        self.enterprises.put(enterprise).await;
        self.emit::<Enterprise>(&key);
        Ok(())
    }

    async fn put_organization(&self, organization: Organization) -> StoreResult<()> {
        let key = organization.key();
        self.organizations.put(organization).await;
        self.emit::<Organization>(&key);
        Ok(())
    }

    async fn put_repository(&self, repository: Repository) -> StoreResult<()> {
        let key = repository.key();
        self.repositories.put(repository).await;
        self.emit::<Repository>(&key);
        Ok(())
    }
}

#[async_trait]
impl ImageStore for InMemoryStore {
    async fn get_image(&self, key: &ObjectKey) -> StoreResult<Option<Image>> {
        Ok(self.images.get(key).await)
    }

    async fn list_images(&self) -> StoreResult<Vec<Image>> {
        Ok(self.images.list().await)
    }

    async fn put_image(&self, image: Image) -> StoreResult<()> {
        let key = image.key();
        self.images.put(image).await;
        self.emit::<Image>(&key);
        Ok(())
    }

    async fn delete_image(&self, key: &ObjectKey) -> StoreResult<()> {
        self.images.delete(key).await?;
        self.emit::<Image>(key);
        Ok(())
    }
}

#[async_trait]
impl RunnerStore for InMemoryStore {
    async fn get_runner(&self, key: &ObjectKey) -> StoreResult<Option<Runner>> {
        Ok(self.runners.get(key).await)
    }

    async fn list_runners(&self) -> StoreResult<Vec<Runner>> {
        Ok(self.runners.list().await)
    }

    async fn create_runner(&self, runner: Runner) -> StoreResult<()> {
        let key = runner.key();
        self.runners.create(runner).await?;
        self.emit::<Runner>(&key);
        Ok(())
    }

    async fn update_runner(&self, runner: &Runner) -> StoreResult<Option<Runner>> {
        let key = runner.key();
        let updated = self
            .runners
            .update_with(&key, |stored| {
                stored.metadata.finalizers = runner.metadata.finalizers.clone();
                stored.metadata.labels = runner.metadata.labels.clone();
            })
            .await?;
        self.emit::<Runner>(&key);
        Ok(updated)
    }

    async fn update_runner_status(
        &self,
        key: &ObjectKey,
        status: &RunnerStatus,
    ) -> StoreResult<()> {
        self.runners
            .update_with(key, |stored| stored.status = status.clone())
            .await?;
        Ok(())
    }

    async fn delete_runner(&self, key: &ObjectKey) -> StoreResult<()> {
        self.runners.delete(key).await?;
        self.emit::<Runner>(key);
        Ok(())
    }
}
