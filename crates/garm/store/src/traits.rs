//! Store trait definitions

use crate::error::StoreResult;
use async_trait::async_trait;
use garm_types::{
    Enterprise, Image, ObjectKey, Organization, Pool, PoolStatus, Repository, ResourceKind,
    Runner, RunnerStatus,
};

/// Combined store trait
pub trait Store: PoolStore + ScopeStore + ImageStore + RunnerStore + Send + Sync {}

impl<T: PoolStore + ScopeStore + ImageStore + RunnerStore + Send + Sync> Store for T {}

/// Change notification for one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub kind: ResourceKind,
    pub key: ObjectKey,
}

/// Storage for pools
#[async_trait]
pub trait PoolStore: Send + Sync {
    /// Get a pool by key
    async fn get_pool(&self, key: &ObjectKey) -> StoreResult<Option<Pool>>;

    /// List all pools
    async fn list_pools(&self) -> StoreResult<Vec<Pool>>;

    /// List pools in a namespace naming the given image
    async fn list_pools_by_image(&self, namespace: &str, image_name: &str)
        -> StoreResult<Vec<Pool>>;

    /// Create a pool; fails if it exists
    async fn create_pool(&self, pool: Pool) -> StoreResult<()>;

    /// Replace metadata and spec; status is left untouched
    ///
    /// Returns `None` when the update released the last finalizer of an
    /// object pending deletion and the object is gone.
    async fn update_pool(&self, pool: &Pool) -> StoreResult<Option<Pool>>;

    /// Replace the status subresource only
    async fn update_pool_status(&self, key: &ObjectKey, status: &PoolStatus) -> StoreResult<()>;

    /// Request deletion; finalized objects only get a deletion timestamp
    async fn delete_pool(&self, key: &ObjectKey) -> StoreResult<()>;
}

/// Storage for scopes, owned by their own reconcilers
#[async_trait]
pub trait ScopeStore: Send + Sync {
    async fn get_enterprise(&self, key: &ObjectKey) -> StoreResult<Option<Enterprise>>;

    async fn get_organization(&self, key: &ObjectKey) -> StoreResult<Option<Organization>>;

    async fn get_repository(&self, key: &ObjectKey) -> StoreResult<Option<Repository>>;

    async fn put_enterprise(&self, enterprise: Enterprise) -> StoreResult<()>;

    async fn put_organization(&self, organization: Organization) -> StoreResult<()>;

    async fn put_repository(&self, repository: Repository) -> StoreResult<()>;
}

/// Storage for images
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn get_image(&self, key: &ObjectKey) -> StoreResult<Option<Image>>;

    async fn list_images(&self) -> StoreResult<Vec<Image>>;

    async fn put_image(&self, image: Image) -> StoreResult<()>;

    async fn delete_image(&self, key: &ObjectKey) -> StoreResult<()>;
}

/// Storage for runner mirrors
#[async_trait]
pub trait RunnerStore: Send + Sync {
    async fn get_runner(&self, key: &ObjectKey) -> StoreResult<Option<Runner>>;

    async fn list_runners(&self) -> StoreResult<Vec<Runner>>;

    async fn create_runner(&self, runner: Runner) -> StoreResult<()>;

    /// Same contract as [`PoolStore::update_pool`]
    async fn update_runner(&self, runner: &Runner) -> StoreResult<Option<Runner>>;

    async fn update_runner_status(&self, key: &ObjectKey, status: &RunnerStatus)
        -> StoreResult<()>;

    async fn delete_runner(&self, key: &ObjectKey) -> StoreResult<()>;
}
