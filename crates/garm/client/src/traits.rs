//! Backend capability traits

use crate::error::Result;
use async_trait::async_trait;
use garm_types::{CreatePoolParams, GarmPool, Instance, UpdatePoolParams};

/// Pool management on the backend
#[async_trait]
pub trait PoolClient: Send + Sync {
    /// List every pool known to the backend
    async fn list_pools(&self) -> Result<Vec<GarmPool>>;

    /// Get a pool by backend ID
    async fn get_pool(&self, pool_id: &str) -> Result<GarmPool>;

    /// Create a pool under an enterprise
    async fn create_enterprise_pool(
        &self,
        enterprise_id: &str,
        params: &CreatePoolParams,
    ) -> Result<GarmPool>;

    /// Create a pool under an organization
    async fn create_organization_pool(
        &self,
        organization_id: &str,
        params: &CreatePoolParams,
    ) -> Result<GarmPool>;

    /// Create a pool under a repository
    async fn create_repository_pool(
        &self,
        repository_id: &str,
        params: &CreatePoolParams,
    ) -> Result<GarmPool>;

    /// Update the mutable fields of a pool
    async fn update_pool(&self, pool_id: &str, params: &UpdatePoolParams) -> Result<GarmPool>;

    /// Delete a pool; the backend refuses while instances remain
    async fn delete_pool(&self, pool_id: &str) -> Result<()>;
}

/// Instance management on the backend
#[async_trait]
pub trait InstanceClient: Send + Sync {
    /// List the instances of one pool
    async fn list_pool_instances(&self, pool_id: &str) -> Result<Vec<Instance>>;

    /// Get an instance by its backend name
    async fn get_instance_by_name(&self, name: &str) -> Result<Instance>;

    /// Delete an instance by its backend name
    async fn delete_instance(&self, name: &str) -> Result<()>;
}

/// Combined backend client
pub trait GarmClient: PoolClient + InstanceClient {}

impl<T: PoolClient + InstanceClient> GarmClient for T {}
