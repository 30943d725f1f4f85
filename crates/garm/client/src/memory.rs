//! In-memory backend for development and testing
//!
//! Behaves like the GARM API for the calls the operator makes and records
//! every call so callers can assert on exactly what reached the backend.

use crate::error::{ClientError, Result};
use crate::traits::{InstanceClient, PoolClient};
use async_trait::async_trait;
use garm_types::{
    CreatePoolParams, GarmPool, Instance, ScopeKind, Tag, UpdatePoolParams,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum GarmCall {
    ListPools,
    GetPool(String),
    CreatePool {
        kind: ScopeKind,
        scope_id: String,
        params: CreatePoolParams,
    },
    UpdatePool {
        pool_id: String,
        params: UpdatePoolParams,
    },
    DeletePool(String),
    ListPoolInstances(String),
    GetInstance(String),
    DeleteInstance(String),
}

impl GarmCall {
    /// Whether the call changes backend state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            GarmCall::CreatePool { .. }
                | GarmCall::UpdatePool { .. }
                | GarmCall::DeletePool(_)
                | GarmCall::DeleteInstance(_)
        )
    }
}

#[derive(Debug, Default)]
struct State {
    pools: BTreeMap<String, GarmPool>,
    /// Insertion order is the backend's listing order
    instances: Vec<Instance>,
    scopes: HashMap<(ScopeKind, String), String>,
    failing_deletes: HashSet<String>,
    unavailable: bool,
    latency: Duration,
}

/// In-memory backend
#[derive(Debug, Default)]
pub struct InMemoryGarm {
    state: RwLock<State>,
    calls: RwLock<Vec<GarmCall>>,
}

impl InMemoryGarm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scope so created pools carry its name
    pub async fn register_scope(&self, kind: ScopeKind, id: &str, name: &str) {
        let mut state = self.state.write().await;
        state.scopes.insert((kind, id.to_string()), name.to_string());
    }

    /// Seed a pool as if it had been created out of band
    pub async fn insert_pool(&self, pool: GarmPool) {
        let mut state = self.state.write().await;
        state.pools.insert(pool.id.clone(), pool);
    }

    /// Drop a pool and its instances as if deleted out of band
    pub async fn remove_pool(&self, pool_id: &str) {
        let mut state = self.state.write().await;
        state.pools.remove(pool_id);
        state.instances.retain(|i| i.pool_id != pool_id);
    }

    pub async fn insert_instance(&self, instance: Instance) {
        let mut state = self.state.write().await;
        state.instances.retain(|i| i.name != instance.name);
        state.instances.push(instance);
    }

    pub async fn pool(&self, pool_id: &str) -> Option<GarmPool> {
        self.state.read().await.pools.get(pool_id).cloned()
    }

    pub async fn pools(&self) -> Vec<GarmPool> {
        self.state.read().await.pools.values().cloned().collect()
    }

    pub async fn instances(&self, pool_id: &str) -> Vec<Instance> {
        self.state
            .read()
            .await
            .instances
            .iter()
            .filter(|i| i.pool_id == pool_id)
            .cloned()
            .collect()
    }

    /// Make deletion of one instance fail with a server error
    pub async fn fail_instance_delete(&self, name: &str) {
        let mut state = self.state.write().await;
        state.failing_deletes.insert(name.to_string());
    }

    /// Make every call fail with 503 while set
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Delay every call by `latency`
    pub async fn set_latency(&self, latency: Duration) {
        self.state.write().await.latency = latency;
    }

    pub async fn calls(&self) -> Vec<GarmCall> {
        self.calls.read().await.clone()
    }

    pub async fn mutations(&self) -> Vec<GarmCall> {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.calls.write().await.clear();
    }

    async fn record(&self, call: GarmCall) -> Result<()> {
        self.calls.write().await.push(call);
        let latency = self.state.read().await.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.state.read().await.unavailable {
            return Err(ClientError::Api {
                status: 503,
                message: "service unavailable".into(),
            });
        }
        Ok(())
    }

    async fn create_pool(
        &self,
        kind: ScopeKind,
        scope_id: &str,
        params: &CreatePoolParams,
    ) -> Result<GarmPool> {
        self.record(GarmCall::CreatePool {
            kind,
            scope_id: scope_id.to_string(),
            params: params.clone(),
        })
        .await?;

        let mut state = self.state.write().await;
        let scope_name = state
            .scopes
            .get(&(kind, scope_id.to_string()))
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("{} {}", kind, scope_id)))?;

        let mut pool = GarmPool {
            id: Uuid::new_v4().to_string(),
            runner_prefix: params.runner_prefix.clone(),
            max_runners: params.max_runners,
            min_idle_runners: params.min_idle_runners,
            image: params.image.clone(),
            flavor: params.flavor.clone(),
            os_type: params.os_type.clone(),
            os_arch: params.os_arch.clone(),
            tags: backend_tags(&params.tags),
            enabled: params.enabled,
            runner_bootstrap_timeout: params.runner_bootstrap_timeout,
            extra_specs: params.extra_specs.clone(),
            github_runner_group: params.github_runner_group.clone(),
            provider_name: params.provider_name.clone(),
            ..Default::default()
        };
        match kind {
            ScopeKind::Enterprise => {
                pool.enterprise_id = scope_id.to_string();
                pool.enterprise_name = scope_name;
            }
            ScopeKind::Organization => {
                pool.org_id = scope_id.to_string();
                pool.org_name = scope_name;
            }
            ScopeKind::Repository => {
                pool.repo_id = scope_id.to_string();
                pool.repo_name = scope_name;
            }
        }

        state.pools.insert(pool.id.clone(), pool.clone());
        Ok(pool)
    }

    fn with_instances(state: &State, mut pool: GarmPool) -> GarmPool {
        pool.instances = state
            .instances
            .iter()
            .filter(|i| i.pool_id == pool.id)
            .cloned()
            .collect();
        pool
    }
}

/// Backend tags carry fresh synthetic IDs on every write
fn backend_tags(names: &[String]) -> Vec<Tag> {
    names
        .iter()
        .map(|name| Tag {
            id: Uuid::new_v4().to_string(),
            name: name.clone(),
        })
        .collect()
}

#[async_trait]
impl PoolClient for InMemoryGarm {
    async fn list_pools(&self) -> Result<Vec<GarmPool>> {
        self.record(GarmCall::ListPools).await?;
        let state = self.state.read().await;
        Ok(state
            .pools
            .values()
            .cloned()
            .map(|p| Self::with_instances(&state, p))
            .collect())
    }

    async fn get_pool(&self, pool_id: &str) -> Result<GarmPool> {
        self.record(GarmCall::GetPool(pool_id.to_string())).await?;
        let state = self.state.read().await;
        state
            .pools
            .get(pool_id)
            .cloned()
            .map(|p| Self::with_instances(&state, p))
            .ok_or_else(|| ClientError::NotFound(format!("pool {}", pool_id)))
    }

    async fn create_enterprise_pool(
        &self,
        enterprise_id: &str,
        params: &CreatePoolParams,
    ) -> Result<GarmPool> {
        self.create_pool(ScopeKind::Enterprise, enterprise_id, params)
            .await
    }

    async fn create_organization_pool(
        &self,
        organization_id: &str,
        params: &CreatePoolParams,
    ) -> Result<GarmPool> {
        self.create_pool(ScopeKind::Organization, organization_id, params)
            .await
    }

    async fn create_repository_pool(
        &self,
        repository_id: &str,
        params: &CreatePoolParams,
    ) -> Result<GarmPool> {
        self.create_pool(ScopeKind::Repository, repository_id, params)
            .await
    }

    async fn update_pool(&self, pool_id: &str, params: &UpdatePoolParams) -> Result<GarmPool> {
        self.record(GarmCall::UpdatePool {
            pool_id: pool_id.to_string(),
            params: params.clone(),
        })
        .await?;

        let mut state = self.state.write().await;
        let pool = state
            .pools
            .get_mut(pool_id)
            .ok_or_else(|| ClientError::NotFound(format!("pool {}", pool_id)))?;

        if let Some(prefix) = &params.runner_prefix {
            pool.runner_prefix = prefix.clone();
        }
        if let Some(max) = params.max_runners {
            pool.max_runners = max;
        }
        if let Some(min) = params.min_idle_runners {
            pool.min_idle_runners = min;
        }
        if let Some(image) = &params.image {
            pool.image = image.clone();
        }
        if let Some(flavor) = &params.flavor {
            pool.flavor = flavor.clone();
        }
        if let Some(os_type) = &params.os_type {
            pool.os_type = os_type.clone();
        }
        if let Some(os_arch) = &params.os_arch {
            pool.os_arch = os_arch.clone();
        }
        if let Some(tags) = &params.tags {
            pool.tags = backend_tags(tags);
        }
        if let Some(enabled) = params.enabled {
            pool.enabled = enabled;
        }
        if let Some(timeout) = params.runner_bootstrap_timeout {
            pool.runner_bootstrap_timeout = timeout;
        }
        if let Some(extra_specs) = &params.extra_specs {
            pool.extra_specs = Some(extra_specs.clone());
        }
        if let Some(group) = &params.github_runner_group {
            pool.github_runner_group = group.clone();
        }

        let updated = pool.clone();
        Ok(Self::with_instances(&state, updated))
    }

    async fn delete_pool(&self, pool_id: &str) -> Result<()> {
        self.record(GarmCall::DeletePool(pool_id.to_string()))
            .await?;

        let mut state = self.state.write().await;
        if !state.pools.contains_key(pool_id) {
            return Err(ClientError::NotFound(format!("pool {}", pool_id)));
        }
        if state.instances.iter().any(|i| i.pool_id == pool_id) {
            return Err(ClientError::Api {
                status: 409,
                message: "pool has runners".into(),
            });
        }
        state.pools.remove(pool_id);
        Ok(())
    }
}

#[async_trait]
impl InstanceClient for InMemoryGarm {
    async fn list_pool_instances(&self, pool_id: &str) -> Result<Vec<Instance>> {
        self.record(GarmCall::ListPoolInstances(pool_id.to_string()))
            .await?;

        let state = self.state.read().await;
        if !state.pools.contains_key(pool_id) {
            return Err(ClientError::NotFound(format!("pool {}", pool_id)));
        }
        Ok(state
            .instances
            .iter()
            .filter(|i| i.pool_id == pool_id)
            .cloned()
            .collect())
    }

    async fn get_instance_by_name(&self, name: &str) -> Result<Instance> {
        self.record(GarmCall::GetInstance(name.to_string())).await?;
        self.state
            .read()
            .await
            .instances
            .iter()
            .find(|i| i.name == name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("instance {}", name)))
    }

    async fn delete_instance(&self, name: &str) -> Result<()> {
        self.record(GarmCall::DeleteInstance(name.to_string()))
            .await?;

        let mut state = self.state.write().await;
        if state.failing_deletes.contains(name) {
            return Err(ClientError::Api {
                status: 500,
                message: format!("provider failed to delete {}", name),
            });
        }
        let before = state.instances.len();
        state.instances.retain(|i| i.name != name);
        if before == state.instances.len() {
            return Err(ClientError::NotFound(format!("instance {}", name)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use garm_types::{InstanceStatus, RunnerState};

    fn params() -> CreatePoolParams {
        CreatePoolParams {
            provider_name: "lxd".into(),
            runner_prefix: "garm".into(),
            max_runners: 4,
            min_idle_runners: 1,
            image: "ubuntu:22.04".into(),
            flavor: "default".into(),
            os_type: "linux".into(),
            os_arch: "amd64".into(),
            tags: vec!["linux".into(), "self-hosted".into(), "x64".into()],
            enabled: true,
            runner_bootstrap_timeout: 20,
            extra_specs: None,
            github_runner_group: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_fills_scope_and_records_call() {
        let garm = InMemoryGarm::new();
        garm.register_scope(ScopeKind::Organization, "org-1", "acme")
            .await;

        let pool = garm
            .create_organization_pool("org-1", &params())
            .await
            .unwrap();
        assert_eq!(pool.org_name, "acme");
        assert_eq!(pool.tags.len(), 3);
        assert!(pool.tags.iter().all(|t| !t.id.is_empty()));
        assert_eq!(garm.mutations().await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_pool_with_runners_is_refused() {
        let garm = InMemoryGarm::new();
        garm.register_scope(ScopeKind::Repository, "repo-1", "acme/app")
            .await;
        let pool = garm
            .create_repository_pool("repo-1", &params())
            .await
            .unwrap();
        garm.insert_instance(Instance {
            id: "i-1".into(),
            name: "garm-1".into(),
            provider_id: String::new(),
            agent_id: 1,
            os_type: "linux".into(),
            os_name: "ubuntu".into(),
            os_arch: "amd64".into(),
            addresses: vec![],
            status: InstanceStatus::Running,
            runner_status: RunnerState::Idle,
            pool_id: pool.id.clone(),
            updated_at: Utc::now(),
            created_at: None,
        })
        .await;

        assert!(matches!(
            garm.delete_pool(&pool.id).await,
            Err(ClientError::Api { status: 409, .. })
        ));
        garm.delete_instance("garm-1").await.unwrap();
        garm.delete_pool(&pool.id).await.unwrap();
        assert!(garm.get_pool(&pool.id).await.unwrap_err().is_not_found());
    }
}
