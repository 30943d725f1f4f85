//! Declared Pool resource
//!
//! The spec is owned by the user; the status is owned exclusively by the
//! pool reconciler.

use crate::condition::Conditions;
use crate::meta::{impl_resource, ObjectMeta, ResourceKind};
use serde::{Deserialize, Serialize};

/// Finalizer guarding backend cleanup of a pool
pub const POOL_FINALIZER: &str = "garm-operator.io/pool-finalizer";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub metadata: ObjectMeta,
    pub spec: PoolSpec,
    #[serde(default)]
    pub status: PoolStatus,
}

impl_resource!(Pool, ResourceKind::Pool);

/// Reference to the owning Enterprise, Organization or Repository
///
/// `kind` stays a string here; it is parsed when the scope is resolved so an
/// unknown kind surfaces as a reconcile error instead of a decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeRef {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSpec {
    pub github_scope_ref: ScopeRef,

    pub provider_name: String,

    pub max_runners: u32,

    pub min_idle_runners: u32,

    /// Name of an Image resource in the pool's namespace
    pub image_name: String,

    pub flavor: String,

    pub os_type: String,

    pub os_arch: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_bootstrap_timeout")]
    pub runner_bootstrap_timeout: u32,

    /// Opaque JSON handed to the provider; empty means none
    #[serde(default)]
    pub extra_specs: String,

    #[serde(default)]
    pub github_runner_group: String,

    #[serde(default)]
    pub runner_prefix: String,
}

fn default_enabled() -> bool {
    true
}

fn default_bootstrap_timeout() -> u32 {
    20
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    /// Backend pool ID; empty until created or adopted
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub long_running_idle_runners: u32,

    #[serde(default)]
    pub idle_runners: u32,

    #[serde(default)]
    pub active_runners: u32,

    #[serde(default)]
    pub runners: u32,

    #[serde(default)]
    pub last_sync_error: String,

    #[serde(default)]
    pub conditions: Conditions,
}

impl Pool {
    pub fn has_backend_id(&self) -> bool {
        !self.status.id.is_empty()
    }
}
