//! Runner resource: a read-mostly mirror of one backend instance
//!
//! The backend owns runners. The runner poller creates mirrors, the
//! runner reconciler keeps them in step and removes them; a mirror only
//! ever reflects what the backend reports.

use crate::api::{Instance, InstanceStatus, RunnerState};
use crate::meta::{impl_resource, ObjectMeta, ResourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Finalizer guarding deletion of the backend instance behind a mirror
pub const RUNNER_FINALIZER: &str = "garm-operator.io/runner-finalizer";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runner {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: RunnerStatus,
}

impl_resource!(Runner, ResourceKind::Runner);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerStatus {
    /// Instance name as reported by the backend
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub provider_id: String,

    #[serde(default)]
    pub agent_id: i64,

    #[serde(default)]
    pub pool_id: String,

    #[serde(default)]
    pub os_type: String,

    #[serde(default)]
    pub os_name: String,

    #[serde(default)]
    pub os_arch: String,

    #[serde(default)]
    pub addresses: Vec<String>,

    #[serde(default)]
    pub instance_status: InstanceStatus,

    #[serde(default)]
    pub runner_status: RunnerState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Instance> for RunnerStatus {
    fn from(instance: &Instance) -> Self {
        Self {
            name: instance.name.clone(),
            id: instance.id.clone(),
            provider_id: instance.provider_id.clone(),
            agent_id: instance.agent_id,
            pool_id: instance.pool_id.clone(),
            os_type: instance.os_type.clone(),
            os_name: instance.os_name.clone(),
            os_arch: instance.os_arch.clone(),
            addresses: instance
                .addresses
                .iter()
                .map(|a| a.address.clone())
                .collect(),
            instance_status: instance.status,
            runner_status: instance.runner_status,
            updated_at: Some(instance.updated_at),
        }
    }
}

impl Runner {
    /// Mirror object name for a backend instance name
    pub fn object_name(instance_name: &str) -> String {
        instance_name.to_lowercase()
    }

    /// Backend instance name this mirror stands for
    pub fn instance_name(&self) -> &str {
        if self.status.name.is_empty() {
            &self.metadata.name
        } else {
            &self.status.name
        }
    }
}
