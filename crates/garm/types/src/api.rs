//! Wire models of the GARM REST API
//!
//! Field names follow the backend's JSON encoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pool tag as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Synthetic backend identifier, never compared
    #[serde(default)]
    pub id: String,
    pub name: String,
}

impl Tag {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
        }
    }
}

/// Pool object owned by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GarmPool {
    pub id: String,

    #[serde(default)]
    pub runner_prefix: String,

    #[serde(default)]
    pub max_runners: u32,

    #[serde(default)]
    pub min_idle_runners: u32,

    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub flavor: String,

    #[serde(default)]
    pub os_type: String,

    #[serde(default)]
    pub os_arch: String,

    #[serde(default)]
    pub tags: Vec<Tag>,

    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub instances: Vec<Instance>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub org_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub org_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub enterprise_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub enterprise_name: String,

    #[serde(default)]
    pub runner_bootstrap_timeout: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_specs: Option<Value>,

    #[serde(default, rename = "github-runner-group")]
    pub github_runner_group: String,

    #[serde(default)]
    pub provider_name: String,
}

/// Provider-level lifecycle of a compute instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    PendingCreate,
    Creating,
    Running,
    Stopped,
    Error,
    PendingDelete,
    PendingForceDelete,
    Deleting,
    Deleted,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Runner-level state reported by the agent inside the instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    Pending,
    Installing,
    Idle,
    Active,
    Failed,
    Terminated,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub address: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Compute instance owned by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub provider_id: String,

    #[serde(default)]
    pub agent_id: i64,

    #[serde(default)]
    pub os_type: String,

    #[serde(default)]
    pub os_name: String,

    #[serde(default)]
    pub os_arch: String,

    #[serde(default)]
    pub addresses: Vec<Address>,

    #[serde(default)]
    pub status: InstanceStatus,

    #[serde(default)]
    pub runner_status: RunnerState,

    #[serde(default)]
    pub pool_id: String,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Body of the per-scope create-pool calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePoolParams {
    pub provider_name: String,
    pub runner_prefix: String,
    pub max_runners: u32,
    pub min_idle_runners: u32,
    pub image: String,
    pub flavor: String,
    pub os_type: String,
    pub os_arch: String,
    pub tags: Vec<String>,
    pub enabled: bool,
    pub runner_bootstrap_timeout: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_specs: Option<Value>,
    #[serde(default, rename = "github-runner-group")]
    pub github_runner_group: String,
}

/// Body of the update-pool call
///
/// Provider and scope are immutable after creation and have no field here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatePoolParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_runners: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_idle_runners: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_bootstrap_timeout: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_specs: Option<Value>,
    #[serde(
        default,
        rename = "github-runner-group",
        skip_serializing_if = "Option::is_none"
    )]
    pub github_runner_group: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_status_wire_names() {
        let instance: Instance = serde_json::from_value(serde_json::json!({
            "name": "garm-abc",
            "status": "pending_delete",
            "runner_status": "idle",
            "updated_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(instance.status, InstanceStatus::PendingDelete);
        assert_eq!(instance.runner_status, RunnerState::Idle);
    }

    #[test]
    fn test_unrecognised_status_is_unknown() {
        let status: InstanceStatus = serde_json::from_str("\"hibernating\"").unwrap();
        assert_eq!(status, InstanceStatus::Unknown);
    }

    #[test]
    fn test_update_params_omit_unset_fields() {
        let params = UpdatePoolParams {
            enabled: Some(false),
            min_idle_runners: Some(0),
            ..Default::default()
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"enabled": false, "min_idle_runners": 0})
        );
    }
}
