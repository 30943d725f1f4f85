//! Scope resources: the accounts a pool's runners belong to

use crate::condition::Conditions;
use crate::meta::{impl_resource, ObjectMeta, ResourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Closed set of scope kinds a pool may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    Enterprise,
    Organization,
    Repository,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Enterprise => "Enterprise",
            ScopeKind::Organization => "Organization",
            ScopeKind::Repository => "Repository",
        }
    }

    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            ScopeKind::Enterprise => ResourceKind::Enterprise,
            ScopeKind::Organization => ResourceKind::Organization,
            ScopeKind::Repository => ResourceKind::Repository,
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported scope kind: {0}")]
pub struct UnknownScopeKind(pub String);

impl FromStr for ScopeKind {
    type Err = UnknownScopeKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Enterprise" => Ok(ScopeKind::Enterprise),
            "Organization" => Ok(ScopeKind::Organization),
            "Repository" => Ok(ScopeKind::Repository),
            other => Err(UnknownScopeKind(other.to_string())),
        }
    }
}

/// Spec shared by enterprises and organizations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSpec {
    /// Name of the backend credentials used by this scope
    pub credentials_ref: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySpec {
    pub owner: String,

    pub credentials_ref: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret_ref: Option<String>,
}

/// Status written by the scope's own reconciler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeStatus {
    /// Backend ID; empty until the scope has synced
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub pool_manager_is_running: bool,

    #[serde(default)]
    pub pool_manager_failure_reason: String,

    #[serde(default)]
    pub conditions: Conditions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enterprise {
    pub metadata: ObjectMeta,
    pub spec: ScopeSpec,
    #[serde(default)]
    pub status: ScopeStatus,
}

impl_resource!(Enterprise, ResourceKind::Enterprise);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub metadata: ObjectMeta,
    pub spec: ScopeSpec,
    #[serde(default)]
    pub status: ScopeStatus,
}

impl_resource!(Organization, ResourceKind::Organization);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub metadata: ObjectMeta,
    pub spec: RepositorySpec,
    #[serde(default)]
    pub status: ScopeStatus,
}

impl_resource!(Repository, ResourceKind::Repository);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_kind_parse() {
        assert_eq!("Repository".parse::<ScopeKind>(), Ok(ScopeKind::Repository));
        assert_eq!(
            "Team".parse::<ScopeKind>(),
            Err(UnknownScopeKind("Team".to_string()))
        );
    }
}
