//! Pool spec-diff engine
//!
//! Both the declared pool and the backend pool are projected onto the same
//! comparable shape. Volatile backend data (tag IDs, instances, the pool ID
//! itself) never enters the projection, so two passes over unchanged inputs
//! always compare equal.

use crate::error::{ReconcileError, Result};
use crate::scope::Scope;
use crate::tags::normalize_tags;
use garm_types::{CreatePoolParams, GarmPool, PoolSpec, ScopeKind, UpdatePoolParams};
use serde_json::{Map, Value};
use std::fmt;

/// Prefix the backend substitutes when none is declared
pub const DEFAULT_RUNNER_PREFIX: &str = "garm";

/// Owning scope as recorded on a backend pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeIdentity {
    pub kind: ScopeKind,
    pub id: String,
    pub name: String,
}

impl ScopeIdentity {
    pub fn of(scope: &Scope) -> Self {
        Self {
            kind: scope.kind(),
            id: scope.id().to_string(),
            name: scope.name(),
        }
    }

    /// Scope fields of a backend pool, if any are set
    pub fn of_backend(pool: &GarmPool) -> Option<Self> {
        let (kind, id, name) = if !pool.enterprise_id.is_empty() {
            (ScopeKind::Enterprise, &pool.enterprise_id, &pool.enterprise_name)
        } else if !pool.org_id.is_empty() {
            (ScopeKind::Organization, &pool.org_id, &pool.org_name)
        } else if !pool.repo_id.is_empty() {
            (ScopeKind::Repository, &pool.repo_id, &pool.repo_name)
        } else {
            return None;
        };
        Some(Self {
            kind,
            id: id.clone(),
            name: name.clone(),
        })
    }

    /// Same kind and backend ID; display names may differ
    pub fn same_owner(&self, other: &ScopeIdentity) -> bool {
        self.kind == other.kind && self.id == other.id
    }
}

/// Comparable view of a pool
#[derive(Debug, Clone, PartialEq)]
pub struct PoolProjection {
    pub runner_prefix: String,
    pub max_runners: u32,
    pub min_idle_runners: u32,
    pub image: String,
    pub flavor: String,
    pub os_type: String,
    pub os_arch: String,
    /// Sorted tag names, IDs stripped
    pub tags: Vec<String>,
    pub enabled: bool,
    pub runner_bootstrap_timeout: u32,
    pub extra_specs: Option<Value>,
    pub github_runner_group: String,
    pub scope: Option<ScopeIdentity>,
}

impl PoolProjection {
    /// Desired state from a declared spec, its resolved image tag and scope
    pub fn desired(spec: &PoolSpec, image_tag: &str, scope: &Scope) -> Result<Self> {
        let tags = normalize_tags(&spec.tags, &spec.os_arch, &spec.os_type)?;
        let extra_specs = parse_extra_specs(&spec.extra_specs)?;
        let runner_prefix = if spec.runner_prefix.is_empty() {
            DEFAULT_RUNNER_PREFIX.to_string()
        } else {
            spec.runner_prefix.clone()
        };

        Ok(Self {
            runner_prefix,
            max_runners: spec.max_runners,
            min_idle_runners: spec.min_idle_runners,
            image: image_tag.to_string(),
            flavor: spec.flavor.clone(),
            os_type: spec.os_type.clone(),
            os_arch: spec.os_arch.clone(),
            tags,
            enabled: spec.enabled,
            runner_bootstrap_timeout: spec.runner_bootstrap_timeout,
            extra_specs,
            github_runner_group: spec.github_runner_group.clone(),
            scope: Some(ScopeIdentity::of(scope)),
        })
    }

    /// Actual state reported by the backend
    pub fn actual(pool: &GarmPool) -> Self {
        let mut tags: Vec<String> = pool.tags.iter().map(|t| t.name.clone()).collect();
        tags.sort();
        tags.dedup();

        Self {
            runner_prefix: pool.runner_prefix.clone(),
            max_runners: pool.max_runners,
            min_idle_runners: pool.min_idle_runners,
            image: pool.image.clone(),
            flavor: pool.flavor.clone(),
            os_type: pool.os_type.clone(),
            os_arch: pool.os_arch.clone(),
            tags,
            enabled: pool.enabled,
            runner_bootstrap_timeout: pool.runner_bootstrap_timeout,
            extra_specs: canonical_extra_specs(pool.extra_specs.clone()),
            github_runner_group: pool.github_runner_group.clone(),
            scope: ScopeIdentity::of_backend(pool),
        }
    }

    pub fn create_params(&self, provider_name: &str) -> CreatePoolParams {
        CreatePoolParams {
            provider_name: provider_name.to_string(),
            runner_prefix: self.runner_prefix.clone(),
            max_runners: self.max_runners,
            min_idle_runners: self.min_idle_runners,
            image: self.image.clone(),
            flavor: self.flavor.clone(),
            os_type: self.os_type.clone(),
            os_arch: self.os_arch.clone(),
            tags: self.tags.clone(),
            enabled: self.enabled,
            runner_bootstrap_timeout: self.runner_bootstrap_timeout,
            extra_specs: self.extra_specs.clone(),
            github_runner_group: self.github_runner_group.clone(),
        }
    }

    /// Full update carrying every mutable field
    ///
    /// Absent extra specs are written as `{}` so a cleared blob is actually
    /// cleared on the backend.
    pub fn update_params(&self) -> UpdatePoolParams {
        UpdatePoolParams {
            runner_prefix: Some(self.runner_prefix.clone()),
            max_runners: Some(self.max_runners),
            min_idle_runners: Some(self.min_idle_runners),
            image: Some(self.image.clone()),
            flavor: Some(self.flavor.clone()),
            os_type: Some(self.os_type.clone()),
            os_arch: Some(self.os_arch.clone()),
            tags: Some(self.tags.clone()),
            enabled: Some(self.enabled),
            runner_bootstrap_timeout: Some(self.runner_bootstrap_timeout),
            extra_specs: Some(
                self.extra_specs
                    .clone()
                    .unwrap_or_else(|| Value::Object(Map::new())),
            ),
            github_runner_group: Some(self.github_runner_group.clone()),
        }
    }

    /// Whether a backend pool looks like the one this projection describes
    ///
    /// Used to adopt a pool created by an earlier pass whose ID was never
    /// recorded. Only fields the user cannot tune after creation are
    /// compared, plus the image and flavor. Scopes match on kind and ID.
    pub fn identifies(&self, provider_name: &str, pool: &GarmPool) -> bool {
        let actual = Self::actual(pool);
        let same_scope = match (&self.scope, &actual.scope) {
            (Some(desired), Some(actual)) => desired.same_owner(actual),
            (None, None) => true,
            _ => false,
        };
        pool.provider_name == provider_name
            && same_scope
            && actual.image == self.image
            && actual.flavor == self.flavor
            && actual.tags == self.tags
    }
}

/// Parse the declared extra specs; empty means none
pub fn parse_extra_specs(raw: &str) -> Result<Option<Value>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ReconcileError::InvalidExtraSpecs(e.to_string()))?;
    Ok(canonical_extra_specs(Some(value)))
}

/// `null` and `{}` both mean "no extra specs"
fn canonical_extra_specs(value: Option<Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) if map.is_empty() => None,
        other => other,
    }
}

/// A pool attribute that may drift
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PoolField {
    RunnerPrefix,
    MaxRunners,
    MinIdleRunners,
    Image,
    Flavor,
    OsType,
    OsArch,
    Tags,
    Enabled,
    RunnerBootstrapTimeout,
    ExtraSpecs,
    GithubRunnerGroup,
    Scope,
}

impl fmt::Display for PoolField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolField::RunnerPrefix => "runnerPrefix",
            PoolField::MaxRunners => "maxRunners",
            PoolField::MinIdleRunners => "minIdleRunners",
            PoolField::Image => "image",
            PoolField::Flavor => "flavor",
            PoolField::OsType => "osType",
            PoolField::OsArch => "osArch",
            PoolField::Tags => "tags",
            PoolField::Enabled => "enabled",
            PoolField::RunnerBootstrapTimeout => "runnerBootstrapTimeout",
            PoolField::ExtraSpecs => "extraSpecs",
            PoolField::GithubRunnerGroup => "githubRunnerGroup",
            PoolField::Scope => "scope",
        };
        f.write_str(name)
    }
}

impl PoolField {
    /// Whether an update call can change this field
    pub fn is_updatable(self) -> bool {
        self != PoolField::Scope
    }
}

/// Fields whose desired and actual values differ
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolDiff {
    changed: Vec<PoolField>,
}

impl PoolDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    pub fn contains(&self, field: PoolField) -> bool {
        self.changed.contains(&field)
    }

    pub fn fields(&self) -> &[PoolField] {
        &self.changed
    }

    /// Whether an update call would converge anything
    pub fn requires_update(&self) -> bool {
        self.changed.iter().any(|f| f.is_updatable())
    }
}

impl fmt::Display for PoolDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.changed.iter().map(ToString::to_string).collect();
        f.write_str(&names.join(","))
    }
}

/// Compare two projections field by field
pub fn diff_pool(desired: &PoolProjection, actual: &PoolProjection) -> PoolDiff {
    let mut changed = Vec::new();
    let mut check = |field: PoolField, same: bool| {
        if !same {
            changed.push(field);
        }
    };

    check(PoolField::RunnerPrefix, desired.runner_prefix == actual.runner_prefix);
    check(PoolField::MaxRunners, desired.max_runners == actual.max_runners);
    check(PoolField::MinIdleRunners, desired.min_idle_runners == actual.min_idle_runners);
    check(PoolField::Image, desired.image == actual.image);
    check(PoolField::Flavor, desired.flavor == actual.flavor);
    check(PoolField::OsType, desired.os_type == actual.os_type);
    check(PoolField::OsArch, desired.os_arch == actual.os_arch);
    check(PoolField::Tags, desired.tags == actual.tags);
    check(PoolField::Enabled, desired.enabled == actual.enabled);
    check(
        PoolField::RunnerBootstrapTimeout,
        desired.runner_bootstrap_timeout == actual.runner_bootstrap_timeout,
    );
    check(PoolField::ExtraSpecs, desired.extra_specs == actual.extra_specs);
    check(
        PoolField::GithubRunnerGroup,
        desired.github_runner_group == actual.github_runner_group,
    );
    check(PoolField::Scope, desired.scope == actual.scope);

    PoolDiff { changed }
}
