//! Scope resolution
//!
//! A pool names its owning account by kind and name. The resolver fetches
//! the matching resource and exposes it through one [`Scope`] value.

use crate::error::{ReconcileError, Result};
use garm_store::Store;
use garm_types::{
    Enterprise, ObjectKey, Organization, Repository, ScopeKind, ScopeRef, ScopeStatus,
};
use std::sync::Arc;

/// A resolved scope, one variant per supported kind
#[derive(Debug, Clone, PartialEq)]
pub enum Scope {
    Enterprise(Enterprise),
    Organization(Organization),
    Repository(Repository),
}

impl Scope {
    pub fn kind(&self) -> ScopeKind {
        match self {
            Scope::Enterprise(_) => ScopeKind::Enterprise,
            Scope::Organization(_) => ScopeKind::Organization,
            Scope::Repository(_) => ScopeKind::Repository,
        }
    }

    fn status(&self) -> &ScopeStatus {
        match self {
            Scope::Enterprise(e) => &e.status,
            Scope::Organization(o) => &o.status,
            Scope::Repository(r) => &r.status,
        }
    }

    /// Backend ID; empty until the scope itself has synced
    pub fn id(&self) -> &str {
        &self.status().id
    }

    /// Name the backend reports for this scope
    pub fn name(&self) -> String {
        match self {
            Scope::Enterprise(e) => e.metadata.name.clone(),
            Scope::Organization(o) => o.metadata.name.clone(),
            Scope::Repository(r) => format!("{}/{}", r.spec.owner, r.metadata.name),
        }
    }

    pub fn credentials_name(&self) -> &str {
        match self {
            Scope::Enterprise(e) => &e.spec.credentials_ref,
            Scope::Organization(o) => &o.spec.credentials_ref,
            Scope::Repository(r) => &r.spec.credentials_ref,
        }
    }

    pub fn pool_manager_is_running(&self) -> bool {
        self.status().pool_manager_is_running
    }

    pub fn pool_manager_failure_reason(&self) -> &str {
        &self.status().pool_manager_failure_reason
    }
}

/// Looks up the scope a pool references
pub struct ScopeResolver {
    store: Arc<dyn Store>,
}

impl ScopeResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Resolve a reference within `namespace`
    ///
    /// An unknown kind or a missing resource is an error. A resource that
    /// exists but has no backend ID yet is returned as is; callers decide
    /// how to wait for it.
    pub async fn resolve(&self, scope_ref: &ScopeRef, namespace: &str) -> Result<Scope> {
        let kind: ScopeKind = scope_ref.kind.parse()?;
        let key = ObjectKey::new(namespace, scope_ref.name.clone());

        let scope = match kind {
            ScopeKind::Enterprise => self.store.get_enterprise(&key).await?.map(Scope::Enterprise),
            ScopeKind::Organization => self
                .store
                .get_organization(&key)
                .await?
                .map(Scope::Organization),
            ScopeKind::Repository => self.store.get_repository(&key).await?.map(Scope::Repository),
        };

        scope.ok_or(ReconcileError::ScopeNotFound { kind, key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garm_store::{InMemoryStore, ScopeStore};
    use garm_types::{ObjectMeta, RepositorySpec};

    fn scope_ref(kind: &str, name: &str) -> ScopeRef {
        ScopeRef {
            kind: kind.into(),
            name: name.into(),
        }
    }

    #[tokio::test]
    async fn test_repository_scope_name_includes_owner() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_repository(Repository {
                metadata: ObjectMeta::new("ci", "app"),
                spec: RepositorySpec {
                    owner: "acme".into(),
                    credentials_ref: "github-pat".into(),
                    webhook_secret_ref: None,
                },
                status: ScopeStatus {
                    id: "repo-1".into(),
                    pool_manager_is_running: true,
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        let resolver = ScopeResolver::new(store);
        let scope = resolver
            .resolve(&scope_ref("Repository", "app"), "ci")
            .await
            .unwrap();

        assert_eq!(scope.kind(), ScopeKind::Repository);
        assert_eq!(scope.id(), "repo-1");
        assert_eq!(scope.name(), "acme/app");
        assert_eq!(scope.credentials_name(), "github-pat");
        assert!(scope.pool_manager_is_running());
    }

    #[tokio::test]
    async fn test_unknown_kind_is_rejected() {
        let resolver = ScopeResolver::new(Arc::new(InMemoryStore::new()));
        let err = resolver
            .resolve(&scope_ref("Team", "platform"), "ci")
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::UnsupportedScopeKind(_)));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_missing_scope_is_reported() {
        let resolver = ScopeResolver::new(Arc::new(InMemoryStore::new()));
        let err = resolver
            .resolve(&scope_ref("Organization", "acme"), "ci")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::ScopeNotFound {
                kind: ScopeKind::Organization,
                ..
            }
        ));
    }
}
