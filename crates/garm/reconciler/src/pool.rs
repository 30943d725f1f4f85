//! Pool reconciler
//!
//! Converges one declared Pool against the backend:
//! - guards cleanup with a finalizer
//! - resolves the owning scope and the image tag
//! - finds, adopts, creates or updates the backend pool
//! - evicts surplus long-idle runners
//! - drains and deletes the backend pool when the Pool is deleted
//!
//! Every outcome lands in the Pool's condition ledger before the pass
//! returns, errors included.

use crate::autoscaler;
use crate::config::ReconcilerConfig;
use crate::controller::{Action, Reconciler};
use crate::diff::{diff_pool, PoolField, PoolProjection};
use crate::error::{ReconcileError, Result};
use crate::scope::{Scope, ScopeResolver};
use async_trait::async_trait;
use chrono::Utc;
use garm_client::GarmClient;
use garm_store::Store;
use garm_types::{
    ConditionReason, ConditionType, GarmPool, Image, Instance, ObjectKey, Pool, Resource,
    RunnerState, ScopeKind, UpdatePoolParams, POOL_FINALIZER,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct PoolReconciler {
    store: Arc<dyn Store>,
    garm: Arc<dyn GarmClient>,
    scopes: ScopeResolver,
    config: ReconcilerConfig,
    /// Held while a pool without a backend ID picks or creates one
    claims: Mutex<()>,
}

impl PoolReconciler {
    pub fn new(store: Arc<dyn Store>, garm: Arc<dyn GarmClient>, config: ReconcilerConfig) -> Self {
        Self {
            scopes: ScopeResolver::new(store.clone()),
            store,
            garm,
            config,
            claims: Mutex::new(()),
        }
    }

    async fn persist_status(&self, pool: &Pool) -> Result<()> {
        match self.store.update_pool_status(&pool.key(), &pool.status).await {
            Ok(()) => Ok(()),
            // Removed while the pass was running
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Record `err` on the ledger and hand it back
    async fn record_failure(
        &self,
        pool: &mut Pool,
        reason: ConditionReason,
        err: ReconcileError,
    ) -> ReconcileError {
        let message = err.to_string();
        pool.status
            .conditions
            .mark_false(ConditionType::Ready, reason, message.clone());
        pool.status.last_sync_error = message;

        if let Err(e) = self.persist_status(pool).await {
            warn!(error = %e, "Failed to record pool failure");
        }
        err
    }

    async fn reconcile_normal(&self, pool: &mut Pool) -> Result<Action> {
        let scope = match self
            .scopes
            .resolve(&pool.spec.github_scope_ref, &pool.metadata.namespace)
            .await
        {
            Ok(scope) => scope,
            Err(e) => {
                pool.status.conditions.mark_false(
                    ConditionType::ScopeReference,
                    ConditionReason::FetchingScopeRefFailed,
                    e.to_string(),
                );
                return Err(e);
            }
        };

        if scope.id().is_empty() {
            let message = format!(
                "{} {} has no backend ID yet",
                scope.kind(),
                pool.spec.github_scope_ref.name
            );
            info!(scope = %pool.spec.github_scope_ref.name, "Scope not ready, waiting");
            pool.status.conditions.mark_false(
                ConditionType::ScopeReference,
                ConditionReason::ScopeRefNotReady,
                &message,
            );
            pool.status
                .conditions
                .mark_false(ConditionType::Ready, ConditionReason::ScopeRefNotReady, &message);
            self.persist_status(pool).await?;
            return Ok(Action::requeue(self.config.scope_retry));
        }
        pool.status.conditions.mark_true(
            ConditionType::ScopeReference,
            ConditionReason::FetchingScopeRefSuccess,
            "",
        );

        let image = match self.image(pool).await {
            Ok(image) => image,
            Err(e) => {
                pool.status.conditions.mark_false(
                    ConditionType::ImageReference,
                    ConditionReason::FetchingImageRefFailed,
                    e.to_string(),
                );
                return Err(e);
            }
        };
        pool.status.conditions.mark_true(
            ConditionType::ImageReference,
            ConditionReason::FetchingImageRefSuccess,
            "",
        );

        let desired = PoolProjection::desired(&pool.spec, &image.spec.tag, &scope)?;
        let pool_id = self.ensure_backend_pool(pool, &scope, &desired).await?;
        self.scale(pool, &pool_id).await?;

        pool.status
            .conditions
            .mark_true(ConditionType::Ready, ConditionReason::ReconcileSuccess, "");
        pool.status.last_sync_error.clear();
        self.persist_status(pool).await?;

        Ok(Action::requeue(self.config.sync_period))
    }

    async fn image(&self, pool: &Pool) -> Result<Image> {
        let key = ObjectKey::new(&pool.metadata.namespace, &pool.spec.image_name);
        self.store
            .get_image(&key)
            .await?
            .ok_or(ReconcileError::ImageNotFound(key))
    }

    /// Make sure a backend pool matching `desired` exists; returns its ID
    async fn ensure_backend_pool(
        &self,
        pool: &mut Pool,
        scope: &Scope,
        desired: &PoolProjection,
    ) -> Result<String> {
        if let Some(actual) = self.recorded_backend_pool(pool).await? {
            self.converge(&actual, desired).await?;
            return Ok(actual.id);
        }

        // Lookup, create and ID persistence must not interleave with
        // another pool's, or two pools could claim one backend pool.
        let _claim = self.claims.lock().await;

        if let Some(actual) = self.unclaimed_backend_pool(pool, desired).await? {
            info!(pool_id = %actual.id, "Adopted existing backend pool");
            pool.status.id = actual.id.clone();
            self.persist_status(pool).await?;
            self.converge(&actual, desired).await?;
            return Ok(actual.id);
        }

        let params = desired.create_params(&pool.spec.provider_name);
        let created = match scope.kind() {
            ScopeKind::Enterprise => self.garm.create_enterprise_pool(scope.id(), &params).await?,
            ScopeKind::Organization => {
                self.garm
                    .create_organization_pool(scope.id(), &params)
                    .await?
            }
            ScopeKind::Repository => self.garm.create_repository_pool(scope.id(), &params).await?,
        };
        info!(pool_id = %created.id, scope = %scope.name(), "Created backend pool");

        pool.status.id = created.id.clone();
        self.persist_status(pool).await?;
        Ok(created.id)
    }

    /// Push `desired` to an existing backend pool when they differ
    async fn converge(&self, actual: &GarmPool, desired: &PoolProjection) -> Result<()> {
        let diff = diff_pool(desired, &PoolProjection::actual(actual));
        if diff.contains(PoolField::Scope) {
            warn!(
                pool_id = %actual.id,
                "Backend pool reports a different scope; scope cannot be updated"
            );
        }
        if diff.requires_update() {
            info!(pool_id = %actual.id, fields = %diff, "Updating backend pool");
            self.garm
                .update_pool(&actual.id, &desired.update_params())
                .await?;
        } else {
            debug!(pool_id = %actual.id, "Backend pool up to date");
        }
        Ok(())
    }

    /// Backend pool by recorded ID; a stale ID is cleared
    async fn recorded_backend_pool(&self, pool: &mut Pool) -> Result<Option<GarmPool>> {
        if !pool.has_backend_id() {
            return Ok(None);
        }
        match self.garm.get_pool(&pool.status.id).await {
            Ok(found) => Ok(Some(found)),
            Err(e) if e.is_not_found() => {
                warn!(pool_id = %pool.status.id, "Recorded backend pool no longer exists");
                pool.status.id.clear();
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// A lookalike backend pool no other declared pool has recorded
    async fn unclaimed_backend_pool(
        &self,
        pool: &Pool,
        desired: &PoolProjection,
    ) -> Result<Option<GarmPool>> {
        let key = pool.key();
        let claimed: HashSet<String> = self
            .store
            .list_pools()
            .await?
            .into_iter()
            .filter(|other| other.key() != key && other.has_backend_id())
            .map(|other| other.status.id)
            .collect();

        Ok(self
            .garm
            .list_pools()
            .await?
            .into_iter()
            .find(|candidate| {
                !claimed.contains(&candidate.id)
                    && desired.identifies(&pool.spec.provider_name, candidate)
            }))
    }

    /// Evict surplus idle runners and refresh the runner counts
    async fn scale(&self, pool: &mut Pool, pool_id: &str) -> Result<()> {
        let instances = self.garm.list_pool_instances(pool_id).await?;
        let plan = autoscaler::plan(
            &instances,
            pool.spec.min_idle_runners,
            self.config.min_idle_runner_age(),
            Utc::now(),
        );
        if !plan.evict.is_empty() {
            info!(
                candidates = plan.candidates,
                evicting = plan.evict.len(),
                min_idle_runners = pool.spec.min_idle_runners,
                "Scaling down idle runners"
            );
        }

        let outcome = autoscaler::evict(self.garm.as_ref(), &plan).await;
        if !outcome.failed.is_empty() {
            warn!(failed = outcome.failed.len(), "Some idle runners were not evicted");
        }

        let remaining: Vec<&Instance> = instances
            .iter()
            .filter(|i| !outcome.evicted.contains(&i.name))
            .collect();
        let with_state =
            |state: RunnerState| count(remaining.iter().filter(|i| i.runner_status == state).count());

        pool.status.long_running_idle_runners = outcome.long_running_idle;
        pool.status.idle_runners = with_state(RunnerState::Idle);
        pool.status.active_runners = with_state(RunnerState::Active);
        pool.status.runners = count(remaining.len());
        Ok(())
    }

    async fn reconcile_delete(&self, pool: &mut Pool) -> Result<Action> {
        info!("Deleting pool");
        pool.status.conditions.mark_false(
            ConditionType::Ready,
            ConditionReason::Deleting,
            "Pool is being deleted",
        );
        self.persist_status(pool).await?;

        if pool.has_backend_id() {
            let pool_id = pool.status.id.clone();
            self.drain_backend_pool(&pool_id).await?;
            info!(pool_id = %pool_id, "Backend pool deleted");
        }

        if pool.metadata.remove_finalizer(POOL_FINALIZER) {
            self.store.update_pool(pool).await?;
        }
        Ok(Action::await_change())
    }

    /// Stop the backend pool from spawning, remove idle runners, delete it
    async fn drain_backend_pool(&self, pool_id: &str) -> Result<()> {
        let disable = UpdatePoolParams {
            min_idle_runners: Some(0),
            enabled: Some(false),
            ..Default::default()
        };
        match self.garm.update_pool(pool_id, &disable).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                info!(pool_id = %pool_id, "Backend pool already gone");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let instances = match self.garm.list_pool_instances(pool_id).await {
            Ok(instances) => instances,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let plan = autoscaler::plan(&instances, 0, self.config.min_idle_runner_age(), Utc::now());
        autoscaler::evict(self.garm.as_ref(), &plan).await;

        match self.garm.delete_pool(pool_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(ReconcileError::DeletionFailed(e.to_string())),
        }
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[async_trait]
impl Reconciler for PoolReconciler {
    fn name(&self) -> &'static str {
        "pool"
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        let Some(mut pool) = self.store.get_pool(key).await? else {
            debug!("Pool no longer exists");
            return Ok(Action::await_change());
        };
        let deadline = self.config.pass_timeout;

        if pool.metadata.is_deleting() {
            let outcome = tokio::time::timeout(deadline, self.reconcile_delete(&mut pool))
                .await
                .unwrap_or(Err(ReconcileError::Timeout(deadline)));
            return match outcome {
                Ok(action) => Ok(action),
                Err(e) => Err(self
                    .record_failure(&mut pool, ConditionReason::DeletionFailed, e)
                    .await),
            };
        }

        if pool.metadata.add_finalizer(POOL_FINALIZER) {
            match self.store.update_pool(&pool).await? {
                Some(updated) => pool = updated,
                None => return Ok(Action::await_change()),
            }
        }

        let outcome = tokio::time::timeout(deadline, self.reconcile_normal(&mut pool))
            .await
            .unwrap_or(Err(ReconcileError::Timeout(deadline)));
        match outcome {
            Ok(action) => Ok(action),
            Err(e) => {
                let reason = e.reason();
                Err(self.record_failure(&mut pool, reason, e).await)
            }
        }
    }
}
