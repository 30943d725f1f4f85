//! Runner reconciler
//!
//! Keeps each Runner mirror in line with the backend instance it names.
//! Mirrors are created by the poller; this reconciler refreshes their
//! status, drops mirrors whose instance is gone, and deletes the backend
//! instance when a mirror is deleted by the user.

use crate::config::ReconcilerConfig;
use crate::controller::{Action, Reconciler};
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use garm_client::GarmClient;
use garm_store::Store;
use garm_types::{ObjectKey, Runner, RunnerStatus, RUNNER_FINALIZER};
use std::sync::Arc;
use tracing::{debug, info};

pub struct RunnerReconciler {
    store: Arc<dyn Store>,
    garm: Arc<dyn GarmClient>,
    config: ReconcilerConfig,
}

impl RunnerReconciler {
    pub fn new(store: Arc<dyn Store>, garm: Arc<dyn GarmClient>, config: ReconcilerConfig) -> Self {
        Self {
            store,
            garm,
            config,
        }
    }

    async fn sync(&self, mut runner: Runner) -> Result<Action> {
        if runner.metadata.is_deleting() {
            let name = runner.instance_name().to_string();
            match self.garm.delete_instance(&name).await {
                Ok(()) => info!(runner = %name, "Deleted backend instance"),
                Err(e) if e.is_not_found() => debug!(runner = %name, "Backend instance already gone"),
                Err(e) => return Err(e.into()),
            }
            if runner.metadata.remove_finalizer(RUNNER_FINALIZER) {
                self.store.update_runner(&runner).await?;
            }
            return Ok(Action::await_change());
        }

        let key = runner.metadata.key();
        match self.garm.get_instance_by_name(runner.instance_name()).await {
            Ok(instance) => {
                let status = RunnerStatus::from(&instance);
                if status != runner.status {
                    debug!(
                        instance_status = ?status.instance_status,
                        runner_status = ?status.runner_status,
                        "Runner status changed"
                    );
                    self.store.update_runner_status(&key, &status).await?;
                }
                Ok(Action::await_change())
            }
            Err(e) if e.is_not_found() => {
                info!(runner = %runner.instance_name(), "Backend instance gone, removing mirror");
                if runner.metadata.remove_finalizer(RUNNER_FINALIZER)
                    && self.store.update_runner(&runner).await?.is_none()
                {
                    return Ok(Action::await_change());
                }
                match self.store.delete_runner(&key).await {
                    Ok(()) => Ok(Action::await_change()),
                    Err(e) if e.is_not_found() => Ok(Action::await_change()),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Reconciler for RunnerReconciler {
    fn name(&self) -> &'static str {
        "runner"
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        let Some(runner) = self.store.get_runner(key).await? else {
            debug!("Runner mirror no longer exists");
            return Ok(Action::await_change());
        };

        let deadline = self.config.pass_timeout;
        tokio::time::timeout(deadline, self.sync(runner))
            .await
            .unwrap_or(Err(ReconcileError::Timeout(deadline)))
    }
}
