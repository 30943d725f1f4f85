//! Routes store changes and poller keys onto the controller queues
//!
//! A changed Image re-queues every Pool in its namespace that names it;
//! a changed scope re-queues the Pools that reference it.

use crate::error::Result;
use crate::queue::WorkQueue;
use garm_store::{Store, StoreEvent};
use garm_types::{ObjectKey, ResourceKind, ScopeKind};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

pub struct EventRouter {
    store: Arc<dyn Store>,
    pools: WorkQueue<ObjectKey>,
    runners: WorkQueue<ObjectKey>,
}

impl EventRouter {
    pub fn new(
        store: Arc<dyn Store>,
        pools: WorkQueue<ObjectKey>,
        runners: WorkQueue<ObjectKey>,
    ) -> Self {
        Self {
            store,
            pools,
            runners,
        }
    }

    /// Enqueue every known Pool and Runner
    pub async fn resync(&self) -> Result<()> {
        for pool in self.store.list_pools().await? {
            self.pools.add(pool.metadata.key()).await;
        }
        for runner in self.store.list_runners().await? {
            self.runners.add(runner.metadata.key()).await;
        }
        Ok(())
    }

    pub async fn route(&self, event: &StoreEvent) -> Result<()> {
        match event.kind {
            ResourceKind::Pool => self.pools.add(event.key.clone()).await,
            ResourceKind::Runner => self.runners.add(event.key.clone()).await,
            ResourceKind::Image => {
                let pools = self
                    .store
                    .list_pools_by_image(&event.key.namespace, &event.key.name)
                    .await?;
                tracing::debug!(image = %event.key, pools = pools.len(), "Image changed");
                for pool in pools {
                    self.pools.add(pool.metadata.key()).await;
                }
            }
            ResourceKind::Enterprise | ResourceKind::Organization | ResourceKind::Repository => {
                for pool in self.store.list_pools().await? {
                    let scope_ref = &pool.spec.github_scope_ref;
                    let same_kind = scope_ref
                        .kind
                        .parse::<ScopeKind>()
                        .map(|kind| kind.resource_kind() == event.kind)
                        .unwrap_or(false);
                    if same_kind
                        && scope_ref.name == event.key.name
                        && pool.metadata.namespace == event.key.namespace
                    {
                        self.pools.add(pool.metadata.key()).await;
                    }
                }
            }
        }
        Ok(())
    }

    /// Forward until cancelled or both sources close
    pub async fn run(
        self,
        mut events: broadcast::Receiver<StoreEvent>,
        mut runner_keys: mpsc::Receiver<ObjectKey>,
        cancel: CancellationToken,
    ) {
        let mut events_open = true;
        let mut poller_open = true;

        while events_open || poller_open {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv(), if events_open => match event {
                    Ok(event) => {
                        if let Err(e) = self.route(&event).await {
                            tracing::warn!(kind = %event.kind, key = %event.key, error = %e, "Failed to route store event");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Store events lagged, resyncing");
                        if let Err(e) = self.resync().await {
                            tracing::warn!(error = %e, "Resync failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => events_open = false,
                },
                key = runner_keys.recv(), if poller_open => match key {
                    Some(key) => self.runners.add(key).await,
                    None => poller_open = false,
                },
            }
        }

        tracing::debug!("Event router stopped");
    }
}
