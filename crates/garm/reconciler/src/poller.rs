//! Runner poller
//!
//! The backend does not push runner changes, so the poller lists the
//! instances of every pool with a backend ID on a fixed interval. Missing
//! mirrors are created and a reconcile key is emitted for every runner seen
//! and for every mirror whose instance was not seen.

use crate::error::Result;
use garm_client::GarmClient;
use garm_store::Store;
use garm_types::{ObjectKey, ObjectMeta, Runner, RunnerStatus, RUNNER_FINALIZER};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct RunnerPoller {
    store: Arc<dyn Store>,
    garm: Arc<dyn GarmClient>,
    interval: Duration,
}

impl RunnerPoller {
    pub fn new(store: Arc<dyn Store>, garm: Arc<dyn GarmClient>, interval: Duration) -> Self {
        Self {
            store,
            garm,
            interval,
        }
    }

    /// Start polling; the returned channel closes once `cancel` fires
    pub fn spawn(self, cancel: CancellationToken) -> (mpsc::Receiver<ObjectKey>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(256);
        let handle = tokio::spawn(self.run(tx, cancel));
        (rx, handle)
    }

    async fn run(self, tx: mpsc::Sender<ObjectKey>, cancel: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval = ?self.interval, "Runner poller started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.poll_once(&tx).await {
                        Ok(emitted) => tracing::trace!(emitted, "Runner poll complete"),
                        Err(e) if tx.is_closed() => {
                            tracing::debug!(error = %e, "Runner event consumer gone");
                            break;
                        }
                        Err(e) => tracing::warn!(error = %e, "Runner poll failed, skipping tick"),
                    }
                    if tx.is_closed() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Runner poller stopped");
    }

    /// One listing pass; returns the number of keys emitted
    pub async fn poll_once(&self, tx: &mpsc::Sender<ObjectKey>) -> Result<usize> {
        let mut seen = HashSet::new();

        for pool in self.store.list_pools().await? {
            if !pool.has_backend_id() {
                continue;
            }
            let instances = match self.garm.list_pool_instances(&pool.status.id).await {
                Ok(instances) => instances,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };

            for instance in instances {
                let key = ObjectKey::new(
                    pool.metadata.namespace.clone(),
                    Runner::object_name(&instance.name),
                );
                if self.store.get_runner(&key).await?.is_none() {
                    let mut metadata = ObjectMeta::new(key.namespace.clone(), key.name.clone());
                    metadata.add_finalizer(RUNNER_FINALIZER);
                    let runner = Runner {
                        metadata,
                        status: RunnerStatus::from(&instance),
                    };
                    match self.store.create_runner(runner).await {
                        Ok(()) => tracing::debug!(runner = %instance.name, "Mirrored new runner"),
                        Err(garm_store::StoreError::Conflict { .. }) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                seen.insert(key);
            }
        }

        let vanished: Vec<ObjectKey> = self
            .store
            .list_runners()
            .await?
            .into_iter()
            .map(|r| r.metadata.key())
            .filter(|key| !seen.contains(key))
            .collect();

        let mut emitted = 0;
        for key in seen.into_iter().chain(vanished) {
            if tx.send(key).await.is_err() {
                break;
            }
            emitted += 1;
        }
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use garm_client::InMemoryGarm;
    use garm_store::{InMemoryStore, PoolStore, RunnerStore};
    use garm_types::{
        GarmPool, Instance, InstanceStatus, Pool, PoolSpec, PoolStatus, RunnerState, ScopeRef,
    };

    fn pool(id: &str) -> Pool {
        Pool {
            metadata: ObjectMeta::new("ci", "linux-small"),
            spec: PoolSpec {
                github_scope_ref: ScopeRef {
                    kind: "Organization".into(),
                    name: "acme".into(),
                },
                provider_name: "lxd".into(),
                max_runners: 5,
                min_idle_runners: 1,
                image_name: "ubuntu".into(),
                flavor: "small".into(),
                os_type: "linux".into(),
                os_arch: "amd64".into(),
                tags: vec![],
                enabled: true,
                runner_bootstrap_timeout: 20,
                extra_specs: String::new(),
                github_runner_group: String::new(),
                runner_prefix: String::new(),
            },
            status: PoolStatus {
                id: id.into(),
                ..Default::default()
            },
        }
    }

    fn instance(name: &str) -> Instance {
        Instance {
            id: format!("id-{}", name),
            name: name.into(),
            pool_id: "pool-1".into(),
            status: InstanceStatus::Running,
            runner_status: RunnerState::Idle,
            updated_at: Utc::now(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_poll_mirrors_instances_and_flags_vanished() {
        let store = Arc::new(InMemoryStore::new());
        let garm = Arc::new(InMemoryGarm::new());
        store.create_pool(pool("pool-1")).await.unwrap();
        garm.insert_pool(GarmPool {
            id: "pool-1".into(),
            ..Default::default()
        })
        .await;
        garm.insert_instance(instance("Garm-One")).await;

        let mut stale = ObjectMeta::new("ci", "garm-stale");
        stale.add_finalizer(RUNNER_FINALIZER);
        store
            .create_runner(Runner {
                metadata: stale,
                status: RunnerStatus::default(),
            })
            .await
            .unwrap();

        let poller = RunnerPoller::new(store.clone(), garm, Duration::from_secs(5));
        let (tx, mut rx) = mpsc::channel(16);
        assert_eq!(poller.poll_once(&tx).await.unwrap(), 2);

        let mirrored = store
            .get_runner(&ObjectKey::new("ci", "garm-one"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(mirrored.status.name, "Garm-One");
        assert!(mirrored.metadata.has_finalizer(RUNNER_FINALIZER));

        let mut keys = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        keys.sort();
        assert_eq!(
            keys,
            vec![ObjectKey::new("ci", "garm-one"), ObjectKey::new("ci", "garm-stale")]
        );
    }

    #[tokio::test]
    async fn test_unreachable_backend_skips_tick() {
        let store = Arc::new(InMemoryStore::new());
        let garm = Arc::new(InMemoryGarm::new());
        store.create_pool(pool("pool-1")).await.unwrap();
        garm.set_unavailable(true).await;

        let poller = RunnerPoller::new(store, garm, Duration::from_secs(5));
        let (tx, _rx) = mpsc::channel(16);
        assert!(poller.poll_once(&tx).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_closes_channel() {
        let poller = RunnerPoller::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryGarm::new()),
            Duration::from_secs(5),
        );
        let cancel = CancellationToken::new();
        let (mut rx, handle) = poller.spawn(cancel.clone());

        cancel.cancel();
        handle.await.unwrap();
        assert!(rx.recv().await.is_none());
    }
}
