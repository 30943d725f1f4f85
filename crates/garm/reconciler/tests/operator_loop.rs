//! Controllers, event router and poller wired together

use chrono::Utc;
use garm_client::InMemoryGarm;
use garm_reconciler::{
    Backoff, Controller, EventRouter, PoolReconciler, ReconcilerConfig, RunnerPoller,
    RunnerReconciler, WorkQueue,
};
use garm_store::{ImageStore, InMemoryStore, PoolStore, RunnerStore, ScopeStore};
use garm_types::{
    Image, ImageSpec, Instance, InstanceStatus, ObjectKey, ObjectMeta, Organization, Pool,
    PoolSpec, PoolStatus, RunnerState, ScopeKind, ScopeRef, ScopeSpec, ScopeStatus,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test(start_paused = true)]
async fn test_declared_pool_converges_and_runners_are_mirrored() {
    let store = Arc::new(InMemoryStore::new());
    let garm = Arc::new(InMemoryGarm::new());
    garm.register_scope(ScopeKind::Organization, "org-1", "acme")
        .await;

    let config = ReconcilerConfig::default();
    let pool_queue = WorkQueue::new(Backoff::default());
    let runner_queue = WorkQueue::new(Backoff::default());
    let cancel = CancellationToken::new();

    let pools = Controller::new(
        Arc::new(PoolReconciler::new(store.clone(), garm.clone(), config.clone())),
        pool_queue.clone(),
        2,
    );
    let runners = Controller::new(
        Arc::new(RunnerReconciler::new(store.clone(), garm.clone(), config)),
        runner_queue.clone(),
        2,
    );
    let (runner_keys, poller) =
        RunnerPoller::new(store.clone(), garm.clone(), Duration::from_secs(1))
            .spawn(cancel.clone());
    let router = EventRouter::new(store.clone(), pool_queue, runner_queue);

    let events = store.subscribe();
    let tasks = vec![
        tokio::spawn(pools.run(cancel.clone())),
        tokio::spawn(runners.run(cancel.clone())),
        tokio::spawn(router.run(events, runner_keys, cancel.clone())),
        poller,
    ];

    store
        .put_image(Image {
            metadata: ObjectMeta::new("ci", "ubuntu"),
            spec: ImageSpec {
                tag: "ubuntu:22.04".into(),
            },
        })
        .await
        .unwrap();
    // Scope has not synced yet
    store
        .put_organization(Organization {
            metadata: ObjectMeta::new("ci", "acme"),
            spec: ScopeSpec::default(),
            status: ScopeStatus::default(),
        })
        .await
        .unwrap();
    store
        .create_pool(Pool {
            metadata: ObjectMeta::new("ci", "linux"),
            spec: PoolSpec {
                github_scope_ref: ScopeRef {
                    kind: "Organization".into(),
                    name: "acme".into(),
                },
                provider_name: "lxd".into(),
                max_runners: 4,
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
            status: PoolStatus::default(),
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(garm.pools().await.is_empty());

    // Scope syncs; the scope event re-queues the pool
    store
        .put_organization(Organization {
            metadata: ObjectMeta::new("ci", "acme"),
            spec: ScopeSpec::default(),
            status: ScopeStatus {
                id: "org-1".into(),
                pool_manager_is_running: true,
                ..Default::default()
            },
        })
        .await
        .unwrap();

    let key = ObjectKey::new("ci", "linux");
    assert!(
        eventually(|| async {
            store
                .get_pool(&key)
                .await
                .unwrap()
                .map(|p| p.status.conditions.is_ready())
                .unwrap_or(false)
        })
        .await
    );
    let pools_now = garm.pools().await;
    assert_eq!(pools_now.len(), 1);
    let pool_id = pools_now[0].id.clone();

    garm.insert_instance(Instance {
        id: "i-1".into(),
        name: "Garm-Runner1".into(),
        pool_id: pool_id.clone(),
        status: InstanceStatus::Running,
        runner_status: RunnerState::Idle,
        updated_at: Utc::now(),
        ..Default::default()
    })
    .await;

    let runner_key = ObjectKey::new("ci", "garm-runner1");
    assert!(
        eventually(|| async {
            store
                .get_runner(&runner_key)
                .await
                .unwrap()
                .map(|r| r.status.pool_id == pool_id)
                .unwrap_or(false)
        })
        .await
    );

    garm.remove_pool(&pool_id).await;
    assert!(
        eventually(|| async { store.get_runner(&runner_key).await.unwrap().is_none() }).await
    );

    cancel.cancel();
    for task in tasks {
        task.await.unwrap();
    }
}
