//! Wires store, backend client, controllers and poller together

use crate::config::OperatorConfig;
use crate::error::OperatorResult;
use crate::manifest;
use futures::future::join_all;
use garm_client::{GarmClient, HttpGarmClient};
use garm_reconciler::{
    Controller, EventRouter, PoolReconciler, RunnerPoller, RunnerReconciler, WorkQueue,
};
use garm_store::{InMemoryStore, Store};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Operator {
    config: OperatorConfig,
    store: Arc<InMemoryStore>,
    garm: Arc<dyn GarmClient>,
}

impl Operator {
    /// Connect to the backend and load declared manifests
    pub async fn new(config: OperatorConfig) -> OperatorResult<Self> {
        let garm: Arc<dyn GarmClient> =
            Arc::new(HttpGarmClient::connect(&config.client_config()).await?);
        Self::with_client(config, garm).await
    }

    pub async fn with_client(
        config: OperatorConfig,
        garm: Arc<dyn GarmClient>,
    ) -> OperatorResult<Self> {
        let store = Arc::new(InMemoryStore::new());

        for path in &config.operator.manifests {
            let manifests = manifest::load_path(Path::new(path))?;
            let applied = manifest::apply(store.as_ref(), manifests).await?;
            tracing::info!(path = %path, resources = applied, "Loaded manifests");
        }

        Ok(Self {
            config,
            store,
            garm,
        })
    }

    #[cfg(test)]
    pub fn store(&self) -> Arc<InMemoryStore> {
        self.store.clone()
    }

    /// Run every loop until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> OperatorResult<()> {
        let store: Arc<dyn Store> = self.store.clone();
        let reconciler_config = self.config.reconciler_config();
        let workers = self.config.operator.workers;

        let pool_queue = WorkQueue::new(self.config.backoff());
        let runner_queue = WorkQueue::new(self.config.backoff());

        let pools = Controller::new(
            Arc::new(PoolReconciler::new(
                store.clone(),
                self.garm.clone(),
                reconciler_config.clone(),
            )),
            pool_queue.clone(),
            workers,
        );
        let runners = Controller::new(
            Arc::new(RunnerReconciler::new(
                store.clone(),
                self.garm.clone(),
                reconciler_config,
            )),
            runner_queue.clone(),
            workers,
        );

        let (runner_keys, poller) = RunnerPoller::new(
            store.clone(),
            self.garm.clone(),
            self.config.runner_poll_interval(),
        )
        .spawn(cancel.clone());

        let events = self.store.subscribe();
        let router = EventRouter::new(store, pool_queue, runner_queue);
        router.resync().await?;

        tracing::info!(workers, "GARM operator running");

        let handles = vec![
            tokio::spawn(pools.run(cancel.clone())),
            tokio::spawn(runners.run(cancel.clone())),
            tokio::spawn(router.run(events, runner_keys, cancel.clone())),
            poller,
        ];

        cancel.cancelled().await;
        tracing::info!("GARM operator shutting down");

        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Task failed during shutdown");
            }
        }
        Ok(())
    }
}

/// Graceful shutdown signal handler
pub async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();
}
