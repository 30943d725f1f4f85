//! Reconciler tuning

use std::time::Duration;

/// Timing knobs shared by the reconcilers
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Periodic resync of a healthy pool
    pub sync_period: Duration,

    /// Idle runners younger than this are never evicted
    pub min_idle_runner_age: Duration,

    /// Retry interval while a referenced scope has no backend ID
    pub scope_retry: Duration,

    /// Upper bound on one pass, backend calls included
    pub pass_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            sync_period: Duration::from_secs(300),
            min_idle_runner_age: Duration::from_secs(300),
            scope_retry: Duration::from_secs(10),
            pass_timeout: Duration::from_secs(60),
        }
    }
}

impl ReconcilerConfig {
    pub(crate) fn min_idle_runner_age(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.min_idle_runner_age)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100))
    }
}
