//! Runner fleet autoscaler
//!
//! Keeps the number of long-idle runners of a pool at its declared floor.
//! Planning is pure; [`evict`] applies a plan against the backend and
//! tolerates individual failures.

use chrono::{DateTime, Duration, Utc};
use garm_client::InstanceClient;
use garm_types::{Instance, InstanceStatus, RunnerState};
use tracing::{debug, info, warn};

/// Eligible for eviction: the runner is idle and its instance is up or broken
pub fn is_idle(instance: &Instance) -> bool {
    matches!(
        instance.status,
        InstanceStatus::Running | InstanceStatus::Error
    ) && instance.runner_status == RunnerState::Idle
}

/// Idle runners whose last update is older than `min_age`
pub fn long_running_idle<'a>(
    instances: &'a [Instance],
    min_age: Duration,
    now: DateTime<Utc>,
) -> Vec<&'a Instance> {
    instances
        .iter()
        .filter(|i| is_idle(i))
        .filter(|i| now.signed_duration_since(i.updated_at) > min_age)
        .collect()
}

/// Evictions for one pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScalePlan {
    /// Number of eviction candidates before any deletion
    pub candidates: usize,
    /// Idle runners past the grace age, whatever the floor
    pub long_running: Vec<String>,
    /// Runners to delete, in backend listing order
    pub evict: Vec<Instance>,
}

/// Decide which runners to delete
///
/// With a floor of zero every idle runner goes regardless of age. Otherwise
/// the first surplus long-running idle runners, in listing order, are
/// evicted so that exactly `min_idle_runners` of them remain.
pub fn plan(
    instances: &[Instance],
    min_idle_runners: u32,
    min_age: Duration,
    now: DateTime<Utc>,
) -> ScalePlan {
    let long_running = long_running_idle(instances, min_age, now);
    let candidates: Vec<&Instance> = if min_idle_runners == 0 {
        instances.iter().filter(|i| is_idle(i)).collect()
    } else {
        long_running.clone()
    };

    let floor = min_idle_runners as usize;
    let surplus = candidates.len().saturating_sub(floor);

    ScalePlan {
        candidates: candidates.len(),
        long_running: long_running.iter().map(|i| i.name.clone()).collect(),
        evict: candidates.into_iter().take(surplus).cloned().collect(),
    }
}

/// Result of applying a plan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScaleOutcome {
    /// Instances deleted or already gone
    pub evicted: Vec<String>,
    /// Instances whose deletion failed; retried next pass
    pub failed: Vec<String>,
    /// Long-running idle runners still present after this pass
    pub long_running_idle: u32,
}

/// Delete the planned runners, one call each
///
/// A runner the backend no longer knows counts as evicted. Any other
/// failure is logged and skipped.
pub async fn evict<C>(client: &C, plan: &ScalePlan) -> ScaleOutcome
where
    C: InstanceClient + ?Sized,
{
    let mut outcome = ScaleOutcome::default();

    for instance in &plan.evict {
        match client.delete_instance(&instance.name).await {
            Ok(()) => {
                info!(runner = %instance.name, "Evicted idle runner");
                outcome.evicted.push(instance.name.clone());
            }
            Err(e) if e.is_not_found() => {
                debug!(runner = %instance.name, "Runner already gone");
                outcome.evicted.push(instance.name.clone());
            }
            Err(e) => {
                warn!(runner = %instance.name, error = %e, "Failed to evict idle runner");
                outcome.failed.push(instance.name.clone());
            }
        }
    }

    let remaining = plan
        .long_running
        .iter()
        .filter(|name| !outcome.evicted.contains(name))
        .count();
    outcome.long_running_idle = u32::try_from(remaining).unwrap_or(u32::MAX);
    outcome
}
