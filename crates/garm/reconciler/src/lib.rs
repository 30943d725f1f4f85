//! GARM Reconciler - converges declared pools against a GARM server
//!
//! ## Pieces
//!
//! - [`scope`]: resolves a pool's Enterprise/Organization/Repository
//! - [`tags`]: canonical tag set including platform tags
//! - [`diff`]: comparable projection of declared vs backend pool
//! - [`autoscaler`]: idle runner eviction down to the declared floor
//! - [`pool`], [`runner`]: the reconcilers
//! - [`poller`]: periodic runner discovery
//! - [`queue`], [`controller`], [`watch`]: the work queue machinery
//!
//! Reconcilers are driven by [`Controller`]s. Each pass reads the current
//! object, talks to the backend through [`garm_client::GarmClient`] and
//! writes the outcome to the object's condition ledger.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod autoscaler;
pub mod config;
pub mod controller;
pub mod diff;
pub mod error;
pub mod poller;
pub mod pool;
pub mod queue;
pub mod runner;
pub mod scope;
pub mod tags;
pub mod watch;

pub use autoscaler::{ScaleOutcome, ScalePlan};
pub use config::ReconcilerConfig;
pub use controller::{Action, Controller, Reconciler};
pub use diff::{diff_pool, PoolDiff, PoolField, PoolProjection};
pub use error::{ReconcileError, Result};
pub use poller::RunnerPoller;
pub use pool::PoolReconciler;
pub use queue::{Backoff, WorkQueue};
pub use runner::RunnerReconciler;
pub use scope::{Scope, ScopeResolver};
pub use tags::normalize_tags;
pub use watch::EventRouter;
