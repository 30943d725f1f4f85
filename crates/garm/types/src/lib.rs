//! GARM Types - Core types for declarative runner pool reconciliation
//!
//! The operator converges the state of a GARM server (the backend) towards
//! resources declared in a cluster store. This crate holds the shapes both
//! sides agree on and nothing else.
//!
//! ## Key Concepts
//!
//! - **Pool**: Declared policy (image, flavor, size bounds) for a runner fleet
//! - **Scope**: The Enterprise, Organization or Repository a pool belongs to
//! - **Image**: Declared name resolved to a backend image tag
//! - **Runner**: Read-mostly mirror of one backend instance
//! - **Conditions**: Typed, timestamped status ledger on every resource
//! - **api**: Wire models spoken by the backend

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod api;
pub mod condition;
pub mod image;
pub mod meta;
pub mod pool;
pub mod runner;
pub mod scope;

// Re-export main types
pub use api::{
    Address, CreatePoolParams, GarmPool, Instance, InstanceStatus, RunnerState, Tag,
    UpdatePoolParams,
};
pub use condition::{Condition, ConditionReason, ConditionStatus, ConditionType, Conditions};
pub use image::{Image, ImageSpec};
pub use meta::{ObjectKey, ObjectMeta, Resource, ResourceKind};
pub use pool::{Pool, PoolSpec, PoolStatus, ScopeRef, POOL_FINALIZER};
pub use runner::{Runner, RunnerStatus, RUNNER_FINALIZER};
pub use scope::{
    Enterprise, Organization, Repository, RepositorySpec, ScopeKind, ScopeSpec, ScopeStatus,
    UnknownScopeKind,
};
