//! GARM Client - backend access for the operator
//!
//! The reconcilers only see the capability traits in [`traits`]. Two
//! implementations ship here:
//! - [`HttpGarmClient`]: talks to a real GARM server over REST
//! - [`InMemoryGarm`]: in-process backend that records every call

pub mod error;
pub mod http;
pub mod memory;
pub mod traits;

pub use error::{ClientError, Result};
pub use http::{GarmClientConfig, HttpGarmClient};
pub use memory::{GarmCall, InMemoryGarm};
pub use traits::{GarmClient, InstanceClient, PoolClient};
