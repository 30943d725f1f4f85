//! GARM Store - access to declared resources
//!
//! The cluster store itself is an external collaborator. Reconcilers depend
//! only on the traits in [`traits`]; [`InMemoryStore`] provides the same
//! semantics in process for development and tests.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use traits::{ImageStore, PoolStore, RunnerStore, ScopeStore, Store, StoreEvent};
