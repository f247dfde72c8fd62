//! Runtime support for modules.
//!
//! This module provides the registry that routes modules to the installed
//! store, the per-store proxy, and the dispatch context used to reject
//! nested mutation dispatches.

mod context;
mod proxy;
mod registry;

pub(crate) use context::DispatchGuard;

pub use context::dispatching_mutation;
pub use proxy::StoreProxy;
pub use registry::{global, Registry, StoreCleanup};
