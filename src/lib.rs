//! # Simplux
//!
//! Modules and mutations on top of a single, swappable state store.
//!
//! Simplux multiplexes independently defined state slices onto one
//! reducer-driven store:
//!
//! ## Modules
//!
//! A [`Module<T>`] is a named slice of the root state with typed
//! `get_state`/`set_state` access and change subscriptions. Extensions
//! registered on the [`Registry`] add capabilities to every module created
//! afterwards.
//!
//! ## Mutations
//!
//! A [`Mutation<T, A>`] turns a plain update function into an operation that
//! dispatches an action, can be applied to an explicit state with
//! [`with_state`](Mutation::with_state), produces its action without
//! dispatching, and can be mocked in tests with [`testing::mock_mutation`].
//!
//! ## Stores
//!
//! The [`Registry`] routes every module to the installed store. It starts
//! with an in-memory [`Store`]; [`Registry::set_store`] swaps in another
//! container, carrying over every module reducer and subscription.
//!
//! ```ignore
//! use serde::{Deserialize, Serialize};
//! use simplux::{create_module, ModuleConfig};
//!
//! #[derive(Clone, Default, Serialize, Deserialize)]
//! struct Counter {
//!     count: i64,
//! }
//!
//! let counter = create_module(ModuleConfig::new("counter", Counter::default()))?;
//! let increment = counter.create_mutation("increment", |state: &mut Counter, (): ()| {
//!     state.count += 1
//! })?;
//!
//! assert_eq!(increment.call(())?.count, 1);
//! ```

pub mod config;
pub mod error;
pub mod module;
pub mod mutation;
pub mod runtime;
pub mod store;
pub mod testing;

pub use config::{Config, Mode};
pub use error::{Error, Result};
pub use module::{
    Capabilities, ExtensionHandle, Module, ModuleConfig, ModuleCore, ModuleExtension, ModuleState,
    DEFAULT_EXTENSION_ORDER,
};
pub use mutation::{IntoNextState, Mutation, MutationArgs, MutationDefinitions, ResolvedMutations};
pub use runtime::{dispatching_mutation, global, Registry, StoreCleanup};
pub use store::{Action, Reducer, StateContainer, Store, Subscription};

use serde_json::Value;

/// Create a module on the [`global`] registry.
pub fn create_module<T: ModuleState>(config: ModuleConfig<T>) -> Result<Module<T>> {
    global().create_module(config)
}

/// Install `store` on the [`global`] registry.
pub fn set_store<C, F>(store: C, selector: F) -> StoreCleanup
where
    C: StateContainer,
    F: Fn(&C::State) -> Value + Send + Sync + 'static,
{
    global().set_store(store, selector)
}

/// The root reducer of the [`global`] registry.
pub fn root_reducer() -> Reducer<Value> {
    global().root_reducer()
}

/// Register an extension on the [`global`] registry.
///
/// `None` uses [`DEFAULT_EXTENSION_ORDER`].
pub fn register_module_extension<E: ModuleExtension>(
    extension: E,
    order: Option<i32>,
) -> ExtensionHandle {
    global().register_extension_with_order(extension, order.unwrap_or(DEFAULT_EXTENSION_ORDER))
}
