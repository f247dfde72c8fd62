//! Error types shared by the store, module and mutation layers.

/// Errors raised by simplux.
///
/// Configuration errors (duplicate names, non-serializable arguments, nested
/// dispatch) are always returned. Usage errors (missing mutations, missing
/// store, stale cleanup) are only returned in [`Mode::Development`] and are
/// logged and tolerated in [`Mode::Production`].
///
/// [`Mode::Development`]: crate::Mode::Development
/// [`Mode::Production`]: crate::Mode::Production
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A module with this name was already created on the registry.
    #[error("a module with name '{0}' already exists")]
    DuplicateModule(String),

    /// A mutation with this name was already created for the module.
    #[error("mutation '{mutation}' is already defined for module '{module}'")]
    DuplicateMutation { module: String, mutation: String },

    /// The mutation arguments could not be serialized.
    #[error(
        "mutation '{mutation}' was called with a non-serializable argument; mutation arguments must be serializable"
    )]
    NonSerializableArgument {
        mutation: String,
        #[source]
        source: serde_json::Error,
    },

    /// A mutation was called directly while another one was being dispatched.
    #[error(
        "mutation '{mutation}' was attempted to be dispatched from within mutation '{in_flight}' which is not allowed; instead use '{mutation}.with_state(...)' to call the mutation without a dispatch"
    )]
    NestedDispatch { mutation: String, in_flight: String },

    /// A mutation action reached a module that does not define the mutation.
    #[error("mutation '{mutation}' does not exist in module '{module}'")]
    MissingMutation { module: String, mutation: String },

    /// No store is installed on the registry.
    #[error("simplux must be initialized with a store")]
    StoreNotInitialized,

    /// A cleanup handle was invoked after a newer store replaced its store.
    #[error(
        "cannot cleanup store with generation {generation} since a newer store with generation {active} is active"
    )]
    StaleStoreCleanup { generation: u64, active: u64 },

    /// A superseded store proxy was asked to register a reducer.
    #[error("store proxy with generation {generation} has been replaced by generation {active}")]
    StaleStoreProxy { generation: u64, active: u64 },

    /// A reducer tried to dispatch to the store it is reducing for.
    #[error("reducers may not dispatch actions")]
    ReducerDispatch,

    /// The state of a module could not be converted to or from JSON.
    #[error("failed to convert state of module '{module}'")]
    State {
        module: String,
        #[source]
        source: serde_json::Error,
    },

    /// The arguments carried by a mutation action did not match the mutation.
    #[error("invalid arguments for mutation '{mutation}'")]
    InvalidArguments {
        mutation: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
