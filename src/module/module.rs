use crate::error::{Error, Result};
use crate::module::extension::{Capabilities, Extensions, ModuleExtension};
use crate::module::reducer::module_reducer;
use crate::module::{MockTable, MutationTable};
use crate::runtime::Registry;
use crate::store::{Action, Reducer, Subscription};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

/// Types that can be held as module state.
pub trait ModuleState: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> ModuleState for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Configuration of a module.
#[derive(Debug, Clone)]
pub struct ModuleConfig<T> {
    /// Unique name of the module on its registry.
    pub name: String,
    pub initial_state: T,
    /// Extensions applied to this module only, in addition to the
    /// registry's.
    pub extensions: Extensions,
}

impl<T> ModuleConfig<T> {
    pub fn new(name: impl Into<String>, initial_state: T) -> Self {
        Self {
            name: name.into(),
            initial_state,
            extensions: Extensions::new(),
        }
    }

    pub fn with_extension<E: ModuleExtension>(self, extension: E, order: i32) -> Self {
        self.extensions.register(extension, order);
        self
    }
}

/// The untyped part of a module, shared with extensions and mutations.
///
/// Application code should go through [`Module`]; this is the surface that
/// extensions build on.
#[derive(Clone)]
pub struct ModuleCore {
    name: Arc<str>,
    registry: Registry,
    initial_state: Value,
    reducer: Reducer<Value>,
    mutations: MutationTable,
    mocks: MockTable,
}

impl ModuleCore {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn initial_state(&self) -> &Value {
        &self.initial_state
    }

    /// The reducer currently registered for this module.
    pub fn reducer(&self) -> Reducer<Value> {
        self.registry
            .reducer(&self.name)
            .unwrap_or_else(|| Arc::clone(&self.reducer))
    }

    /// Replace the reducer registered for this module.
    pub fn set_reducer(&self, reducer: Reducer<Value>) -> Result<()> {
        self.registry.set_reducer(&self.name, reducer)
    }

    pub fn mutations(&self) -> &MutationTable {
        &self.mutations
    }

    pub fn mocks(&self) -> &MockTable {
        &self.mocks
    }

    pub fn dispatch(&self, action: Action) -> Result<()> {
        self.registry.dispatch(action)
    }

    /// This module's slice of the installed store, or its initial state.
    pub fn state(&self) -> Result<Value> {
        let root = self.registry.get_state()?;
        Ok(root
            .get(&*self.name)
            .cloned()
            .unwrap_or_else(|| self.initial_state.clone()))
    }
}

impl std::fmt::Debug for ModuleCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCore")
            .field("name", &self.name)
            .field("mutations", &self.mutations)
            .field("mocks", &self.mocks)
            .finish()
    }
}

struct ModuleInner<T> {
    core: ModuleCore,
    initial_state: T,
    capabilities: Capabilities,
}

/// A named slice of state with typed access.
///
/// Cloning a module is cheap; clones refer to the same slice.
pub struct Module<T> {
    inner: Arc<ModuleInner<T>>,
}

impl<T> Clone for Module<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ModuleState> Module<T> {
    pub fn name(&self) -> &str {
        self.inner.core.name()
    }

    pub fn initial_state(&self) -> &T {
        &self.inner.initial_state
    }

    /// Get the current state of the module.
    pub fn get_state(&self) -> Result<T> {
        let slice = self.inner.core.state()?;
        decode(self.name(), slice)
    }

    /// Replace the state of the module.
    pub fn set_state(&self, state: T) -> Result<()> {
        let value = serde_json::to_value(&state).map_err(|source| Error::State {
            module: self.name().to_string(),
            source,
        })?;
        self.inner
            .core
            .dispatch(Action::set_state(self.name(), value))
    }

    /// Call `handler` with the new state whenever this module's state changes.
    ///
    /// Dispatches that leave the slice equal to what the handler saw last do
    /// not call it. The subscription follows the registry across store swaps.
    pub fn subscribe_to_state_changes<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let core = &self.inner.core;
        let registry = core.registry().downgrade();
        let name = core.name.clone();
        let initial_state = self.inner.initial_state.clone();
        let last_seen = Mutex::new(
            core.registry()
                .get_state()
                .ok()
                .and_then(|root| root.get(&*name).cloned()),
        );

        core.registry().subscribe(move || {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            let slice = match registry.get_state() {
                Ok(root) => root.get(&*name).cloned(),
                Err(err) => {
                    tracing::warn!(module = %name, error = %err, "cannot read state for change handler");
                    return;
                }
            };

            {
                let mut last_seen = last_seen.lock().unwrap_or_else(PoisonError::into_inner);
                let current = slice.clone();
                if *last_seen == current {
                    return;
                }
                *last_seen = current;
            }

            let state = match slice {
                Some(slice) => match decode::<T>(&name, slice) {
                    Ok(state) => state,
                    Err(err) => {
                        tracing::warn!(module = %name, error = %err, "skipping change handler");
                        return;
                    }
                },
                None => initial_state.clone(),
            };
            handler(&state);
        })
    }

    /// A capability added by an extension.
    pub fn capability<C: 'static>(&self) -> Option<&C> {
        self.inner.capabilities.get::<C>()
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.inner.capabilities
    }

    /// Internal surface for extensions.
    #[doc(hidden)]
    pub fn internals(&self) -> &ModuleCore {
        &self.inner.core
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Module<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.inner.core.name)
            .field("initial_state", &self.inner.initial_state)
            .field("capabilities", &self.inner.capabilities)
            .finish()
    }
}

fn decode<T: ModuleState>(module: &str, slice: Value) -> Result<T> {
    serde_json::from_value(slice).map_err(|source| Error::State {
        module: module.to_string(),
        source,
    })
}

/// Create a module on `registry`.
///
/// Registers the module's reducer (initialising its slice when a store is
/// installed) and applies the registry's extensions followed by the ones in
/// `config`, ordered together.
pub fn create_module<T: ModuleState>(registry: &Registry, config: ModuleConfig<T>) -> Result<Module<T>> {
    let ModuleConfig {
        name,
        initial_state,
        extensions,
    } = config;

    let initial_value = serde_json::to_value(&initial_state).map_err(|source| Error::State {
        module: name.clone(),
        source,
    })?;

    registry.claim_module_name(&name)?;

    let mutations = MutationTable::default();
    let reducer = module_reducer(&name, initial_value.clone(), mutations.clone(), registry.mode());
    let core = ModuleCore {
        name: Arc::from(name.as_str()),
        registry: registry.clone(),
        initial_state: initial_value.clone(),
        reducer: Arc::clone(&reducer),
        mutations,
        mocks: MockTable::default(),
    };

    if let Err(err) = registry.set_reducer(&name, reducer) {
        registry.forget_module(&name);
        return Err(err);
    }

    let erased = ModuleConfig {
        name,
        initial_state: initial_value,
        extensions: extensions.clone(),
    };
    let capabilities = Extensions::apply(&[registry.extensions(), &extensions], &core, &erased);

    tracing::debug!(
        module = core.name(),
        capabilities = capabilities.len(),
        "module created"
    );

    Ok(Module {
        inner: Arc::new(ModuleInner {
            core,
            initial_state,
            capabilities,
        }),
    })
}
