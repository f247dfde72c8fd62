use crate::config::{Config, Mode};
use crate::error::{Error, Result};
use crate::module::{
    self, ExtensionHandle, Extensions, Module, ModuleConfig, ModuleExtension, ModuleState,
    DEFAULT_EXTENSION_ORDER,
};
use crate::runtime::StoreProxy;
use crate::store::{Action, Listener, Reducer, StateContainer, Store, Subscription};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, Weak};

struct RegistryInner {
    mode: Mode,
    active: RwLock<Option<Arc<StoreProxy>>>,
    // Generation of the active proxy, 0 when none is installed.
    active_generation: Arc<AtomicU64>,
    next_generation: AtomicU64,
    // Every reducer ever registered, including those registered while no
    // store was installed.
    reducers: RwLock<BTreeMap<String, Reducer<Value>>>,
    listeners: RwLock<BTreeMap<u64, Listener>>,
    next_listener: AtomicU64,
    modules: Mutex<HashSet<String>>,
    extensions: Extensions,
}

impl RegistryInner {
    fn active(&self) -> Option<Arc<StoreProxy>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn current_reducers(&self) -> BTreeMap<String, Reducer<Value>> {
        match self.active() {
            Some(proxy) => proxy.reducers(),
            None => self
                .reducers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

/// The indirection point between modules and the store currently in use.
///
/// Modules register their reducers and dispatch through the registry, never
/// through a store directly, so the store can be replaced at any time (for
/// example one store per server-side render) without recreating modules.
///
/// # Examples
///
/// ```
/// use simplux::{Config, ModuleConfig, Registry};
///
/// let registry = Registry::with_config(Config::development());
/// let counter = registry
///     .create_module(ModuleConfig::new("counter", 0_i64))
///     .unwrap();
///
/// assert_eq!(counter.get_state().unwrap(), 0);
/// ```
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// Create a registry configured from the environment with a default store.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let registry = Registry {
            inner: Arc::new(RegistryInner {
                mode: config.mode,
                active: RwLock::new(None),
                active_generation: Arc::new(AtomicU64::new(0)),
                next_generation: AtomicU64::new(0),
                reducers: RwLock::new(BTreeMap::new()),
                listeners: RwLock::new(BTreeMap::new()),
                next_listener: AtomicU64::new(0),
                modules: Mutex::new(HashSet::new()),
                extensions: Extensions::new(),
            }),
        };

        if config.default_store {
            match Store::new(registry.root_reducer()) {
                Ok(store) => {
                    registry.set_store(store, |state: &Value| state.clone());
                }
                Err(err) => tracing::warn!(error = %err, "failed to create default store"),
            }
        }

        registry
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Arc::downgrade(&self.inner))
    }

    /// Install `store` as the active store.
    ///
    /// `selector` maps the store's state to the simplux root state. Every
    /// known module reducer and every registry subscription moves over to the
    /// new store, and module slices are initialised by an init action. No
    /// state is carried over from the previous store.
    pub fn set_store<C, F>(&self, store: C, selector: F) -> StoreCleanup
    where
        C: StateContainer,
        F: Fn(&C::State) -> Value + Send + Sync + 'static,
    {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let proxy = Arc::new(StoreProxy::attach(
            generation,
            store,
            selector,
            Arc::clone(&self.inner.active_generation),
            self.inner.mode,
        ));

        let previous = self.inner.active();
        if let Some(previous) = &previous {
            proxy.adopt_reducers(previous.reducers());
        }
        proxy.adopt_reducers(
            self.inner
                .reducers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        );

        {
            let mut active = self.inner.active.write().unwrap_or_else(PoisonError::into_inner);
            *active = Some(Arc::clone(&proxy));
            self.inner
                .active_generation
                .store(generation, Ordering::SeqCst);
        }

        if let Some(previous) = previous {
            previous.detach_all();
        }

        let listeners: Vec<(u64, Listener)> = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();
        for (id, listener) in listeners {
            proxy.attach_listener(id, listener);
        }

        if let Err(err) = proxy.dispatch(Action::init()) {
            tracing::warn!(generation, error = %err, "failed to initialise module state in new store");
        }

        tracing::debug!(
            generation,
            modules = proxy.reducers().len(),
            subscriptions = proxy.attached_count(),
            "store installed"
        );

        StoreCleanup {
            registry: Arc::downgrade(&self.inner),
            generation,
            done: AtomicBool::new(false),
        }
    }

    /// The proxy of the installed store.
    ///
    /// Without a store this fails with [`Error::StoreNotInitialized`], except
    /// in production mode where a detached proxy with no-op behavior is
    /// returned.
    pub fn active_proxy(&self) -> Result<Arc<StoreProxy>> {
        if let Some(proxy) = self.inner.active() {
            return Ok(proxy);
        }

        if self.inner.mode.is_production() {
            tracing::warn!("no store installed; using a detached store proxy");
            return Ok(Arc::new(StoreProxy::detached(
                Arc::clone(&self.inner.active_generation),
                self.inner.mode,
            )));
        }

        Err(Error::StoreNotInitialized)
    }

    pub fn has_store(&self) -> bool {
        self.inner.active().is_some()
    }

    pub fn dispatch(&self, action: Action) -> Result<()> {
        self.active_proxy()?.dispatch(action)
    }

    /// The simplux root state of the installed store.
    pub fn get_state(&self) -> Result<Value> {
        Ok(self.active_proxy()?.state())
    }

    /// Subscribe to every dispatch on the installed store.
    ///
    /// The subscription follows the registry across store swaps.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::SeqCst);
        let listener: Listener = Arc::new(listener);

        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&listener));
        if let Some(proxy) = self.inner.active() {
            proxy.attach_listener(id, listener);
        }

        let registry = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = registry.upgrade() {
                inner
                    .listeners
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
                if let Some(proxy) = inner.active() {
                    proxy.detach_listener(id);
                }
            }
        })
    }

    /// Register the reducer of `module`.
    ///
    /// With a store installed the reducer goes into its proxy and the slice is
    /// initialised right away; otherwise it is kept until the next
    /// [`set_store`](Registry::set_store).
    pub fn set_reducer(&self, module: &str, reducer: Reducer<Value>) -> Result<()> {
        self.inner
            .reducers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(module.to_string(), Arc::clone(&reducer));

        match self.inner.active() {
            Some(proxy) => {
                proxy.set_reducer(module, reducer)?;
                tracing::debug!(module, generation = proxy.generation(), "reducer registered");
                proxy.dispatch(Action::init())
            }
            None => {
                tracing::debug!(module, "reducer registered without a store");
                Ok(())
            }
        }
    }

    pub fn reducer(&self, module: &str) -> Option<Reducer<Value>> {
        match self.inner.active() {
            Some(proxy) => proxy.reducer(module),
            None => self
                .inner
                .reducers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(module)
                .cloned(),
        }
    }

    /// The reducer managing all simplux state.
    ///
    /// Mount it in the store passed to [`set_store`](Registry::set_store),
    /// either as the whole reducer or under a key via
    /// [`combine_reducers`](crate::store::combine_reducers).
    pub fn root_reducer(&self) -> Reducer<Value> {
        let registry = Arc::downgrade(&self.inner);
        Arc::new(move |state: Option<&Value>, action: &Action| {
            let mut slices = state
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();

            let Some(inner) = registry.upgrade() else {
                return Ok(Value::Object(slices));
            };

            for (module, reducer) in inner.current_reducers() {
                let next = reducer(slices.get(&module), action)?;
                slices.insert(module, next);
            }

            Ok(Value::Object(slices))
        })
    }

    /// Register an extension applied to every module created afterwards.
    pub fn register_extension<E: ModuleExtension>(&self, extension: E) -> ExtensionHandle {
        self.register_extension_with_order(extension, DEFAULT_EXTENSION_ORDER)
    }

    pub fn register_extension_with_order<E: ModuleExtension>(
        &self,
        extension: E,
        order: i32,
    ) -> ExtensionHandle {
        tracing::debug!(order, "module extension registered");
        self.inner.extensions.register(extension, order)
    }

    pub fn extensions(&self) -> &Extensions {
        &self.inner.extensions
    }

    /// Create a module on this registry.
    pub fn create_module<T: ModuleState>(&self, config: ModuleConfig<T>) -> Result<Module<T>> {
        module::create_module(self, config)
    }

    pub(crate) fn claim_module_name(&self, name: &str) -> Result<()> {
        let mut modules = self
            .inner
            .modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !modules.insert(name.to_string()) {
            return Err(Error::DuplicateModule(name.to_string()));
        }
        Ok(())
    }

    /// Undo a module registration that failed halfway.
    pub(crate) fn forget_module(&self, name: &str) {
        self.inner
            .modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        self.inner
            .reducers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        if let Some(proxy) = self.inner.active() {
            proxy.forget_reducer(name);
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("mode", &self.inner.mode)
            .field(
                "generation",
                &self.inner.active_generation.load(Ordering::SeqCst),
            )
            .field("extensions", &self.inner.extensions.len())
            .finish()
    }
}

#[derive(Clone)]
pub(crate) struct WeakRegistry(Weak<RegistryInner>);

impl WeakRegistry {
    pub(crate) fn upgrade(&self) -> Option<Registry> {
        self.0.upgrade().map(|inner| Registry { inner })
    }
}

/// Disconnects a store installed by [`Registry::set_store`].
///
/// The simplux state stays in the store; only the registry lets go of it.
pub struct StoreCleanup {
    registry: Weak<RegistryInner>,
    generation: u64,
    done: AtomicBool,
}

impl StoreCleanup {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Remove the store from the registry if it is still the active one.
    ///
    /// Fails with [`Error::StaleStoreCleanup`] when a newer store has been
    /// installed since, unless the registry runs in production mode. Calling
    /// it again after it succeeded is a no-op.
    pub fn cleanup(&self) -> Result<()> {
        if self.done.load(Ordering::SeqCst) {
            return Ok(());
        }
        let Some(inner) = self.registry.upgrade() else {
            self.done.store(true, Ordering::SeqCst);
            return Ok(());
        };

        let mut active = inner.active.write().unwrap_or_else(PoisonError::into_inner);
        let current = active.as_ref().map(|proxy| proxy.generation());
        match current {
            Some(generation) if generation == self.generation => {
                let proxy = active.take();
                inner.active_generation.store(0, Ordering::SeqCst);
                drop(active);
                if let Some(proxy) = proxy {
                    proxy.detach_all();
                }
                self.done.store(true, Ordering::SeqCst);
                tracing::debug!(generation = self.generation, "store cleaned up");
                Ok(())
            }
            Some(active_generation) => {
                if inner.mode.is_production() {
                    tracing::warn!(
                        generation = self.generation,
                        active = active_generation,
                        "ignoring cleanup of a replaced store"
                    );
                    self.done.store(true, Ordering::SeqCst);
                    return Ok(());
                }
                Err(Error::StaleStoreCleanup {
                    generation: self.generation,
                    active: active_generation,
                })
            }
            None => {
                self.done.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for StoreCleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCleanup")
            .field("generation", &self.generation)
            .field("done", &self.done.load(Ordering::SeqCst))
            .finish()
    }
}

/// The process-wide registry used by the crate-level helpers.
///
/// It is created on first use with [`Config::default`].
pub fn global() -> Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::new).clone()
}
