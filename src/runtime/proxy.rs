use crate::config::Mode;
use crate::error::{Error, Result};
use crate::store::{Action, Listener, Reducer, StateContainer, Subscription};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// A container seen through the selector that locates the simplux state.
trait SelectedContainer: Send + Sync {
    fn dispatch(&self, action: Action) -> Result<()>;
    fn state(&self) -> Value;
    fn subscribe(&self, listener: Listener) -> Subscription;
}

struct Selected<C, F> {
    container: C,
    selector: F,
}

impl<C, F> SelectedContainer for Selected<C, F>
where
    C: StateContainer,
    F: Fn(&C::State) -> Value + Send + Sync + 'static,
{
    fn dispatch(&self, action: Action) -> Result<()> {
        self.container.dispatch(action)
    }

    fn state(&self) -> Value {
        (self.selector)(&self.container.state())
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        self.container.subscribe(listener)
    }
}

/// One installed store, tagged with the generation it was installed as.
///
/// Once a newer store is installed the proxy is stale: reducer registration
/// fails in development mode and is ignored in production mode.
pub struct StoreProxy {
    generation: u64,
    container: Option<Box<dyn SelectedContainer>>,
    reducers: RwLock<BTreeMap<String, Reducer<Value>>>,
    attached: Mutex<HashMap<u64, Subscription>>,
    active_generation: Arc<AtomicU64>,
    mode: Mode,
}

impl StoreProxy {
    pub(crate) fn attach<C, F>(
        generation: u64,
        container: C,
        selector: F,
        active_generation: Arc<AtomicU64>,
        mode: Mode,
    ) -> Self
    where
        C: StateContainer,
        F: Fn(&C::State) -> Value + Send + Sync + 'static,
    {
        Self {
            generation,
            container: Some(Box::new(Selected {
                container,
                selector,
            })),
            reducers: RwLock::new(BTreeMap::new()),
            attached: Mutex::new(HashMap::new()),
            active_generation,
            mode,
        }
    }

    /// A stand-in used in production mode when no store is installed.
    pub(crate) fn detached(active_generation: Arc<AtomicU64>, mode: Mode) -> Self {
        Self {
            generation: 0,
            container: None,
            reducers: RwLock::new(BTreeMap::new()),
            attached: Mutex::new(HashMap::new()),
            active_generation,
            mode,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether this proxy wraps the store currently installed on its registry.
    pub fn is_active(&self) -> bool {
        self.container.is_some()
            && self.active_generation.load(Ordering::SeqCst) == self.generation
    }

    pub fn is_detached(&self) -> bool {
        self.container.is_none()
    }

    pub fn dispatch(&self, action: Action) -> Result<()> {
        match &self.container {
            Some(container) => container.dispatch(action),
            None => Ok(()),
        }
    }

    /// The simplux root state, or `null` for a detached proxy.
    pub fn state(&self) -> Value {
        match &self.container {
            Some(container) => container.state(),
            None => Value::Null,
        }
    }

    pub fn set_reducer(&self, module: &str, reducer: Reducer<Value>) -> Result<()> {
        if !self.is_active() {
            let active = self.active_generation.load(Ordering::SeqCst);
            if self.mode.is_production() {
                tracing::warn!(
                    generation = self.generation,
                    active,
                    module,
                    "ignoring reducer registration on a replaced store"
                );
                return Ok(());
            }
            return Err(Error::StaleStoreProxy {
                generation: self.generation,
                active,
            });
        }

        self.reducers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(module.to_string(), reducer);
        Ok(())
    }

    pub fn reducer(&self, module: &str) -> Option<Reducer<Value>> {
        self.reducers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(module)
            .cloned()
    }

    pub(crate) fn reducers(&self) -> BTreeMap<String, Reducer<Value>> {
        self.reducers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Copy registrations over without the staleness check.
    pub(crate) fn adopt_reducers(&self, reducers: BTreeMap<String, Reducer<Value>>) {
        self.reducers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(reducers);
    }

    pub(crate) fn forget_reducer(&self, module: &str) {
        self.reducers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(module);
    }

    /// Subscribe a registry listener to the wrapped container.
    pub(crate) fn attach_listener(&self, id: u64, listener: Listener) {
        let Some(container) = &self.container else {
            return;
        };
        let mut attached = self.attached.lock().unwrap_or_else(PoisonError::into_inner);
        if attached.contains_key(&id) {
            return;
        }
        attached.insert(id, container.subscribe(listener));
    }

    pub(crate) fn detach_listener(&self, id: u64) {
        let subscription = self
            .attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
    }

    pub(crate) fn detach_all(&self) {
        let attached: Vec<Subscription> = self
            .attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, subscription)| subscription)
            .collect();
        for subscription in attached {
            subscription.unsubscribe();
        }
    }

    pub(crate) fn attached_count(&self) -> usize {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for StoreProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreProxy")
            .field("generation", &self.generation)
            .field("detached", &self.is_detached())
            .field("reducers", &self.reducers().keys().collect::<Vec<_>>())
            .finish()
    }
}
