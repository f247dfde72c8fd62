use crate::error::{Error, Result};
use crate::store::Action;
use serde_json::Value;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// A state transition: `(current, action) -> next`.
///
/// `None` means the state does not exist yet and the reducer should start
/// from its initial value.
pub type Reducer<S> = Arc<dyn Fn(Option<&S>, &Action) -> Result<S> + Send + Sync>;

/// A change notification callback.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// A dispatchable, subscribable state container.
///
/// The registry talks to its store only through this trait, so any container
/// that can forward actions to the simplux root reducer can be plugged in.
pub trait StateContainer: Send + Sync + 'static {
    type State;

    fn dispatch(&self, action: Action) -> Result<()>;

    fn state(&self) -> Self::State;

    fn subscribe(&self, listener: Listener) -> Subscription;
}

static NEXT_STORE_ID: AtomicUsize = AtomicUsize::new(0);

// Stores currently running their reducer on this thread.
thread_local! {
    static REDUCING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

struct ReducingGuard(usize);

impl ReducingGuard {
    fn enter(store_id: usize) -> Result<Self> {
        REDUCING.with(|reducing| {
            let mut reducing = reducing.borrow_mut();
            if reducing.contains(&store_id) {
                return Err(Error::ReducerDispatch);
            }
            reducing.push(store_id);
            Ok(ReducingGuard(store_id))
        })
    }
}

impl Drop for ReducingGuard {
    fn drop(&mut self) {
        REDUCING.with(|reducing| reducing.borrow_mut().retain(|id| *id != self.0));
    }
}

/// A thread-safe, reducer-driven store.
///
/// State only changes by dispatching an [`Action`] through the store's
/// reducer. Listeners run after every dispatch, outside of any lock, so they
/// may read the state, dispatch or unsubscribe.
pub struct Store<S> {
    id: usize,
    state: Arc<RwLock<S>>,
    reducer: Reducer<S>,
    listeners: Arc<RwLock<Vec<(u64, Listener)>>>,
    next_listener: Arc<AtomicU64>,
    dispatch_lock: Arc<Mutex<()>>,
}

impl<S: Clone + Send + Sync + 'static> Store<S> {
    /// Create a store; its initial state is produced by reducing an init action.
    pub fn new(reducer: Reducer<S>) -> Result<Self> {
        let initial = reducer(None, &Action::init())?;

        Ok(Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::SeqCst),
            state: Arc::new(RwLock::new(initial)),
            reducer,
            listeners: Arc::new(RwLock::new(Vec::new())),
            next_listener: Arc::new(AtomicU64::new(0)),
            dispatch_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Create a store from a reducer closure.
    pub fn with_reducer<F>(reducer: F) -> Result<Self>
    where
        F: Fn(Option<&S>, &Action) -> Result<S> + Send + Sync + 'static,
    {
        Self::new(Arc::new(reducer))
    }

    /// Get a clone of the current state.
    pub fn state(&self) -> S {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Read state without cloning it.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&S) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&*state)
    }

    /// Run `action` through the reducer and notify listeners.
    ///
    /// The reducer runs under the store's dispatch lock, so dispatches from
    /// different threads are serialised. A reducer must not wait on another
    /// thread that dispatches to the same store. Listeners run after the lock
    /// is released and may dispatch again.
    ///
    /// Fails with [`Error::ReducerDispatch`] when called from inside this
    /// store's own reducer. A failing reducer leaves the state untouched and
    /// notifies nobody.
    pub fn dispatch(&self, action: Action) -> Result<()> {
        {
            let _reducing = ReducingGuard::enter(self.id)?;
            let _serial = self
                .dispatch_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            let current = self.state();
            let next = (self.reducer)(Some(&current), &action)?;
            *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
        }

        self.notify();
        Ok(())
    }

    /// Subscribe to state changes.
    ///
    /// The callback will be called after every dispatch until the returned
    /// subscription is cancelled.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(callback))
    }

    fn add_listener(&self, listener: Listener) -> Subscription {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));

        let listeners = Arc::clone(&self.listeners);
        Subscription::new(move || {
            listeners
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(listener_id, _)| *listener_id != id);
        })
    }

    /// Notify all listeners of a state change.
    fn notify(&self) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener();
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            state: Arc::clone(&self.state),
            reducer: Arc::clone(&self.reducer),
            listeners: Arc::clone(&self.listeners),
            next_listener: Arc::clone(&self.next_listener),
            dispatch_lock: Arc::clone(&self.dispatch_lock),
        }
    }
}

impl<S: Clone + Send + Sync + 'static> StateContainer for Store<S> {
    type State = S;

    fn dispatch(&self, action: Action) -> Result<()> {
        Store::dispatch(self, action)
    }

    fn state(&self) -> S {
        Store::state(self)
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        self.add_listener(listener)
    }
}

/// Handle returned by every `subscribe`.
///
/// Cancelling is explicit; dropping the handle keeps the subscription alive.
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// Stop receiving notifications. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        let cancel = self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Combine named reducers into one reducer over a JSON object.
///
/// Each reducer owns the value under its key. Keys without a reducer are
/// carried over untouched.
pub fn combine_reducers<I, K>(reducers: I) -> Reducer<Value>
where
    I: IntoIterator<Item = (K, Reducer<Value>)>,
    K: Into<String>,
{
    let reducers: Vec<(String, Reducer<Value>)> = reducers
        .into_iter()
        .map(|(key, reducer)| (key.into(), reducer))
        .collect();

    Arc::new(move |state: Option<&Value>, action: &Action| {
        let mut slices = state
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        for (key, reducer) in &reducers {
            let next = reducer(slices.get(key), action)?;
            slices.insert(key.clone(), next);
        }

        Ok(Value::Object(slices))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Clone, Debug, PartialEq)]
    struct AppState {
        count: usize,
        name: String,
    }

    fn app_store() -> Store<AppState> {
        Store::with_reducer(|state: Option<&AppState>, action: &Action| {
            let state = state.cloned().unwrap_or(AppState {
                count: 0,
                name: "test".to_string(),
            });
            Ok(match action.kind.as_str() {
                "INC" => AppState {
                    count: state.count + 1,
                    ..state
                },
                "RENAME" => AppState {
                    name: "updated".to_string(),
                    ..state
                },
                _ => state,
            })
        })
        .unwrap()
    }

    #[test]
    fn store_initial_state_from_reducer() {
        let store = app_store();
        assert_eq!(store.state().count, 0);
        assert_eq!(store.read(|state| state.name.clone()), "test");
    }

    #[test]
    fn store_dispatch() {
        let store = app_store();

        store.dispatch(Action::new("INC")).unwrap();
        store.dispatch(Action::new("RENAME")).unwrap();

        assert_eq!(store.state().count, 1);
        assert_eq!(store.state().name, "updated");
    }

    #[test]
    fn store_subscribe() {
        let store = app_store();

        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let subscription = store.subscribe(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        store.dispatch(Action::new("INC")).unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        subscription.unsubscribe();
        subscription.unsubscribe();
        store.dispatch(Action::new("INC")).unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn failing_reducer_keeps_state() {
        let store = Store::with_reducer(|state: Option<&i32>, action: &Action| {
            if action.kind == "BOOM" {
                return Err(Error::ReducerDispatch);
            }
            Ok(state.copied().unwrap_or(3))
        })
        .unwrap();

        assert!(store.dispatch(Action::new("BOOM")).is_err());
        assert_eq!(store.state(), 3);
    }

    #[test]
    fn dispatch_from_reducer_is_rejected() {
        let slot: Arc<Mutex<Option<Store<i32>>>> = Arc::new(Mutex::new(None));
        let nested = Arc::new(Mutex::new(None));

        let store = {
            let slot = slot.clone();
            let nested = nested.clone();
            Store::with_reducer(move |state: Option<&i32>, action: &Action| {
                if action.kind == "NEST" {
                    let store = slot.lock().unwrap().clone();
                    if let Some(store) = store {
                        *nested.lock().unwrap() = Some(store.dispatch(Action::new("INNER")));
                    }
                }
                Ok(state.copied().unwrap_or(0))
            })
            .unwrap()
        };
        *slot.lock().unwrap() = Some(store.clone());

        store.dispatch(Action::new("NEST")).unwrap();

        let nested = nested.lock().unwrap().take().unwrap();
        assert!(matches!(nested, Err(Error::ReducerDispatch)));
    }

    #[test]
    fn listeners_may_dispatch() {
        let store = Store::with_reducer(|state: Option<&i32>, action: &Action| {
            let state = state.copied().unwrap_or(0);
            Ok(if action.kind == "INC" { state + 1 } else { state })
        })
        .unwrap();

        let follow_up = store.clone();
        let _subscription = store.subscribe(move || {
            if follow_up.state() == 1 {
                follow_up.dispatch(Action::new("INC")).unwrap();
            }
        });

        store.dispatch(Action::new("INC")).unwrap();
        assert_eq!(store.state(), 2);
    }

    #[test]
    fn concurrent_dispatches_are_serialised() {
        let store = Store::with_reducer(|state: Option<&i32>, action: &Action| {
            let state = state.copied().unwrap_or(0);
            Ok(if action.kind == "INC" { state + 1 } else { state })
        })
        .unwrap();

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store.dispatch(Action::new("INC")).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(store.state(), 200);
    }

    #[test]
    fn combine_reducers_mounts_under_keys() {
        let counter: Reducer<Value> = Arc::new(|state: Option<&Value>, action: &Action| {
            let count = state.and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(if action.kind == "INC" { count + 1 } else { count }))
        });

        let root = combine_reducers([("counter", counter)]);
        let store = Store::new(root).unwrap();
        store.dispatch(Action::new("INC")).unwrap();

        assert_eq!(store.state(), json!({ "counter": 1 }));
    }

    #[test]
    fn combine_reducers_keeps_unknown_keys() {
        let root = combine_reducers(Vec::<(String, Reducer<Value>)>::new());
        let state = json!({ "other": true });
        assert_eq!(root(Some(&state), &Action::new("X")).unwrap(), state);
    }
}
