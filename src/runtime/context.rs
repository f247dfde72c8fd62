use crate::error::{Error, Result};
use std::cell::RefCell;
use std::marker::PhantomData;

// Name of the mutation currently being dispatched on this thread.
thread_local! {
    static IN_FLIGHT: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Marks a mutation as in flight on the current thread until dropped.
///
/// Dispatch is synchronous, so the reducer, the mutation body and every store
/// listener run inside the guard's scope. Any attempt to dispatch a second
/// mutation from there fails with [`Error::NestedDispatch`].
pub(crate) struct DispatchGuard {
    // Bound to the thread whose marker it set.
    _not_send: PhantomData<*const ()>,
}

impl DispatchGuard {
    pub(crate) fn enter(mutation: &str) -> Result<Self> {
        IN_FLIGHT.with(|in_flight| {
            let mut in_flight = in_flight.borrow_mut();
            if let Some(current) = in_flight.as_ref() {
                return Err(Error::NestedDispatch {
                    mutation: mutation.to_string(),
                    in_flight: current.clone(),
                });
            }
            *in_flight = Some(mutation.to_string());
            Ok(DispatchGuard {
                _not_send: PhantomData,
            })
        })
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        IN_FLIGHT.with(|in_flight| in_flight.borrow_mut().take());
    }
}

/// The mutation being dispatched on the current thread, if any.
pub fn dispatching_mutation() -> Option<String> {
    IN_FLIGHT.with(|in_flight| in_flight.borrow().clone())
}
