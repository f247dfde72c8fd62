//! Helpers for testing code that calls mutations.
//!
//! ```ignore
//! let _mock = mock_mutation(&increment, |()| Counter { count: 99 });
//! assert_eq!(increment.call(())?, Counter { count: 99 });
//! ```

use crate::module::{MockTable, ModuleState};
use crate::mutation::{MockFn, Mutation, MutationArgs};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Keeps a mutation mocked until dropped or [`clear`](MockGuard::clear)ed.
#[must_use = "the mock is removed when the guard is dropped"]
pub struct MockGuard {
    mocks: MockTable,
    name: String,
    id: u64,
    cleared: AtomicBool,
}

impl MockGuard {
    /// Remove the mock now. Later calls do nothing.
    pub fn clear(&self) {
        if !self.cleared.swap(true, Ordering::SeqCst) {
            // A newer mock for the same mutation stays in place.
            self.mocks.remove_if(&self.name, self.id);
        }
    }
}

impl Drop for MockGuard {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for MockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockGuard")
            .field("mutation", &self.name)
            .field("cleared", &self.cleared.load(Ordering::SeqCst))
            .finish()
    }
}

/// Replace `mutation` with `mock`.
///
/// While the guard lives, calling the mutation runs `mock` and returns its
/// result without dispatching anything. Mocking the same mutation again
/// replaces the previous mock.
pub fn mock_mutation<T, A, F>(mutation: &Mutation<T, A>, mock: F) -> MockGuard
where
    T: ModuleState,
    A: MutationArgs,
    F: Fn(A) -> T + Send + Sync + 'static,
{
    let mocks = mutation.owning_module().internals().mocks().clone();
    let mock: MockFn<T, A> = Arc::new(mock);
    let erased: Arc<dyn Any + Send + Sync> = Arc::new(mock);
    let id = mocks.set(mutation.name(), erased);

    tracing::debug!(
        module = mutation.owning_module().name(),
        mutation = mutation.name(),
        "mutation mocked"
    );

    MockGuard {
        mocks,
        name: mutation.name().to_string(),
        id,
        cleared: AtomicBool::new(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::module::ModuleConfig;
    use crate::runtime::Registry;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Registry, Mutation<i64, (i64,)>) {
        let registry = Registry::with_config(Config::development());
        let module = registry
            .create_module(ModuleConfig::new("counter", 0_i64))
            .unwrap();
        let add = module
            .create_mutation("add", |state: &mut i64, (by,): (i64,)| *state += by)
            .unwrap();
        (registry, add)
    }

    #[test]
    fn mock_replaces_dispatch() {
        let (registry, add) = counter();
        let calls = Arc::new(AtomicUsize::new(0));

        let guard = {
            let calls = calls.clone();
            mock_mutation(&add, move |(by,)| {
                calls.fetch_add(1, Ordering::SeqCst);
                by * 100
            })
        };

        assert_eq!(add.call((2,)).unwrap(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.get_state().unwrap()["counter"], 0);

        drop(guard);
        assert_eq!(add.call((2,)).unwrap(), 2);
    }

    #[test]
    fn mock_receives_unfiltered_untyped_arguments() {
        let (registry, add) = counter();
        let values = vec![serde_json::json!(0), serde_json::json!(7)];

        {
            let _guard = mock_mutation(&add, |(by,)| by - 1);
            assert_eq!(add.call_with_values(values.clone()).unwrap(), -1);
            assert_eq!(registry.get_state().unwrap()["counter"], 0);
        }

        // Without the mock the leading zero is dropped before dispatching.
        assert_eq!(add.call_with_values(values).unwrap(), 7);
    }

    #[test]
    fn clear_is_idempotent() {
        let (_registry, add) = counter();
        let guard = mock_mutation(&add, |_| -1);

        guard.clear();
        guard.clear();
        assert_eq!(add.call((1,)).unwrap(), 1);
    }

    #[test]
    fn stale_guard_keeps_newer_mock() {
        let (_registry, add) = counter();
        let first = mock_mutation(&add, |_| 1);
        let _second = mock_mutation(&add, |_| 2);

        drop(first);
        assert_eq!(add.call((5,)).unwrap(), 2);
    }

    #[test]
    fn clearing_all_mocks_of_a_module() {
        let (_registry, add) = counter();
        let _guard = mock_mutation(&add, |_| -1);

        add.owning_module().internals().mocks().clear();
        assert_eq!(add.call((3,)).unwrap(), 3);
    }
}
