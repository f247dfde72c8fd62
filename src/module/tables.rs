use crate::error::{Error, Result};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// A mutation as seen by the module reducer: `(state, args) -> next state`.
pub type ModuleMutation = Arc<dyn Fn(&Value, &[Value]) -> Result<Value> + Send + Sync>;

/// The mutations defined on one module, keyed by name.
#[derive(Clone, Default)]
pub struct MutationTable {
    entries: Arc<RwLock<HashMap<String, ModuleMutation>>>,
}

impl MutationTable {
    pub fn get(&self, name: &str) -> Option<ModuleMutation> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Names of all mutations, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add all `mutations` or none of them.
    pub(crate) fn insert_all(
        &self,
        module: &str,
        mutations: Vec<(String, ModuleMutation)>,
    ) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        for (index, (name, _)) in mutations.iter().enumerate() {
            let repeated = mutations[..index].iter().any(|(other, _)| other == name);
            if repeated || entries.contains_key(name) {
                return Err(Error::DuplicateMutation {
                    module: module.to_string(),
                    mutation: name.clone(),
                });
            }
        }

        entries.extend(mutations);
        Ok(())
    }
}

impl std::fmt::Debug for MutationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

static NEXT_MOCK_ID: AtomicU64 = AtomicU64::new(0);

type MockEntry = (u64, Arc<dyn Any + Send + Sync>);

/// Test replacements for mutations, keyed by mutation name.
///
/// Mocks are stored type-erased; the mutation that owns the name knows how
/// to call them.
#[derive(Clone, Default)]
pub struct MockTable {
    entries: Arc<RwLock<HashMap<String, MockEntry>>>,
}

impl MockTable {
    /// Install `mock` for `name`, returning an id for [`remove_if`](MockTable::remove_if).
    pub(crate) fn set(&self, name: &str, mock: Arc<dyn Any + Send + Sync>) -> u64 {
        let id = NEXT_MOCK_ID.fetch_add(1, Ordering::SeqCst);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), (id, mock));
        id
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|(_, mock)| Arc::clone(mock))
    }

    /// Remove the mock for `name` only if it is still the one installed as `id`.
    pub(crate) fn remove_if(&self, name: &str, id: u64) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.get(name).is_some_and(|(current, _)| *current == id) {
            entries.remove(name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTable")
            .field("count", &self.len())
            .finish()
    }
}
