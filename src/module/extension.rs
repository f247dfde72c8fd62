use crate::module::{ModuleConfig, ModuleCore};
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Order used when an extension is registered without one.
pub const DEFAULT_EXTENSION_ORDER: i32 = 0;

// Shared by every list so that registration order is comparable across lists.
static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Adds capabilities to every module it is applied to.
///
/// Closures of the shape `Fn(&ModuleCore, &ModuleConfig<Value>) -> Capabilities`
/// implement this trait.
pub trait ModuleExtension: Send + Sync + 'static {
    fn extend(&self, module: &ModuleCore, config: &ModuleConfig<Value>) -> Capabilities;
}

impl<F> ModuleExtension for F
where
    F: Fn(&ModuleCore, &ModuleConfig<Value>) -> Capabilities + Send + Sync + 'static,
{
    fn extend(&self, module: &ModuleCore, config: &ModuleConfig<Value>) -> Capabilities {
        self(module, config)
    }
}

#[derive(Clone)]
struct Entry {
    order: i32,
    sequence: u64,
    extension: Arc<dyn ModuleExtension>,
}

/// An ordered list of module extensions.
///
/// Extensions run in ascending `order`; extensions with the same order run
/// in registration order. Clones share the same list.
#[derive(Clone, Default)]
pub struct Extensions {
    entries: Arc<RwLock<Vec<Entry>>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an extension; the handle removes it again.
    pub fn register<E: ModuleExtension>(&self, extension: E, order: i32) -> ExtensionHandle {
        let sequence = NEXT_SEQUENCE.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let at = entries.partition_point(|entry| entry.order <= order);
        entries.insert(
            at,
            Entry {
                order,
                sequence,
                extension: Arc::new(extension),
            },
        );

        ExtensionHandle {
            entries: Arc::downgrade(&self.entries),
            sequence,
            registered: AtomicBool::new(true),
        }
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

    fn snapshot(&self) -> Vec<Entry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run the extensions of all `lists` against a new module.
    ///
    /// Capabilities of later extensions replace those of earlier ones with
    /// the same type.
    pub(crate) fn apply(
        lists: &[&Extensions],
        module: &ModuleCore,
        config: &ModuleConfig<Value>,
    ) -> Capabilities {
        let mut entries: Vec<Entry> = lists.iter().flat_map(|list| list.snapshot()).collect();
        entries.sort_by_key(|entry| (entry.order, entry.sequence));
        entries.dedup_by_key(|entry| entry.sequence);

        let mut capabilities = Capabilities::new();
        for entry in entries {
            capabilities.merge(entry.extension.extend(module, config));
        }
        capabilities
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let orders: Vec<i32> = self.snapshot().iter().map(|entry| entry.order).collect();
        f.debug_struct("Extensions").field("orders", &orders).finish()
    }
}

/// Unregisters an extension. Modules created before keep its capabilities.
pub struct ExtensionHandle {
    entries: Weak<RwLock<Vec<Entry>>>,
    sequence: u64,
    registered: AtomicBool,
}

impl ExtensionHandle {
    pub fn unregister(&self) {
        if !self.registered.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(entries) = self.entries.upgrade() {
            entries
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|entry| entry.sequence != self.sequence);
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }
}

/// Type-keyed set of values an extension adds to a module.
///
/// At most one value per type is kept.
#[derive(Default)]
pub struct Capabilities {
    entries: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a capability, replacing any existing one of the same type.
    pub fn insert<C: Send + Sync + 'static>(&mut self, capability: C) {
        self.entries.insert(TypeId::of::<C>(), Box::new(capability));
    }

    pub fn with<C: Send + Sync + 'static>(mut self, capability: C) -> Self {
        self.insert(capability);
        self
    }

    pub fn get<C: 'static>(&self) -> Option<&C> {
        self.entries
            .get(&TypeId::of::<C>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    pub fn contains<C: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<C>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn merge(&mut self, other: Capabilities) {
        self.entries.extend(other.entries);
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("count", &self.entries.len())
            .finish()
    }
}
