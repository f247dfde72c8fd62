use crate::error::{Error, Result};
use crate::module::{Module, ModuleMutation, ModuleState};
use crate::mutation::args::{filter_event_args, filter_typed_event_args, IntoNextState, MutationArgs};
use crate::runtime::DispatchGuard;
use crate::store::{mutation_type, Action};
use serde_json::Value;
use std::any::TypeId;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

type TypedMutation<T> = Arc<dyn Fn(&mut T, &[Value]) -> Result<Option<T>> + Send + Sync>;

/// Replacement installed by [`mock_mutation`](crate::testing::mock_mutation).
pub(crate) type MockFn<T, A> = Arc<dyn Fn(A) -> T + Send + Sync>;

struct Definition<T> {
    name: String,
    args: TypeId,
    body: TypedMutation<T>,
}

/// A batch of named mutation functions for one module.
///
/// ```ignore
/// let mutations = counter.create_mutations(
///     MutationDefinitions::new()
///         .define("increment", |state: &mut Counter, (): ()| state.count += 1)
///         .define("add", |state: &mut Counter, (by,): (i64,)| state.count += by),
/// )?;
/// let add = mutations.get::<(i64,)>("add").unwrap();
/// add.call((5,))?;
/// ```
pub struct MutationDefinitions<T> {
    entries: Vec<Definition<T>>,
}

impl<T: ModuleState> MutationDefinitions<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a mutation.
    ///
    /// `f` may update the state in place and return `()`, or return
    /// `Some(next)` to replace it. Returning `Err` aborts the dispatch.
    pub fn define<A, R, F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        A: MutationArgs,
        R: IntoNextState<T>,
        F: Fn(&mut T, A) -> R + Send + Sync + 'static,
    {
        let name = name.into();
        let mutation = name.clone();
        let body: TypedMutation<T> = Arc::new(move |state: &mut T, values: &[Value]| {
            let args = A::from_values(values).map_err(|source| Error::InvalidArguments {
                mutation: mutation.clone(),
                source,
            })?;
            f(state, args).into_next_state()
        });
        self.entries.push(Definition {
            name,
            args: TypeId::of::<A>(),
            body,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|definition| definition.name.as_str())
    }
}

impl<T: ModuleState> Default for MutationDefinitions<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The mutations created from one [`MutationDefinitions`] batch.
pub struct ResolvedMutations<T> {
    module: Module<T>,
    args: BTreeMap<String, TypeId>,
}

impl<T: ModuleState> ResolvedMutations<T> {
    /// The mutation called `name`, if it was defined with arguments `A`.
    pub fn get<A: MutationArgs>(&self, name: &str) -> Option<Mutation<T, A>> {
        match self.args.get(name) {
            Some(args) if *args == TypeId::of::<A>() => Some(Mutation::new(&self.module, name)),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.args.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.args.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

impl<T> std::fmt::Debug for ResolvedMutations<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.args.keys()).finish()
    }
}

/// A mutation bound to its module.
///
/// Calling it dispatches an action through the registry's store and returns
/// the module's new state.
pub struct Mutation<T, A> {
    module: Module<T>,
    name: Arc<str>,
    action_type: Arc<str>,
    _args: PhantomData<fn(A)>,
}

impl<T, A> Clone for Mutation<T, A> {
    fn clone(&self) -> Self {
        Self {
            module: self.module.clone(),
            name: Arc::clone(&self.name),
            action_type: Arc::clone(&self.action_type),
            _args: PhantomData,
        }
    }
}

impl<T: ModuleState, A: MutationArgs> Mutation<T, A> {
    fn new(module: &Module<T>, name: &str) -> Self {
        Self {
            module: module.clone(),
            name: Arc::from(name),
            action_type: Arc::from(mutation_type(module.name(), name)),
            _args: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type of the actions this mutation dispatches.
    pub fn action_type(&self) -> &str {
        &self.action_type
    }

    #[doc(hidden)]
    pub fn owning_module(&self) -> &Module<T> {
        &self.module
    }

    /// Run the mutation against the store and return the module's new state.
    ///
    /// A mock installed with [`mock_mutation`](crate::testing::mock_mutation)
    /// runs instead, without dispatching.
    pub fn call(&self, args: A) -> Result<T> {
        if let Some(mock) = self.mock() {
            return Ok(mock(args));
        }
        let values = self.encode(&args)?;
        self.dispatch(filter_typed_event_args(values))
    }

    /// [`call`](Mutation::call) with untyped arguments.
    ///
    /// A leading falsy (`null`, `false`, `0`, `""`) or event-shaped argument
    /// is dropped before dispatching, so UI events can be forwarded as is.
    /// A mock receives the arguments unfiltered.
    pub fn call_with_values(&self, args: Vec<Value>) -> Result<T> {
        if let Some(mock) = self.mock() {
            let args = A::from_values(&args).map_err(|source| Error::InvalidArguments {
                mutation: self.name.to_string(),
                source,
            })?;
            return Ok(mock(args));
        }
        self.dispatch(filter_event_args(args))
    }

    /// Apply the mutation to `state` through the module's reducer, leaving
    /// the store alone. Allowed from inside other mutations.
    pub fn with_state(&self, state: T) -> impl Fn(A) -> Result<T> + '_ {
        move |args: A| {
            let action = self.as_action_creator(args)?;
            let module = self.module.name();
            let slice = serde_json::to_value(&state).map_err(|source| Error::State {
                module: module.to_string(),
                source,
            })?;
            let next = self.module.internals().reducer()(Some(&slice), &action)?;
            serde_json::from_value(next).map_err(|source| Error::State {
                module: module.to_string(),
                source,
            })
        }
    }

    /// The action [`call`](Mutation::call) would dispatch.
    pub fn as_action_creator(&self, args: A) -> Result<Action> {
        let values = self.encode(&args)?;
        Ok(self.action(filter_typed_event_args(values)))
    }

    fn encode(&self, args: &A) -> Result<Vec<Value>> {
        args.to_values()
            .map_err(|source| Error::NonSerializableArgument {
                mutation: self.name.to_string(),
                source,
            })
    }

    fn action(&self, args: Vec<Value>) -> Action {
        Action::mutation(self.module.name(), &self.name, args)
    }

    fn dispatch(&self, args: Vec<Value>) -> Result<T> {
        let guard = DispatchGuard::enter(&self.name)?;
        tracing::debug!(
            module = self.module.name(),
            mutation = %self.name,
            "dispatching mutation"
        );
        self.module.internals().dispatch(self.action(args))?;
        drop(guard);
        self.module.get_state()
    }

    fn mock(&self) -> Option<MockFn<T, A>> {
        let mock = self.module.internals().mocks().get(&self.name)?;
        match mock.downcast_ref::<MockFn<T, A>>() {
            Some(mock) => Some(Arc::clone(mock)),
            None => {
                tracing::warn!(
                    module = self.module.name(),
                    mutation = %self.name,
                    "ignoring mock with mismatched signature"
                );
                None
            }
        }
    }
}

impl<T, A> std::fmt::Debug for Mutation<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutation")
            .field("name", &self.name)
            .field("action_type", &self.action_type)
            .finish()
    }
}

fn erase<T: ModuleState>(module: &str, body: TypedMutation<T>) -> ModuleMutation {
    let module = module.to_string();
    Arc::new(move |state: &Value, args: &[Value]| {
        let mut typed: T = serde_json::from_value(state.clone()).map_err(|source| Error::State {
            module: module.clone(),
            source,
        })?;
        let next = body(&mut typed, args)?;
        serde_json::to_value(next.unwrap_or(typed)).map_err(|source| Error::State {
            module: module.clone(),
            source,
        })
    })
}

impl<T: ModuleState> Module<T> {
    /// Register `definitions` on this module.
    ///
    /// Fails without registering anything if a name is already taken.
    pub fn create_mutations(&self, definitions: MutationDefinitions<T>) -> Result<ResolvedMutations<T>> {
        let mut args = BTreeMap::new();
        let mut erased = Vec::with_capacity(definitions.len());
        for definition in definitions.entries {
            args.insert(definition.name.clone(), definition.args);
            let mutation = erase(self.name(), definition.body);
            erased.push((definition.name, mutation));
        }

        self.internals().mutations().insert_all(self.name(), erased)?;

        tracing::debug!(
            module = self.name(),
            mutations = args.len(),
            "mutations created"
        );

        Ok(ResolvedMutations {
            module: self.clone(),
            args,
        })
    }

    /// Register a single mutation on this module.
    pub fn create_mutation<A, R, F>(&self, name: &str, f: F) -> Result<Mutation<T, A>>
    where
        A: MutationArgs,
        R: IntoNextState<T>,
        F: Fn(&mut T, A) -> R + Send + Sync + 'static,
    {
        self.create_mutations(MutationDefinitions::new().define(name, f))?;
        Ok(Mutation::new(self, name))
    }
}
