//! Mutations: named update functions turned into dispatchable operations.

mod args;
mod mutation;

pub(crate) use mutation::MockFn;

pub use args::{filter_event_args, is_event, is_falsy, IntoNextState, MutationArgs};
pub use mutation::{Mutation, MutationDefinitions, ResolvedMutations};
