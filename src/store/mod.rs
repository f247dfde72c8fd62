//! The reducer-driven state container and its action type.
//!
//! A [`Store`] holds one state value that only changes when an [`Action`] is
//! dispatched through its reducer. The registry reaches stores through the
//! [`StateContainer`] trait so host applications can bring their own.

mod action;
mod store;

pub use action::{
    mutation_prefix, mutation_type, set_state_type, Action, ACTION_NAMESPACE, INIT_ACTION_TYPE,
};
pub use store::{combine_reducers, Listener, Reducer, StateContainer, Store, Subscription};
