//! Modules: named slices of state registered on a [`Registry`](crate::Registry).
//!
//! A module owns its reducer, its mutation and mock tables, and the
//! capabilities contributed by extensions when it was created.

mod extension;
mod module;
mod reducer;
mod tables;

pub use extension::{
    Capabilities, ExtensionHandle, Extensions, ModuleExtension, DEFAULT_EXTENSION_ORDER,
};
pub use module::{create_module, Module, ModuleConfig, ModuleCore, ModuleState};
pub use tables::{MockTable, ModuleMutation, MutationTable};
