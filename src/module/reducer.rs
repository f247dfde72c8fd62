use crate::config::Mode;
use crate::error::Error;
use crate::module::MutationTable;
use crate::store::{mutation_prefix, set_state_type, Action, Reducer};
use serde_json::Value;
use std::sync::Arc;

/// Build the reducer owning one module's slice.
///
/// Mutation actions run the named mutation, set-state actions replace the
/// slice, anything else leaves it as is. A missing slice starts from
/// `initial_state`.
pub(crate) fn module_reducer(
    module: &str,
    initial_state: Value,
    mutations: MutationTable,
    mode: Mode,
) -> Reducer<Value> {
    let module = module.to_string();
    let prefix = mutation_prefix(&module);
    let set_state = set_state_type(&module);

    Arc::new(move |state: Option<&Value>, action: &Action| {
        let state = state.unwrap_or(&initial_state);

        if let Some(suffix) = action.kind.strip_prefix(prefix.as_str()) {
            let name = action.mutation_name.as_deref().unwrap_or(suffix);

            let Some(mutation) = mutations.get(name) else {
                if mode.is_production() {
                    tracing::warn!(
                        module = %module,
                        mutation = name,
                        "ignoring action for unknown mutation"
                    );
                    return Ok(state.clone());
                }
                return Err(Error::MissingMutation {
                    module: module.clone(),
                    mutation: name.to_string(),
                });
            };

            let args = action.args.as_deref().unwrap_or(&[]);
            return mutation(state, args);
        }

        if action.kind == set_state {
            return Ok(action.state.clone().unwrap_or_else(|| state.clone()));
        }

        Ok(state.clone())
    })
}
