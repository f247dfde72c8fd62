use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Namespace prefix of every action type produced by simplux.
pub const ACTION_NAMESPACE: &str = "@simplux";

/// Action dispatched when a store is created, swapped in, or a reducer is added.
pub const INIT_ACTION_TYPE: &str = "@simplux/init";

/// An action flowing through a store.
///
/// Serializes to `{ "type", "mutationName"?, "args"?, "state"? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

impl Action {
    /// A plain action carrying only a type.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            mutation_name: None,
            args: None,
            state: None,
        }
    }

    pub fn init() -> Self {
        Self::new(INIT_ACTION_TYPE)
    }

    /// A mutation action for `mutation_name` of `module`.
    pub fn mutation(module: &str, mutation_name: &str, args: Vec<Value>) -> Self {
        Self {
            kind: mutation_type(module, mutation_name),
            mutation_name: Some(mutation_name.to_string()),
            args: Some(args),
            state: None,
        }
    }

    /// A direct state replacement for `module`.
    pub fn set_state(module: &str, state: Value) -> Self {
        Self {
            kind: set_state_type(module),
            mutation_name: None,
            args: None,
            state: Some(state),
        }
    }
}

/// Prefix shared by all mutation action types of a module.
pub fn mutation_prefix(module: &str) -> String {
    format!("{ACTION_NAMESPACE}/{module}/mutation/")
}

pub fn mutation_type(module: &str, mutation_name: &str) -> String {
    format!("{}{mutation_name}", mutation_prefix(module))
}

pub fn set_state_type(module: &str) -> String {
    format!("{ACTION_NAMESPACE}/{module}/setState")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_types_are_namespaced() {
        assert_eq!(
            mutation_type("todos", "add"),
            "@simplux/todos/mutation/add"
        );
        assert_eq!(set_state_type("todos"), "@simplux/todos/setState");
    }

    #[test]
    fn mutation_action_wire_shape() {
        let action = Action::mutation("counter", "incrementBy", vec![json!(5)]);
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({
                "type": "@simplux/counter/mutation/incrementBy",
                "mutationName": "incrementBy",
                "args": [5],
            })
        );
    }

    #[test]
    fn set_state_action_wire_shape() {
        let action = Action::set_state("counter", json!({ "count": 1 }));
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({ "type": "@simplux/counter/setState", "state": { "count": 1 } })
        );
    }

    #[test]
    fn plain_action_from_wire() {
        let action: Action = serde_json::from_value(json!({ "type": "INC" })).unwrap();
        assert_eq!(action, Action::new("INC"));
    }
}
