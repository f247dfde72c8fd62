use crate::error::Error;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Argument lists a mutation can be called with.
///
/// Implemented for `()` and for tuples of up to six serializable values.
/// Arguments travel inside actions as a JSON array; positions missing from
/// the array decode from `null`, extra positions are ignored.
pub trait MutationArgs: Sized + 'static {
    fn to_values(&self) -> Result<Vec<Value>, serde_json::Error>;

    fn from_values(values: &[Value]) -> Result<Self, serde_json::Error>;
}

impl MutationArgs for () {
    fn to_values(&self) -> Result<Vec<Value>, serde_json::Error> {
        Ok(Vec::new())
    }

    fn from_values(_: &[Value]) -> Result<Self, serde_json::Error> {
        Ok(())
    }
}

fn decode_at<A: DeserializeOwned>(values: &[Value], index: usize) -> Result<A, serde_json::Error> {
    serde_json::from_value(values.get(index).cloned().unwrap_or(Value::Null))
}

macro_rules! tuple_args {
    ($($name:ident $index:tt),+) => {
        impl<$($name),+> MutationArgs for ($($name,)+)
        where
            $($name: Serialize + DeserializeOwned + 'static),+
        {
            fn to_values(&self) -> Result<Vec<Value>, serde_json::Error> {
                Ok(vec![$(serde_json::to_value(&self.$index)?),+])
            }

            fn from_values(values: &[Value]) -> Result<Self, serde_json::Error> {
                Ok(($(decode_at::<$name>(values, $index)?,)+))
            }
        }
    };
}

tuple_args!(A 0);
tuple_args!(A 0, B 1);
tuple_args!(A 0, B 1, C 2);
tuple_args!(A 0, B 1, C 2, D 3);
tuple_args!(A 0, B 1, C 2, D 3, E 4);
tuple_args!(A 0, B 1, C 2, D 3, E 4, F 5);

/// What a mutation function returns.
///
/// `()` and `None` keep the state as the mutation left it (in-place
/// updates); `Some(next)` replaces it with `next`. Wrapping either in a
/// [`Result`] lets the body fail with `?`: an error aborts the dispatch and
/// reaches the caller, leaving the state untouched.
pub trait IntoNextState<T> {
    fn into_next_state(self) -> Result<Option<T>, Error>;
}

impl<T> IntoNextState<T> for () {
    fn into_next_state(self) -> Result<Option<T>, Error> {
        Ok(None)
    }
}

impl<T> IntoNextState<T> for Option<T> {
    fn into_next_state(self) -> Result<Option<T>, Error> {
        Ok(self)
    }
}

impl<T, R: IntoNextState<T>> IntoNextState<T> for Result<R, Error> {
    fn into_next_state(self) -> Result<Option<T>, Error> {
        self?.into_next_state()
    }
}

const EVENT_KEYS: [&str; 3] = ["target", "currentTarget", "defaultPrevented"];

/// Whether an argument is shaped like a UI event: an object carrying
/// `target`, `currentTarget` and `defaultPrevented`.
pub fn is_event(arg: &Value) -> bool {
    match arg {
        Value::Object(fields) => EVENT_KEYS.iter().all(|key| fields.contains_key(*key)),
        _ => false,
    }
}

/// `null`, `false`, zero or the empty string.
pub fn is_falsy(arg: &Value) -> bool {
    match arg {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n == 0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Drop a leading falsy or event-shaped argument so mutations can be wired
/// directly as event handlers.
pub fn filter_event_args(mut args: Vec<Value>) -> Vec<Value> {
    if args.first().is_some_and(|arg| is_falsy(arg) || is_event(arg)) {
        args.remove(0);
    }
    args
}

// Typed arguments keep a leading falsy value: it is a real `None`, `false`
// or `0`, and dropping it would shift every later position.
pub(crate) fn filter_typed_event_args(mut args: Vec<Value>) -> Vec<Value> {
    if args.first().is_some_and(is_event) {
        args.remove(0);
    }
    args
}
