use serde::{Deserialize, Serialize};

/// The unit of work inside a task descriptor.
///
/// `kind` selects the operation handler on the worker side, `args` is its
/// JSON-encoded input. The core never looks inside `args`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl Operation {
    pub fn new(kind: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            args,
        }
    }

    /// Build an operation from a typed value (`T::KIND` + serialized args).
    pub fn typed<T: crate::typed::TypedOperation>(op: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(T::KIND, serde_json::to_value(op)?))
    }
}
