//! Property bag updates for live dialog instances
//!
//! Instance props are a single `serde_json::Value` slot. An update either
//! replaces the slot, shallow-merges an object patch into it, or computes the
//! next value from the previous one. Updates apply atomically against the
//! current slot.

use serde_json::Value;

/// An update applied to a dialog instance's props slot
pub enum PropsUpdate {
    /// Replace the slot wholesale.
    Replace(Value),

    /// Shallow-merge an object patch into the previous value; keys in the
    /// patch win. Falls back to replacement when either side is not an
    /// object.
    Merge(Value),

    /// Compute the next value from the previous one.
    Compute(Box<dyn FnOnce(&Value) -> Value + Send>),
}

impl PropsUpdate {
    /// Build a compute update from a closure.
    pub fn compute(f: impl FnOnce(&Value) -> Value + Send + 'static) -> Self {
        Self::Compute(Box::new(f))
    }

    /// Apply this update to the previous props, producing the next props.
    pub fn apply(self, prev: &Value) -> Value {
        match self {
            Self::Replace(next) => next,
            Self::Merge(patch) => match (prev.as_object(), patch) {
                (Some(prev_map), Value::Object(patch_map)) => {
                    let mut merged = prev_map.clone();
                    for (k, v) in patch_map {
                        merged.insert(k, v);
                    }
                    Value::Object(merged)
                }
                (_, patch) => patch,
            },
            Self::Compute(f) => f(prev),
        }
    }

    /// Resolve initial props for a brand-new instance (no previous value).
    pub(crate) fn initial(self) -> Value {
        self.apply(&Value::Object(serde_json::Map::new()))
    }
}

impl std::fmt::Debug for PropsUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Replace(v) => f.debug_tuple("Replace").field(v).finish(),
            Self::Merge(v) => f.debug_tuple("Merge").field(v).finish(),
            Self::Compute(_) => f.debug_tuple("Compute").finish(),
        }
    }
}

impl From<Value> for PropsUpdate {
    fn from(value: Value) -> Self {
        Self::Merge(value)
    }
}
