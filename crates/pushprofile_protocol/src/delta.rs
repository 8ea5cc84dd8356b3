//! Field-level differences between a dirty and a current snapshot.

use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// A sparse mapping from field name to new value.
///
/// Produced by diffing the JSON representation of a dirty snapshot against
/// the current one:
/// - changed or added fields carry the dirty value
/// - fields the dirty snapshot dropped are `null`
/// - when both sides hold an object the diff recurses, so only changed keys
///   of a nested map travel
/// - arrays are compared wholesale
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Delta {
    fields: Map<String, Value>,
}

impl Delta {
    /// Creates an empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the delta that turns `current` into `dirty`.
    ///
    /// Top-level fields named in `excluded` are ignored on both sides.
    pub fn between<T: Serialize>(current: &T, dirty: &T, excluded: &[&str]) -> ProtocolResult<Self> {
        let mut current = to_object(current)?;
        let mut dirty = to_object(dirty)?;
        for field in excluded {
            current.remove(*field);
            dirty.remove(*field);
        }

        let mut fields = Map::new();
        diff_objects(&current, &dirty, &mut fields);
        Ok(Self { fields })
    }

    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the number of changed top-level fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns the new value of a top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns true if `field` changed.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Returns the changed fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Adds a field, keeping an existing entry for the same name.
    pub fn insert_if_absent(&mut self, field: impl Into<String>, value: Value) {
        self.fields.entry(field.into()).or_insert(value);
    }

    /// Converts the delta into a request body.
    pub fn into_body(self) -> Value {
        Value::Object(self.fields)
    }

    /// Applies the delta to `base` with JSON merge-patch semantics.
    pub fn apply_to<T: Serialize + DeserializeOwned>(&self, base: &T) -> ProtocolResult<T> {
        let mut target = serde_json::to_value(base)?;
        for (field, value) in &self.fields {
            let slot = match &mut target {
                Value::Object(map) => map,
                _ => return Err(ProtocolError::invalid("snapshot is not a JSON object")),
            };
            if value.is_null() {
                slot.remove(field);
            } else {
                merge_patch(slot.entry(field.clone()).or_insert(Value::Null), value);
            }
        }
        Ok(serde_json::from_value(target)?)
    }
}

fn to_object<T: Serialize>(value: &T) -> ProtocolResult<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(ProtocolError::invalid("snapshot is not a JSON object")),
    }
}

fn diff_objects(current: &Map<String, Value>, dirty: &Map<String, Value>, out: &mut Map<String, Value>) {
    for (key, new) in dirty {
        match (current.get(key), new) {
            (Some(old), _) if old == new => {}
            (Some(Value::Object(old)), Value::Object(new_map)) => {
                let mut nested = Map::new();
                diff_objects(old, new_map, &mut nested);
                out.insert(key.clone(), Value::Object(nested));
            }
            _ => {
                out.insert(key.clone(), new.clone());
            }
        }
    }

    for key in current.keys() {
        if !dirty.contains_key(key) {
            out.insert(key.clone(), Value::Null);
        }
    }
}

fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
