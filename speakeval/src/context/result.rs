//! The shared result context accumulated over one run.

use super::ContextProjection;
use crate::core::FieldMap;
use crate::errors::FieldConflictError;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// Owner recorded for fields seeded by the caller before the run starts.
pub const INITIAL_OWNER: &str = "<initial>";

/// Returns true if `value` counts as present for a precondition check.
///
/// `null`, `false`, numeric zero, and empty strings, arrays or objects are
/// all treated as absent.
#[must_use]
pub fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

/// Mapping from field name to value, with exclusive per-field ownership.
///
/// A field is written at most once per run. A `null` value is the explicit
/// "absent" sentinel written for the outputs of a skipped stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultContext {
    fields: FieldMap,
    owners: BTreeMap<String, String>,
}

impl ResultContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context seeded with caller-supplied fields.
    #[must_use]
    pub fn from_fields(fields: FieldMap) -> Self {
        let owners = fields
            .keys()
            .map(|k| (k.clone(), INITIAL_OWNER.to_string()))
            .collect();
        Self { fields, owners }
    }

    /// Seeds a caller-supplied field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        let key = key.into();
        self.owners.insert(key.clone(), INITIAL_OWNER.to_string());
        self.fields.insert(key, value);
        self
    }

    /// Gets a field value, treating the `null` sentinel as absent.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    /// Gets a field value including the `null` sentinel.
    #[must_use]
    pub fn raw(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }

    /// Returns true if the field has been written (even as `null`).
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Returns true if the field holds a truthy value.
    #[must_use]
    pub fn is_present(&self, field: &str) -> bool {
        self.fields.get(field).is_some_and(is_truthy)
    }

    /// Returns the stage that wrote `field`.
    #[must_use]
    pub fn owner(&self, field: &str) -> Option<&str> {
        self.owners.get(field).map(String::as_str)
    }

    /// Merges the outputs of `stage`.
    ///
    /// Either every field is written or none is.
    ///
    /// # Errors
    ///
    /// Returns `FieldConflictError` if any field was already written.
    pub fn merge(&mut self, stage: &str, data: FieldMap) -> Result<(), FieldConflictError> {
        self.check_unowned(stage, data.keys())?;
        for (key, value) in data {
            self.owners.insert(key.clone(), stage.to_string());
            self.fields.insert(key, value);
        }
        Ok(())
    }

    /// Writes the `null` sentinel for each of `stage`'s outputs.
    ///
    /// # Errors
    ///
    /// Returns `FieldConflictError` if any field was already written.
    pub fn mark_absent<'a>(
        &mut self,
        stage: &str,
        outputs: impl IntoIterator<Item = &'a String> + Clone,
    ) -> Result<(), FieldConflictError> {
        self.check_unowned(stage, outputs.clone())?;
        for key in outputs {
            self.owners.insert(key.clone(), stage.to_string());
            self.fields.insert(key.clone(), serde_json::Value::Null);
        }
        Ok(())
    }

    fn check_unowned<'a>(
        &self,
        stage: &str,
        keys: impl IntoIterator<Item = &'a String>,
    ) -> Result<(), FieldConflictError> {
        for key in keys {
            if let Some(owner) = self.owners.get(key) {
                return Err(FieldConflictError::new(key, owner, stage));
            }
        }
        Ok(())
    }

    /// Builds the read-only view handed to a stage.
    ///
    /// Only declared fields that have been written are copied.
    #[must_use]
    pub fn project(
        &self,
        stage: &str,
        required: &BTreeSet<String>,
        optional: &BTreeSet<String>,
    ) -> ContextProjection {
        let declared: BTreeSet<String> = required.union(optional).cloned().collect();
        let fields = declared
            .iter()
            .filter_map(|k| self.fields.get(k).map(|v| (k.clone(), v.clone())))
            .collect();
        ContextProjection::new(stage, declared, fields)
    }

    /// Returns all fields.
    #[must_use]
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Consumes the context, returning its fields.
    #[must_use]
    pub fn into_fields(self) -> FieldMap {
        self.fields
    }

    /// Returns the number of written fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Converts to a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl Serialize for ResultContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}
