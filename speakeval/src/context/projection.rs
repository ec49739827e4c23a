//! Read-only projection of the result context handed to a stage.

use super::is_truthy;
use crate::core::FieldMap;
use crate::errors::{StageError, UndeclaredInputError};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;

/// An owned, immutable view of a stage's declared inputs.
///
/// Reading a field the stage did not declare is an error; a declared field
/// that is absent (or holds the `null` sentinel) reads as `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextProjection {
    stage: String,
    declared: BTreeSet<String>,
    fields: FieldMap,
}

impl ContextProjection {
    /// Creates a new projection.
    #[must_use]
    pub fn new(stage: impl Into<String>, declared: BTreeSet<String>, fields: FieldMap) -> Self {
        Self {
            stage: stage.into(),
            declared,
            fields,
        }
    }

    /// Returns the name of the stage this view belongs to.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage
    }

    /// Gets a declared field.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredInputError` if `field` is not a declared input.
    pub fn get(&self, field: &str) -> Result<Option<&serde_json::Value>, UndeclaredInputError> {
        if !self.declared.contains(field) {
            return Err(UndeclaredInputError::new(&self.stage, field));
        }
        Ok(self.fields.get(field).filter(|v| !v.is_null()))
    }

    /// Gets a declared field as a string.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredInputError` if `field` is not a declared input.
    pub fn text(&self, field: &str) -> Result<Option<&str>, UndeclaredInputError> {
        Ok(self.get(field)?.and_then(serde_json::Value::as_str))
    }

    /// Gets a declared field as a number.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredInputError` if `field` is not a declared input.
    pub fn number(&self, field: &str) -> Result<Option<f64>, UndeclaredInputError> {
        Ok(self.get(field)?.and_then(serde_json::Value::as_f64))
    }

    /// Decodes a declared field into `T`.
    ///
    /// # Errors
    ///
    /// Returns a `StageError` if the field is undeclared or does not decode.
    pub fn decode<T: DeserializeOwned>(&self, field: &str) -> Result<Option<T>, StageError> {
        match self.get(field)? {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| {
                    StageError::new(&self.stage, format!("field '{field}' has an unexpected shape"))
                        .with_cause(e.to_string())
                }),
            None => Ok(None),
        }
    }

    /// Returns true if a declared field holds a truthy value.
    #[must_use]
    pub fn is_present(&self, field: &str) -> bool {
        self.declared.contains(field) && self.fields.get(field).is_some_and(is_truthy)
    }

    /// Returns the declared input names.
    #[must_use]
    pub fn declared(&self) -> &BTreeSet<String> {
        &self.declared
    }

    /// Returns the copied fields.
    #[must_use]
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn view() -> ContextProjection {
        let declared = ["transcript", "duration", "grammar_analysis"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let fields = FieldMap::from([
            ("transcript".to_string(), json!("I goes to school")),
            ("duration".to_string(), json!(4.0)),
            ("grammar_analysis".to_string(), json!(null)),
        ]);
        ContextProjection::new("generate_feedback", declared, fields)
    }

    #[test]
    fn test_declared_reads() {
        let v = view();
        assert_eq!(v.text("transcript").unwrap(), Some("I goes to school"));
        assert_eq!(v.number("duration").unwrap(), Some(4.0));
        assert_eq!(v.get("grammar_analysis").unwrap(), None);
    }

    #[test]
    fn test_undeclared_read_is_error() {
        let v = view();
        let err = v.get("audio_path").unwrap_err();
        assert_eq!(err.stage, "generate_feedback");
        assert_eq!(err.field, "audio_path");
        assert!(!v.is_present("audio_path"));
    }

    #[test]
    fn test_decode() {
        let v = view();
        let duration: Option<f64> = v.decode("duration").unwrap();
        assert_eq!(duration, Some(4.0));

        let bad: Result<Option<Vec<String>>, _> = v.decode("transcript");
        assert!(bad.is_err());
    }
}
