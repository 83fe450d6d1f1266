//! Declarative header validation.
//!
//! A [`SchemaAdapter`] is a pluggable validation hook, the same seam the
//! teacher uses for its `Tool` trait: ship one concrete implementation,
//! `DeclarativeSchema`, and let callers bring their own.

use crate::error::FieldError;
use crate::frontmatter::Header;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A field's declared shape within a [`DeclarativeSchema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Bool,
    Integer,
    /// Value must be one of the listed strings.
    Enum { values: Vec<String> },
    /// A homogeneous array of the given element kind.
    Array { of: Box<FieldKind> },
}

/// One field's validation rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRule {
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

/// Policy applied to header keys not named by the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownKeyPolicy {
    Ignore,
    Warn,
    Reject,
}

/// A named, declarative set of field rules validated against a [`Header`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclarativeSchema {
    pub name: String,
    pub fields: BTreeMap<String, FieldRule>,
    #[serde(default = "default_unknown_key_policy")]
    pub unknown_keys: UnknownKeyPolicy,
}

fn default_unknown_key_policy() -> UnknownKeyPolicy {
    UnknownKeyPolicy::Warn
}

/// Pluggable header-validation hook.
///
/// Implementations may reject with [`FieldError`]s (hard failure) or return
/// warnings (non-fatal, surfaced to the caller via audit but not blocking
/// the edit).
#[async_trait]
pub trait SchemaAdapter: Send + Sync {
    fn name(&self) -> &str;
    async fn validate(&self, header: &Header) -> ValidationOutcome;
}

/// Result of running a header through a [`SchemaAdapter`].
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub errors: Vec<FieldError>,
    pub warnings: Vec<FieldError>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[async_trait]
impl SchemaAdapter for DeclarativeSchema {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, header: &Header) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();

        for (field_name, rule) in &self.fields {
            match header.get(field_name) {
                Some(value) => {
                    if let Err(message) = check_kind(value, &rule.kind) {
                        outcome.errors.push(FieldError {
                            path: field_name.clone(),
                            message,
                        });
                    }
                }
                None if rule.required => {
                    outcome.errors.push(FieldError {
                        path: field_name.clone(),
                        message: "required field is missing".to_string(),
                    });
                }
                None => {}
            }
        }

        if self.unknown_keys != UnknownKeyPolicy::Ignore {
            for key in header.keys() {
                if !self.fields.contains_key(key) {
                    let field_error = FieldError {
                        path: key.clone(),
                        message: "field is not declared in schema".to_string(),
                    };
                    match self.unknown_keys {
                        UnknownKeyPolicy::Warn => outcome.warnings.push(field_error),
                        UnknownKeyPolicy::Reject => outcome.errors.push(field_error),
                        UnknownKeyPolicy::Ignore => unreachable!(),
                    }
                }
            }
        }

        outcome
    }
}

fn check_kind(value: &serde_json::Value, kind: &FieldKind) -> Result<(), String> {
    match kind {
        FieldKind::String => value
            .is_string()
            .then_some(())
            .ok_or_else(|| "expected a string".to_string()),
        FieldKind::Bool => value
            .is_boolean()
            .then_some(())
            .ok_or_else(|| "expected a boolean".to_string()),
        FieldKind::Integer => value
            .is_i64()
            .then_some(())
            .ok_or_else(|| "expected an integer".to_string()),
        FieldKind::Enum { values } => {
            let s = value.as_str().ok_or_else(|| "expected a string".to_string())?;
            if values.iter().any(|v| v == s) {
                Ok(())
            } else {
                Err(format!("value {s:?} is not one of {values:?}"))
            }
        }
        FieldKind::Array { of } => {
            let items = value.as_array().ok_or_else(|| "expected an array".to_string())?;
            for item in items {
                check_kind(item, of)?;
            }
            Ok(())
        }
    }
}
