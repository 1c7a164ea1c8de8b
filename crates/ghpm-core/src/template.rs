//! Templates: a title pattern plus an ordered map of field descriptors.
//!
//! Descriptors are stored and exchanged as loose documents
//! (`{type, default, required, options}`) but are parsed into the closed
//! [`FieldDescriptor`] set on the way in, so the merge engine only ever
//! matches on typed variants.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GhpmError, Result};

// ---------------------------------------------------------------------------
// FieldDescriptor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFieldDescriptor", into = "RawFieldDescriptor")]
pub enum FieldDescriptor {
    /// Free text. Fills `default` when the issue has no value.
    Text { default: Option<String> },
    /// One of `options`. Fills `default` (always a member of `options`).
    Choice { options: Vec<String>, default: String },
    /// No default; an issue without a value leaves the merge incomplete.
    /// `options` is empty for free-text fields.
    Required { options: Vec<String> },
}

impl FieldDescriptor {
    pub fn text(default: impl Into<String>) -> Self {
        FieldDescriptor::Text {
            default: Some(default.into()),
        }
    }

    pub fn default_value(&self) -> Option<&str> {
        match self {
            FieldDescriptor::Text { default } => {
                default.as_deref().filter(|d| !d.trim().is_empty())
            }
            FieldDescriptor::Choice { default, .. } => Some(default),
            FieldDescriptor::Required { .. } => None,
        }
    }

    /// Allowed values, empty when unconstrained.
    pub fn options(&self) -> &[String] {
        match self {
            FieldDescriptor::Text { .. } => &[],
            FieldDescriptor::Choice { options, .. } | FieldDescriptor::Required { options } => {
                options
            }
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self, FieldDescriptor::Required { .. })
    }
}

/// Wire/disk shape of a descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawFieldDescriptor {
    #[serde(rename = "type", default = "default_field_type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    options: Vec<String>,
}

fn default_field_type() -> String {
    "string".to_string()
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn scalar_to_string(v: Value) -> Result<Option<String>> {
    match v {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(GhpmError::Validation(format!(
            "field default must be a scalar, got {other}"
        ))),
    }
}

impl TryFrom<RawFieldDescriptor> for FieldDescriptor {
    type Error = GhpmError;

    fn try_from(raw: RawFieldDescriptor) -> Result<Self> {
        // A blank default fills nothing, so it must not mask `required`.
        let default = match raw.default {
            Some(v) => scalar_to_string(v)?.filter(|d| !d.trim().is_empty()),
            None => None,
        };
        match raw.kind.as_str() {
            "string" | "text" => match default {
                None if raw.required => Ok(FieldDescriptor::Required {
                    options: Vec::new(),
                }),
                default => Ok(FieldDescriptor::Text { default }),
            },
            "enum" => {
                if raw.options.is_empty() {
                    return Err(GhpmError::Validation(
                        "enum field must declare at least one option".into(),
                    ));
                }
                match default {
                    Some(d) if raw.options.contains(&d) => Ok(FieldDescriptor::Choice {
                        options: raw.options,
                        default: d,
                    }),
                    Some(d) => Err(GhpmError::Validation(format!(
                        "enum default '{d}' is not one of [{}]",
                        raw.options.join(", ")
                    ))),
                    None if raw.required => Ok(FieldDescriptor::Required {
                        options: raw.options,
                    }),
                    None => Err(GhpmError::Validation(
                        "optional enum field needs a default".into(),
                    )),
                }
            }
            other => Err(GhpmError::Validation(format!(
                "unknown field type '{other}' (expected string, text or enum)"
            ))),
        }
    }
}

impl From<FieldDescriptor> for RawFieldDescriptor {
    fn from(d: FieldDescriptor) -> Self {
        match d {
            FieldDescriptor::Text { default } => RawFieldDescriptor {
                kind: "string".into(),
                default: default.map(Value::String),
                required: false,
                options: Vec::new(),
            },
            FieldDescriptor::Choice { options, default } => RawFieldDescriptor {
                kind: "enum".into(),
                default: Some(Value::String(default)),
                required: false,
                options,
            },
            FieldDescriptor::Required { options } => RawFieldDescriptor {
                kind: if options.is_empty() { "string" } else { "enum" }.into(),
                default: None,
                required: true,
                options,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// TemplateContent / Template
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateContent {
    #[serde(default)]
    pub title: String,
    /// Declaration order is significant: it is the body rendering order.
    #[serde(default)]
    pub fields: IndexMap<String, FieldDescriptor>,
}

impl TemplateContent {
    pub fn validate(&self) -> Result<()> {
        for name in self.fields.keys() {
            if name.trim().is_empty() {
                return Err(GhpmError::Validation(
                    "template field names must not be empty".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub name: String,
    pub content: TemplateContent,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTemplate {
    pub name: String,
    pub content: TemplateContent,
}

impl NewTemplate {
    pub fn validate(&self) -> Result<()> {
        crate::paths::validate_template_name(&self.name)?;
        self.content.validate()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateChanges {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Option<TemplateContent>,
}

impl TemplateChanges {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_none() && self.content.is_none() {
            return Err(GhpmError::Validation("no template fields to update".into()));
        }
        if let Some(name) = &self.name {
            crate::paths::validate_template_name(name)?;
        }
        if let Some(content) = &self.content {
            content.validate()?;
        }
        Ok(())
    }
}
