use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GhpmError, Result};

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// A project mirrored into the remote tracker.
///
/// `remote_id` is always set: a project row only exists once the remote
/// resource was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub remote_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Apply a sparse change set, leaving unset fields untouched.
    pub fn merged_with(&self, changes: &ProjectChanges) -> Project {
        let mut next = self.clone();
        if let Some(name) = &changes.name {
            next.name = name.clone();
        }
        if let Some(desc) = &changes.description {
            next.description = Some(desc.clone());
        }
        next
    }
}

// ---------------------------------------------------------------------------
// Drafts and change sets
// ---------------------------------------------------------------------------

/// Create draft. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewProject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(GhpmError::Validation("project name must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectChanges {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ProjectChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(GhpmError::Validation("no project fields to update".into()));
        }
        if matches!(&self.name, Some(n) if n.trim().is_empty()) {
            return Err(GhpmError::Validation("project name must not be empty".into()));
        }
        Ok(())
    }
}
