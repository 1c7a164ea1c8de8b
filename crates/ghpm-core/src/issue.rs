use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{GhpmError, Result};
use crate::types::IssueStatus;

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    /// Immutable once set; unique across issues.
    pub remote_id: String,
    pub project_id: i64,
    pub title: String,
    pub body: String,
    pub status: IssueStatus,
    /// Custom field values, usually populated by a template.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Issue {
    /// Apply a sparse change set, leaving unset fields untouched.
    pub fn merged_with(&self, changes: &IssueChanges) -> Issue {
        let mut next = self.clone();
        if let Some(title) = &changes.title {
            next.title = title.clone();
        }
        if let Some(body) = &changes.body {
            next.body = body.clone();
        }
        if let Some(status) = changes.status {
            next.status = status;
        }
        if let Some(fields) = &changes.fields {
            next.fields = fields.clone();
        }
        next
    }

    /// A field counts as set when present and not blank.
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Drafts and change sets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIssue {
    pub project_id: i64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub status: IssueStatus,
}

impl NewIssue {
    pub fn new(project_id: i64, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            project_id,
            title: title.into(),
            body: body.into(),
            status: IssueStatus::Open,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(GhpmError::Validation("issue title must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueChanges {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub status: Option<IssueStatus>,
    /// Replaces the whole field map when present.
    #[serde(default)]
    pub fields: Option<BTreeMap<String, String>>,
}

impl IssueChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.body.is_none() && self.status.is_none() && self.fields.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(GhpmError::Validation("no issue fields to update".into()));
        }
        if matches!(&self.title, Some(t) if t.trim().is_empty()) {
            return Err(GhpmError::Validation("issue title must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Issue {
        let now = Utc::now();
        Issue {
            id: 3,
            remote_id: "42".into(),
            project_id: 1,
            title: "Crash on start".into(),
            body: "stack trace".into(),
            status: IssueStatus::Open,
            fields: BTreeMap::from([("priority".to_string(), "  ".to_string())]),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn blank_field_counts_as_unset() {
        let issue = sample();
        assert_eq!(issue.field_value("priority"), None);
        assert_eq!(issue.field_value("missing"), None);
    }

    #[test]
    fn merged_with_keeps_unset_fields() {
        let issue = sample();
        let next = issue.merged_with(&IssueChanges {
            status: Some(IssueStatus::Closed),
            ..Default::default()
        });
        assert_eq!(next.title, "Crash on start");
        assert_eq!(next.body, "stack trace");
        assert_eq!(next.status, IssueStatus::Closed);
        assert_eq!(next.remote_id, "42");
    }

    #[test]
    fn changes_validation() {
        assert!(IssueChanges::default().validate().is_err());
        let ok = IssueChanges {
            body: Some(String::new()),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
    }
}
