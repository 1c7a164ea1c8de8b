use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::types::EntityKind;

/// How a single external tool invocation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolFailure {
    /// The tool exited with a nonzero code.
    Exit(i32),
    /// The tool was terminated by a signal (no exit code).
    Signal,
    /// The configured ceiling elapsed; the child was killed.
    Timeout(Duration),
    /// The tool succeeded but its output could not be interpreted.
    MalformedOutput,
    /// The process could not be spawned or waited on.
    Spawn,
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolFailure::Exit(code) => write!(f, "exit code {code}"),
            ToolFailure::Signal => f.write_str("terminated by signal"),
            ToolFailure::Timeout(d) => write!(f, "timed out after {}s", d.as_secs_f64()),
            ToolFailure::MalformedOutput => f.write_str("malformed output"),
            ToolFailure::Spawn => f.write_str("spawn failed"),
        }
    }
}

/// The mutation that was in flight when a partial failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncOperation::Create => "create",
            SyncOperation::Update => "update",
            SyncOperation::Delete => "delete",
        })
    }
}

#[derive(Debug, Error)]
pub enum GhpmError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("external tool failed ({failure}): {diagnostic}")]
    ExternalTool {
        failure: ToolFailure,
        diagnostic: String,
    },

    #[error(
        "partial failure: remote {kind} '{remote_id}' {operation}d but local store was not updated: {source}"
    )]
    PartialFailure {
        kind: EntityKind,
        operation: SyncOperation,
        remote_id: String,
        #[source]
        source: Box<GhpmError>,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("template already exists: {0}")]
    TemplateExists(String),

    #[error("external tool not found: {0}")]
    ToolNotFound(String),

    #[error("external tool not authenticated: {0}")]
    ToolNotAuthenticated(String),

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl GhpmError {
    pub fn not_found(kind: EntityKind, id: impl fmt::Display) -> Self {
        GhpmError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GhpmError::NotFound { .. })
    }

    pub fn is_partial_failure(&self) -> bool {
        matches!(self, GhpmError::PartialFailure { .. })
    }

    /// Remote id left orphaned by a partial failure, if any.
    pub fn orphaned_remote_id(&self) -> Option<&str> {
        match self {
            GhpmError::PartialFailure { remote_id, .. } => Some(remote_id),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for GhpmError {
    fn from(e: rusqlite::Error) -> Self {
        GhpmError::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GhpmError>;
