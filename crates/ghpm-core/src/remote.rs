//! Argument grammar for the remote tracker and parsing of its replies.
//!
//! Builders are pure so the exact argument vectors can be asserted in tests.
//! Edits always send the full resolved field set: the tool does not accept
//! partial diffs.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{GhpmError, Result, ToolFailure};
use crate::issue::{Issue, NewIssue};
use crate::project::{NewProject, Project};

// ---------------------------------------------------------------------------
// RemoteRef
// ---------------------------------------------------------------------------

/// Remote id plus whatever attributes the tool echoed back. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteRef {
    pub remote_id: String,
    pub attributes: Map<String, Value>,
}

impl RemoteRef {
    /// Extract the remote id from `id`, then `number`, then the last
    /// segment of `url`.
    pub fn from_response(value: Value) -> Result<Self> {
        let malformed = |why: &str, value: &Value| GhpmError::ExternalTool {
            failure: ToolFailure::MalformedOutput,
            diagnostic: format!(
                "{why}: {}",
                value.to_string().chars().take(200).collect::<String>()
            ),
        };

        let Value::Object(attributes) = value else {
            return Err(malformed("expected a JSON object", &value));
        };

        let remote_id = ["id", "number"]
            .iter()
            .find_map(|key| attributes.get(*key).and_then(scalar_id))
            .or_else(|| {
                attributes
                    .get("url")
                    .and_then(Value::as_str)
                    .and_then(|url| url.trim_end_matches('/').rsplit('/').next())
                    .filter(|seg| !seg.is_empty())
                    .map(str::to_string)
            });

        match remote_id {
            Some(remote_id) => Ok(Self {
                remote_id,
                attributes,
            }),
            None => Err(malformed(
                "response carries no id, number or url",
                &Value::Object(attributes),
            )),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

fn scalar_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Argument builders
// ---------------------------------------------------------------------------

fn owned(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn finish(mut args: Vec<String>, owner: Option<&str>) -> Vec<String> {
    if let Some(owner) = owner {
        args.push("--owner".into());
        args.push(owner.into());
    }
    args.push("--format".into());
    args.push("json".into());
    args
}

pub fn create_project_args(draft: &NewProject, owner: Option<&str>) -> Vec<String> {
    let mut args = owned(&["project", "create", "--title", &draft.name]);
    if let Some(desc) = &draft.description {
        args.extend(owned(&["--description", desc]));
    }
    finish(args, owner)
}

pub fn edit_project_args(resolved: &Project, owner: Option<&str>) -> Vec<String> {
    let args = owned(&[
        "project",
        "edit",
        &resolved.remote_id,
        "--title",
        &resolved.name,
        "--description",
        resolved.description.as_deref().unwrap_or(""),
    ]);
    finish(args, owner)
}

pub fn delete_project_args(remote_id: &str, owner: Option<&str>) -> Vec<String> {
    finish(owned(&["project", "delete", remote_id, "--yes"]), owner)
}

pub fn create_issue_args(project_remote_id: &str, draft: &NewIssue) -> Vec<String> {
    let args = owned(&[
        "issue",
        "create",
        "--project",
        project_remote_id,
        "--title",
        &draft.title,
        "--body",
        &draft.body,
        "--status",
        draft.status.as_str(),
    ]);
    finish(args, None)
}

pub fn edit_issue_args(resolved: &Issue) -> Vec<String> {
    let args = owned(&[
        "issue",
        "edit",
        &resolved.remote_id,
        "--title",
        &resolved.title,
        "--body",
        &resolved.body,
        "--status",
        resolved.status.as_str(),
    ]);
    finish(args, None)
}

pub fn delete_issue_args(remote_id: &str) -> Vec<String> {
    finish(owned(&["issue", "delete", remote_id, "--yes"]), None)
}

/// Login of the authenticated account. `--jq` prints it bare.
pub fn current_user_args() -> Vec<String> {
    owned(&["api", "user", "--jq", ".login"])
}

pub fn view_project_args(remote_id: &str, owner: Option<&str>) -> Vec<String> {
    finish(owned(&["project", "view", remote_id]), owner)
}

pub fn list_projects_args(owner: Option<&str>) -> Vec<String> {
    finish(owned(&["project", "list"]), owner)
}

pub fn view_issue_args(remote_id: &str) -> Vec<String> {
    finish(owned(&["issue", "view", remote_id]), None)
}

pub fn list_issues_args() -> Vec<String> {
    finish(owned(&["issue", "list"]), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IssueStatus;
    use chrono::Utc;
    use std::collections::BTreeMap;

    #[test]
    fn remote_id_from_string_id() {
        let r = RemoteRef::from_response(serde_json::json!({"id": "7", "title": "Alpha"})).unwrap();
        assert_eq!(r.remote_id, "7");
        assert_eq!(r.attribute("title"), Some("Alpha"));
    }

    #[test]
    fn remote_id_falls_back_to_number_then_url() {
        let r = RemoteRef::from_response(serde_json::json!({"number": 12})).unwrap();
        assert_eq!(r.remote_id, "12");

        let r = RemoteRef::from_response(
            serde_json::json!({"url": "https://github.com/o/r/issues/31/"}),
        )
        .unwrap();
        assert_eq!(r.remote_id, "31");
    }

    #[test]
    fn missing_id_is_malformed_output() {
        let err = RemoteRef::from_response(serde_json::json!({"output": "Created"})).unwrap_err();
        assert!(matches!(
            err,
            GhpmError::ExternalTool {
                failure: ToolFailure::MalformedOutput,
                ..
            }
        ));
        assert!(RemoteRef::from_response(serde_json::json!([1])).is_err());
        assert!(RemoteRef::from_response(serde_json::json!({"id": "  "})).is_err());
    }

    #[test]
    fn project_args_follow_grammar() {
        let draft = NewProject::new("Alpha").with_description("first");
        assert_eq!(
            create_project_args(&draft, Some("octocat")),
            [
                "project", "create", "--title", "Alpha", "--description", "first", "--owner",
                "octocat", "--format", "json"
            ]
        );
        assert_eq!(
            delete_project_args("7", None),
            ["project", "delete", "7", "--yes", "--format", "json"]
        );
    }

    #[test]
    fn read_args_follow_grammar() {
        assert_eq!(current_user_args(), ["api", "user", "--jq", ".login"]);
        assert_eq!(
            view_project_args("7", Some("octocat")),
            ["project", "view", "7", "--owner", "octocat", "--format", "json"]
        );
        assert_eq!(
            list_projects_args(None),
            ["project", "list", "--format", "json"]
        );
        assert_eq!(
            view_issue_args("31"),
            ["issue", "view", "31", "--format", "json"]
        );
        assert_eq!(list_issues_args(), ["issue", "list", "--format", "json"]);
    }

    #[test]
    fn edit_sends_full_field_set() {
        let now = Utc::now();
        let project = Project {
            id: 1,
            remote_id: "7".into(),
            name: "Alpha".into(),
            description: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(
            edit_project_args(&project, None),
            [
                "project", "edit", "7", "--title", "Alpha", "--description", "", "--format",
                "json"
            ]
        );

        let issue = Issue {
            id: 2,
            remote_id: "31".into(),
            project_id: 1,
            title: "Crash".into(),
            body: "trace".into(),
            status: IssueStatus::InProgress,
            fields: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(
            edit_issue_args(&issue),
            [
                "issue", "edit", "31", "--title", "Crash", "--body", "trace", "--status",
                "in_progress", "--format", "json"
            ]
        );
    }
}
