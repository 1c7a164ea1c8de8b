//! Template Merge Engine.
//!
//! Merging is split into a pure planning step ([`plan_merge`]) and an apply
//! step that routes the plan through the synchronizer's issue update, so the
//! remote-before-local ordering and the issue lease apply to merges too.
//!
//! # Rendering
//!
//! The merged field values are rendered as `name: value` lines in template
//! declaration order, inside a managed block:
//!
//! ```text
//! <!-- ghpm:fields -->
//! priority: medium
//! owner:
//! <!-- /ghpm:fields -->
//! ```
//!
//! An existing block is replaced in place, otherwise the block is appended
//! after the body. Re-applying a template to its own output changes nothing.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::error::{GhpmError, Result};
use crate::issue::{Issue, IssueChanges};
use crate::sync::{op_span, Synchronizer};
use crate::template::{FieldDescriptor, TemplateContent};
use crate::types::{EntityKind, IssueStatus};

pub const FIELDS_START: &str = "<!-- ghpm:fields -->";
pub const FIELDS_END: &str = "<!-- /ghpm:fields -->";

/// Field name that addresses the issue's status column.
const STATUS_FIELD: &str = "status";

/// Issue columns a template may not address.
const RESERVED_FIELDS: &[&str] = &[
    "id",
    "remote_id",
    "project_id",
    "title",
    "body",
    "created_at",
    "updated_at",
];

#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    /// Empty when the issue already reflects the template.
    pub changes: IssueChanges,
    pub applied: Vec<String>,
    pub missing_required: Vec<String>,
    pub invalid_choices: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub issue: Issue,
    /// Fields filled from template defaults.
    pub applied: Vec<String>,
    /// Required fields still without a value.
    pub missing_required: Vec<String>,
    /// Existing values outside the field's allowed options. Kept as is.
    pub invalid_choices: Vec<String>,
}

impl MergeReport {
    /// True when no required field is left unset. Callers may use this to
    /// gate a transition to an active status.
    pub fn is_complete(&self) -> bool {
        self.missing_required.is_empty()
    }
}

/// Compute the changes that merging `template` into `issue` would make.
pub fn plan_merge(issue: &Issue, template: &TemplateContent) -> Result<MergePlan> {
    let mut fields: BTreeMap<String, String> = issue.fields.clone();
    let mut applied = Vec::new();
    let mut missing_required = Vec::new();
    let mut invalid_choices = Vec::new();

    for (name, descriptor) in &template.fields {
        if RESERVED_FIELDS.contains(&name.as_str()) {
            return Err(GhpmError::Validation(format!(
                "template field '{name}' has no mergeable issue counterpart"
            )));
        }

        if name == STATUS_FIELD {
            if let Some(default) = descriptor.default_value() {
                default.parse::<IssueStatus>()?;
            }
            if !allows(descriptor, issue.status.as_str()) {
                invalid_choices.push(name.clone());
            }
            continue;
        }

        match issue.field_value(name) {
            Some(existing) => {
                if !allows(descriptor, existing) {
                    invalid_choices.push(name.clone());
                }
            }
            None => match descriptor.default_value() {
                Some(default) => {
                    fields.insert(name.clone(), default.to_string());
                    applied.push(name.clone());
                }
                None if descriptor.is_required() => missing_required.push(name.clone()),
                None => {}
            },
        }
    }

    let title = merged_title(&issue.title, &template.title);
    let body = if template.fields.is_empty() {
        issue.body.clone()
    } else {
        let block = render_block(template, &fields, issue.status);
        replace_block(&issue.body, &block)
    };

    let changes = IssueChanges {
        title: (title != issue.title).then_some(title),
        body: (body != issue.body).then_some(body),
        status: None,
        fields: (fields != issue.fields).then_some(fields),
    };

    Ok(MergePlan {
        changes,
        applied,
        missing_required,
        invalid_choices,
    })
}

fn allows(descriptor: &FieldDescriptor, value: &str) -> bool {
    let options = descriptor.options();
    options.is_empty() || options.iter().any(|o| o == value)
}

fn merged_title(issue_title: &str, template_title: &str) -> String {
    let prefix = template_title.trim();
    let current = issue_title.trim();
    if prefix.is_empty() || current.starts_with(prefix) {
        return issue_title.to_string();
    }
    if current.is_empty() {
        return prefix.to_string();
    }
    format!("{prefix} {current}")
}

fn render_block(
    template: &TemplateContent,
    fields: &BTreeMap<String, String>,
    status: IssueStatus,
) -> String {
    let mut block = String::from(FIELDS_START);
    block.push('\n');
    for name in template.fields.keys() {
        let value = if name == STATUS_FIELD {
            status.as_str()
        } else {
            fields.get(name).map(|v| v.trim()).unwrap_or("")
        };
        block.push_str(&format!("{}: {}\n", escape_markers(name), escape_markers(value)));
    }
    block.push_str(FIELDS_END);
    block
}

/// Keeps user text from opening or closing a managed block.
fn escape_markers(text: &str) -> String {
    text.replace("<!--", "&lt;!--")
}

fn replace_block(body: &str, block: &str) -> String {
    if let Some(start) = body.find(FIELDS_START) {
        let search_from = start + FIELDS_START.len();
        if let Some(offset) = body[search_from..].find(FIELDS_END) {
            let end = search_from + offset + FIELDS_END.len();
            let mut out = String::with_capacity(body.len() + block.len());
            out.push_str(&body[..start]);
            out.push_str(block);
            out.push_str(&body[end..]);
            return out;
        }
    }
    if body.trim().is_empty() {
        return block.to_string();
    }
    format!("{}\n\n{block}", body.trim_end())
}

impl Synchronizer {
    /// Merge a template's field defaults into an issue.
    ///
    /// Fails when either entity is missing or the remote update fails
    /// (including a partial failure). An incomplete merge still succeeds;
    /// inspect [`MergeReport::missing_required`].
    pub fn apply_template(&self, issue_id: i64, template_id: i64) -> Result<MergeReport> {
        let span = op_span("apply_template", EntityKind::Issue, Some(issue_id));
        let _enter = span.enter();

        let template = self.get_template(template_id)?;
        let _lease = self.leases.acquire(EntityKind::Issue, issue_id);
        let current = self.get_issue(issue_id)?;

        let plan = plan_merge(&current, &template.content)?;
        let issue = if plan.changes.is_empty() {
            current
        } else {
            self.update_issue_locked(&current, &plan.changes)?
        };

        info!(
            template = %template.name,
            applied = plan.applied.len(),
            missing = plan.missing_required.len(),
            "template applied"
        );
        Ok(MergeReport {
            issue,
            applied: plan.applied,
            missing_required: plan.missing_required,
            invalid_choices: plan.invalid_choices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::NewIssue;
    use crate::project::NewProject;
    use crate::store::SqliteStore;
    use crate::template::NewTemplate;
    use crate::testing::ScriptedTool;
    use chrono::Utc;
    use indexmap::IndexMap;
    use serde_json::json;
    use std::sync::Arc;

    fn issue(title: &str, body: &str) -> Issue {
        let now = Utc::now();
        Issue {
            id: 1,
            remote_id: "31".into(),
            project_id: 1,
            title: title.into(),
            body: body.into(),
            status: IssueStatus::Open,
            fields: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn content(title: &str, fields: Vec<(&str, FieldDescriptor)>) -> TemplateContent {
        TemplateContent {
            title: title.into(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<IndexMap<_, _>>(),
        }
    }

    fn apply(issue: &Issue, plan: &MergePlan) -> Issue {
        issue.merged_with(&plan.changes)
    }

    #[test]
    fn default_fills_missing_field() {
        let tpl = content("", vec![("priority", FieldDescriptor::text("medium"))]);
        let plan = plan_merge(&issue("Crash", "trace"), &tpl).unwrap();
        assert_eq!(plan.applied, ["priority"]);
        let merged = apply(&issue("Crash", "trace"), &plan);
        assert!(merged.body.contains("priority: medium"));
        assert_eq!(merged.field_value("priority"), Some("medium"));
        assert!(merged.body.starts_with("trace\n\n<!-- ghpm:fields -->"));
    }

    #[test]
    fn merge_is_idempotent() {
        let tpl = content(
            "[Bug]",
            vec![
                ("priority", FieldDescriptor::text("medium")),
                ("owner", FieldDescriptor::Required { options: vec![] }),
            ],
        );
        let start = issue("Crash", "trace");
        let once = apply(&start, &plan_merge(&start, &tpl).unwrap());
        let again = apply(&start, &plan_merge(&start, &tpl).unwrap());
        assert_eq!(once, again);

        let replan = plan_merge(&once, &tpl).unwrap();
        assert!(replan.changes.is_empty(), "{:?}", replan.changes);
        assert_eq!(once.title, "[Bug] Crash");
        assert!(once.body.contains("owner: \n"));
    }

    #[test]
    fn existing_values_win() {
        let mut start = issue("Crash", "");
        start.fields.insert("priority".into(), "high".into());
        let tpl = content("", vec![("priority", FieldDescriptor::text("medium"))]);
        let plan = plan_merge(&start, &tpl).unwrap();
        assert!(plan.applied.is_empty());
        assert!(plan.changes.fields.is_none());
        assert_eq!(
            plan.changes.body.as_deref(),
            Some("<!-- ghpm:fields -->\npriority: high\n<!-- /ghpm:fields -->")
        );
    }

    #[test]
    fn blank_value_counts_as_missing() {
        let mut start = issue("Crash", "");
        start.fields.insert("priority".into(), "   ".into());
        let tpl = content("", vec![("priority", FieldDescriptor::text("medium"))]);
        let plan = plan_merge(&start, &tpl).unwrap();
        assert_eq!(plan.applied, ["priority"]);
    }

    #[test]
    fn required_without_value_is_reported() {
        let tpl = content(
            "",
            vec![(
                "severity",
                FieldDescriptor::Required {
                    options: vec!["low".into(), "high".into()],
                },
            )],
        );
        let plan = plan_merge(&issue("Crash", ""), &tpl).unwrap();
        assert_eq!(plan.missing_required, ["severity"]);
        assert!(plan.changes.fields.is_none());
    }

    #[test]
    fn out_of_range_choice_is_kept_and_reported() {
        let mut start = issue("Crash", "");
        start.fields.insert("priority".into(), "urgent".into());
        let tpl = content(
            "",
            vec![(
                "priority",
                FieldDescriptor::Choice {
                    options: vec!["low".into(), "medium".into()],
                    default: "medium".into(),
                },
            )],
        );
        let plan = plan_merge(&start, &tpl).unwrap();
        assert_eq!(plan.invalid_choices, ["priority"]);
        assert!(apply(&start, &plan).body.contains("priority: urgent"));
    }

    #[test]
    fn reserved_names_are_rejected() {
        let tpl = content("", vec![("title", FieldDescriptor::text("x"))]);
        let err = plan_merge(&issue("Crash", ""), &tpl).unwrap_err();
        assert!(matches!(err, GhpmError::Validation(_)));
    }

    #[test]
    fn status_field_renders_status_column() {
        let tpl = content("", vec![("status", FieldDescriptor::text("open"))]);
        let plan = plan_merge(&issue("Crash", ""), &tpl).unwrap();
        assert!(plan.changes.body.unwrap().contains("status: open"));

        let bad = content("", vec![("status", FieldDescriptor::text("someday"))]);
        assert!(plan_merge(&issue("Crash", ""), &bad).is_err());
    }

    #[test]
    fn block_is_replaced_in_place() {
        let body = "intro\n\n<!-- ghpm:fields -->\npriority: low\n<!-- /ghpm:fields -->\n\nfooter";
        let out = replace_block(body, "<!-- ghpm:fields -->\nx: y\n<!-- /ghpm:fields -->");
        assert_eq!(
            out,
            "intro\n\n<!-- ghpm:fields -->\nx: y\n<!-- /ghpm:fields -->\n\nfooter"
        );
    }

    #[test]
    fn marker_text_in_values_stays_inside_the_block() {
        let mut start = issue("Crash", "trace");
        start
            .fields
            .insert("note".into(), "see <!-- /ghpm:fields --> here".into());
        let tpl = content("", vec![("note", FieldDescriptor::text("none"))]);

        let once = apply(&start, &plan_merge(&start, &tpl).unwrap());
        assert!(once.body.contains("note: see &lt;!-- /ghpm:fields --> here\n"));
        assert_eq!(once.body.matches(FIELDS_END).count(), 1);

        let replan = plan_merge(&once, &tpl).unwrap();
        assert!(replan.changes.is_empty(), "{:?}", replan.changes);
        let twice = apply(&once, &replan);
        assert_eq!(once.body, twice.body);
    }

    #[test]
    fn blank_default_on_required_field_is_still_missing() {
        let tpl = content(
            "",
            vec![(
                "owner",
                serde_json::from_value::<FieldDescriptor>(
                    json!({"type": "string", "required": true, "default": ""}),
                )
                .unwrap(),
            )],
        );
        let plan = plan_merge(&issue("Crash", ""), &tpl).unwrap();
        assert!(plan.applied.is_empty());
        assert_eq!(plan.missing_required, ["owner"]);
        assert!(plan.changes.fields.is_none());
    }

    #[test]
    fn title_rules() {
        assert_eq!(merged_title("Crash", "[Bug]"), "[Bug] Crash");
        assert_eq!(merged_title("[Bug] Crash", "[Bug]"), "[Bug] Crash");
        assert_eq!(merged_title("", "[Bug]"), "[Bug]");
        assert_eq!(merged_title("Crash", ""), "Crash");
    }

    fn engine() -> (Arc<ScriptedTool>, Synchronizer) {
        let tool = ScriptedTool::new();
        let sync = Synchronizer::new(tool.clone(), Arc::new(SqliteStore::in_memory().unwrap()));
        (tool, sync)
    }

    #[test]
    fn apply_template_updates_remote_then_local() {
        let (tool, sync) = engine();
        tool.push_json(json!({"id": "7"}));
        let project = sync.create_project(&NewProject::new("Alpha")).unwrap();
        tool.push_json(json!({"id": "31"}));
        let issue = sync
            .create_issue(&NewIssue::new(project.id, "Crash", "trace"))
            .unwrap();
        let template = sync
            .create_template(&NewTemplate {
                name: "bug".into(),
                content: content("[Bug]", vec![("priority", FieldDescriptor::text("medium"))]),
            })
            .unwrap();

        let report = sync.apply_template(issue.id, template.id).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.issue.title, "[Bug] Crash");
        assert!(report.issue.body.contains("priority: medium"));
        assert_eq!(tool.calls()[2][..3], ["issue", "edit", "31"]);

        // Second application is a no-op with no remote call.
        let again = sync.apply_template(issue.id, template.id).unwrap();
        assert_eq!(again.issue, report.issue);
        assert_eq!(tool.call_count(), 3);
    }

    #[test]
    fn apply_template_failures() {
        let (tool, sync) = engine();
        assert!(sync.apply_template(1, 1).unwrap_err().is_not_found());

        tool.push_json(json!({"id": "7"}));
        let project = sync.create_project(&NewProject::new("Alpha")).unwrap();
        tool.push_json(json!({"id": "31"}));
        let issue = sync
            .create_issue(&NewIssue::new(project.id, "Crash", ""))
            .unwrap();
        let template = sync
            .create_template(&NewTemplate {
                name: "bug".into(),
                content: content("", vec![("priority", FieldDescriptor::text("medium"))]),
            })
            .unwrap();

        tool.push_exit(1, "denied");
        assert!(sync.apply_template(issue.id, template.id).is_err());
        assert!(sync.get_issue(issue.id).unwrap().fields.is_empty());
    }
}
