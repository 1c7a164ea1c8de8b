//! Resource Synchronizer: sequences remote and local mutations.
//!
//! Identity is remote-authoritative and content is cached locally. Every
//! mutation calls the remote tool first and only touches the local store
//! once the remote call succeeded. A local failure after a remote success is
//! reported as [`GhpmError::PartialFailure`] carrying the orphaned remote id;
//! the remote side is never rolled back automatically.
//!
//! Update and Delete hold the entity's lease from the initial read until the
//! local write has completed or failed. Issue creation holds the owning
//! project's lease so the project cannot be deleted underneath it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, field, info, info_span, warn, Span};
use uuid::Uuid;

use crate::cli_adapter::RemoteTool;
use crate::error::{GhpmError, Result, SyncOperation};
use crate::issue::{Issue, IssueChanges, NewIssue};
use crate::lease::EntityLeases;
use crate::project::{NewProject, Project, ProjectChanges};
use crate::remote::{self, RemoteRef};
use crate::store::{LocalStore, Page};
use crate::template::{NewTemplate, Template, TemplateChanges};
use crate::types::EntityKind;

pub struct Synchronizer {
    tool: Arc<dyn RemoteTool>,
    store: Arc<dyn LocalStore>,
    pub(crate) leases: EntityLeases,
    owner: Option<String>,
}

pub(crate) fn op_span(op: &'static str, kind: EntityKind, id: Option<i64>) -> Span {
    let span = info_span!(
        "sync",
        op,
        kind = kind.as_str(),
        op_id = %Uuid::new_v4(),
        id = field::Empty
    );
    if let Some(id) = id {
        span.record("id", id);
    }
    span
}

impl Synchronizer {
    pub fn new(tool: Arc<dyn RemoteTool>, store: Arc<dyn LocalStore>) -> Self {
        Self {
            tool,
            store,
            leases: EntityLeases::new(),
            owner: None,
        }
    }

    /// Owner passed as `--owner` on project commands.
    pub fn with_owner(mut self, owner: Option<String>) -> Self {
        self.owner = owner;
        self
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    fn remote(&self, args: Vec<String>) -> Result<Value> {
        self.tool.execute(&args).map_err(|e| {
            warn!(error = %e, "remote call failed; local store untouched");
            e
        })
    }

    fn partial(
        kind: EntityKind,
        operation: SyncOperation,
        remote_id: &str,
        source: GhpmError,
    ) -> GhpmError {
        error!(
            remote_id,
            error = %source,
            "remote {kind} {operation} succeeded but local store failed; needs reconciliation"
        );
        GhpmError::PartialFailure {
            kind,
            operation,
            remote_id: remote_id.to_string(),
            source: Box::new(source),
        }
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    pub fn get_project(&self, id: i64) -> Result<Project> {
        self.store
            .get_project(id)?
            .ok_or_else(|| GhpmError::not_found(EntityKind::Project, id))
    }

    pub fn list_projects(&self, page: Page) -> Result<Vec<Project>> {
        self.store.list_projects(page)
    }

    pub fn create_project(&self, draft: &NewProject) -> Result<Project> {
        draft.validate()?;
        let span = op_span("create", EntityKind::Project, None);
        let _enter = span.enter();

        let value = self.remote(remote::create_project_args(draft, self.owner.as_deref()))?;
        let remote = RemoteRef::from_response(value)?;
        let project = self
            .store
            .insert_project(draft, &remote.remote_id)
            .map_err(|e| {
                Self::partial(EntityKind::Project, SyncOperation::Create, &remote.remote_id, e)
            })?;

        span.record("id", project.id);
        info!(remote_id = %project.remote_id, "project created");
        Ok(project)
    }

    pub fn update_project(&self, id: i64, changes: &ProjectChanges) -> Result<Project> {
        changes.validate()?;
        let span = op_span("update", EntityKind::Project, Some(id));
        let _enter = span.enter();
        let _lease = self.leases.acquire(EntityKind::Project, id);

        let current = self.get_project(id)?;
        let resolved = current.merged_with(changes);
        self.remote(remote::edit_project_args(&resolved, self.owner.as_deref()))?;
        let project = self.store.update_project(id, changes).map_err(|e| {
            Self::partial(EntityKind::Project, SyncOperation::Update, &current.remote_id, e)
        })?;

        info!(remote_id = %project.remote_id, "project updated");
        Ok(project)
    }

    /// Refused while local issues still reference the project.
    pub fn delete_project(&self, id: i64) -> Result<()> {
        let span = op_span("delete", EntityKind::Project, Some(id));
        let _enter = span.enter();
        let _lease = self.leases.acquire(EntityKind::Project, id);

        let current = self.get_project(id)?;
        let issues = self.store.count_issues_for_project(id)?;
        if issues > 0 {
            return Err(GhpmError::Validation(format!(
                "project {id} still has {issues} issue(s); delete them first"
            )));
        }
        self.remote(remote::delete_project_args(
            &current.remote_id,
            self.owner.as_deref(),
        ))?;
        self.store.delete_project(id).map_err(|e| {
            Self::partial(EntityKind::Project, SyncOperation::Delete, &current.remote_id, e)
        })?;

        info!(remote_id = %current.remote_id, "project deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Issues
    // -----------------------------------------------------------------------

    pub fn get_issue(&self, id: i64) -> Result<Issue> {
        self.store
            .get_issue(id)?
            .ok_or_else(|| GhpmError::not_found(EntityKind::Issue, id))
    }

    pub fn list_issues(&self, project_id: Option<i64>, page: Page) -> Result<Vec<Issue>> {
        self.store.list_issues(project_id, page)
    }

    pub fn create_issue(&self, draft: &NewIssue) -> Result<Issue> {
        draft.validate()?;
        let span = op_span("create", EntityKind::Issue, None);
        let _enter = span.enter();
        let _lease = self.leases.acquire(EntityKind::Project, draft.project_id);

        let project = self.get_project(draft.project_id)?;
        let value = self.remote(remote::create_issue_args(&project.remote_id, draft))?;
        let remote = RemoteRef::from_response(value)?;
        let issue = self
            .store
            .insert_issue(draft, &remote.remote_id)
            .map_err(|e| {
                Self::partial(EntityKind::Issue, SyncOperation::Create, &remote.remote_id, e)
            })?;

        span.record("id", issue.id);
        info!(remote_id = %issue.remote_id, project_id = issue.project_id, "issue created");
        Ok(issue)
    }

    pub fn update_issue(&self, id: i64, changes: &IssueChanges) -> Result<Issue> {
        changes.validate()?;
        let span = op_span("update", EntityKind::Issue, Some(id));
        let _enter = span.enter();
        let _lease = self.leases.acquire(EntityKind::Issue, id);

        let current = self.get_issue(id)?;
        self.update_issue_locked(&current, changes)
    }

    /// Remote edit then sparse local update. The caller holds the issue lease
    /// and has already validated `changes`.
    pub(crate) fn update_issue_locked(&self, current: &Issue, changes: &IssueChanges) -> Result<Issue> {
        let resolved = current.merged_with(changes);
        self.remote(remote::edit_issue_args(&resolved))?;
        let issue = self.store.update_issue(current.id, changes).map_err(|e| {
            Self::partial(EntityKind::Issue, SyncOperation::Update, &current.remote_id, e)
        })?;

        info!(remote_id = %issue.remote_id, "issue updated");
        Ok(issue)
    }

    /// Update an issue, merging `set_fields` into its field map under the
    /// lease rather than replacing the map.
    pub fn update_issue_merging_fields(
        &self,
        id: i64,
        changes: &IssueChanges,
        set_fields: &BTreeMap<String, String>,
    ) -> Result<Issue> {
        if set_fields.is_empty() {
            return self.update_issue(id, changes);
        }
        let span = op_span("update", EntityKind::Issue, Some(id));
        let _enter = span.enter();
        let _lease = self.leases.acquire(EntityKind::Issue, id);

        let current = self.get_issue(id)?;
        let mut fields = changes
            .fields
            .clone()
            .unwrap_or_else(|| current.fields.clone());
        fields.extend(set_fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        let changes = IssueChanges {
            fields: Some(fields),
            ..changes.clone()
        };
        changes.validate()?;
        self.update_issue_locked(&current, &changes)
    }

    pub fn delete_issue(&self, id: i64) -> Result<()> {
        let span = op_span("delete", EntityKind::Issue, Some(id));
        let _enter = span.enter();
        let _lease = self.leases.acquire(EntityKind::Issue, id);

        let current = self.get_issue(id)?;
        self.remote(remote::delete_issue_args(&current.remote_id))?;
        self.store.delete_issue(id).map_err(|e| {
            Self::partial(EntityKind::Issue, SyncOperation::Delete, &current.remote_id, e)
        })?;

        info!(remote_id = %current.remote_id, "issue deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Remote reads (never cached)
    // -----------------------------------------------------------------------

    pub fn view_remote_project(&self, remote_id: &str) -> Result<Value> {
        let remote_id = non_blank(remote_id)?;
        self.tool
            .execute(&remote::view_project_args(remote_id, self.owner.as_deref()))
    }

    pub fn list_remote_projects(&self) -> Result<Value> {
        self.tool
            .execute(&remote::list_projects_args(self.owner.as_deref()))
    }

    pub fn view_remote_issue(&self, remote_id: &str) -> Result<Value> {
        let remote_id = non_blank(remote_id)?;
        self.tool.execute(&remote::view_issue_args(remote_id))
    }

    pub fn list_remote_issues(&self) -> Result<Value> {
        self.tool.execute(&remote::list_issues_args())
    }

    // -----------------------------------------------------------------------
    // Templates (local only)
    // -----------------------------------------------------------------------

    pub fn get_template(&self, id: i64) -> Result<Template> {
        self.store
            .get_template(id)?
            .ok_or_else(|| GhpmError::not_found(EntityKind::Template, id))
    }

    pub fn list_templates(&self, page: Page) -> Result<Vec<Template>> {
        self.store.list_templates(page)
    }

    pub fn create_template(&self, draft: &NewTemplate) -> Result<Template> {
        draft.validate()?;
        let template = self.store.insert_template(draft)?;
        info!(template = %template.name, id = template.id, "template created");
        Ok(template)
    }

    pub fn update_template(&self, id: i64, changes: &TemplateChanges) -> Result<Template> {
        changes.validate()?;
        let _lease = self.leases.acquire(EntityKind::Template, id);
        self.store.update_template(id, changes)
    }

    pub fn delete_template(&self, id: i64) -> Result<()> {
        let _lease = self.leases.acquire(EntityKind::Template, id);
        self.store.delete_template(id)?;
        info!(id, "template deleted");
        Ok(())
    }
}

fn non_blank(remote_id: &str) -> Result<&str> {
    let trimmed = remote_id.trim();
    if trimmed.is_empty() {
        return Err(GhpmError::Validation("remote id must not be empty".into()));
    }
    Ok(trimmed)
}
