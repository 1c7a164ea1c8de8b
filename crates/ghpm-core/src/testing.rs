//! Test doubles shared by this crate's tests and the server's integration
//! tests. Not part of the supported API.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::cli_adapter::RemoteTool;
use crate::error::{GhpmError, Result, ToolFailure};
use crate::issue::{Issue, IssueChanges, NewIssue};
use crate::project::{NewProject, Project, ProjectChanges};
use crate::store::{LocalStore, Page};
use crate::template::{NewTemplate, Template, TemplateChanges};

// ---------------------------------------------------------------------------
// ScriptedTool
// ---------------------------------------------------------------------------

/// A [`RemoteTool`] that records every argument vector and answers from a
/// queue. An empty queue answers with empty stdout.
#[derive(Default)]
pub struct ScriptedTool {
    calls: Mutex<Vec<Vec<String>>>,
    responses: Mutex<VecDeque<Result<String>>>,
}

impl ScriptedTool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_stdout(&self, stdout: impl Into<String>) -> &Self {
        self.queue().push_back(Ok(stdout.into()));
        self
    }

    pub fn push_json(&self, value: Value) -> &Self {
        self.push_stdout(value.to_string())
    }

    pub fn push_error(&self, err: GhpmError) -> &Self {
        self.queue().push_back(Err(err));
        self
    }

    /// Queue a nonzero exit with `stderr` as the diagnostic.
    pub fn push_exit(&self, code: i32, stderr: &str) -> &Self {
        self.push_error(GhpmError::ExternalTool {
            failure: ToolFailure::Exit(code),
            diagnostic: stderr.to_string(),
        })
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String>>> {
        self.responses.lock().unwrap()
    }
}

impl RemoteTool for ScriptedTool {
    fn execute_raw(&self, args: &[String]) -> Result<String> {
        self.calls.lock().unwrap().push(args.to_vec());
        self.queue().pop_front().unwrap_or_else(|| Ok(String::new()))
    }
}

// ---------------------------------------------------------------------------
// FailingStore
// ---------------------------------------------------------------------------

/// Wraps a real store and fails selected mutation classes on demand.
pub struct FailingStore {
    inner: Arc<dyn LocalStore>,
    fail_inserts: AtomicBool,
    fail_updates: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FailingStore {
    pub fn new(inner: Arc<dyn LocalStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_inserts: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        })
    }

    pub fn fail_inserts(&self, on: bool) {
        self.fail_inserts.store(on, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, on: bool) {
        self.fail_updates.store(on, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, on: bool) {
        self.fail_deletes.store(on, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(GhpmError::Store(format!("injected {what} failure")));
        }
        Ok(())
    }
}

impl LocalStore for FailingStore {
    fn get_project(&self, id: i64) -> Result<Option<Project>> {
        self.inner.get_project(id)
    }

    fn list_projects(&self, page: Page) -> Result<Vec<Project>> {
        self.inner.list_projects(page)
    }

    fn insert_project(&self, draft: &NewProject, remote_id: &str) -> Result<Project> {
        Self::check(&self.fail_inserts, "insert")?;
        self.inner.insert_project(draft, remote_id)
    }

    fn update_project(&self, id: i64, changes: &ProjectChanges) -> Result<Project> {
        Self::check(&self.fail_updates, "update")?;
        self.inner.update_project(id, changes)
    }

    fn delete_project(&self, id: i64) -> Result<()> {
        Self::check(&self.fail_deletes, "delete")?;
        self.inner.delete_project(id)
    }

    fn get_issue(&self, id: i64) -> Result<Option<Issue>> {
        self.inner.get_issue(id)
    }

    fn list_issues(&self, project_id: Option<i64>, page: Page) -> Result<Vec<Issue>> {
        self.inner.list_issues(project_id, page)
    }

    fn insert_issue(&self, draft: &NewIssue, remote_id: &str) -> Result<Issue> {
        Self::check(&self.fail_inserts, "insert")?;
        self.inner.insert_issue(draft, remote_id)
    }

    fn update_issue(&self, id: i64, changes: &IssueChanges) -> Result<Issue> {
        Self::check(&self.fail_updates, "update")?;
        self.inner.update_issue(id, changes)
    }

    fn delete_issue(&self, id: i64) -> Result<()> {
        Self::check(&self.fail_deletes, "delete")?;
        self.inner.delete_issue(id)
    }

    fn count_issues_for_project(&self, project_id: i64) -> Result<u64> {
        self.inner.count_issues_for_project(project_id)
    }

    fn get_template(&self, id: i64) -> Result<Option<Template>> {
        self.inner.get_template(id)
    }

    fn get_template_by_name(&self, name: &str) -> Result<Option<Template>> {
        self.inner.get_template_by_name(name)
    }

    fn list_templates(&self, page: Page) -> Result<Vec<Template>> {
        self.inner.list_templates(page)
    }

    fn insert_template(&self, draft: &NewTemplate) -> Result<Template> {
        Self::check(&self.fail_inserts, "insert")?;
        self.inner.insert_template(draft)
    }

    fn update_template(&self, id: i64, changes: &TemplateChanges) -> Result<Template> {
        Self::check(&self.fail_updates, "update")?;
        self.inner.update_template(id, changes)
    }

    fn delete_template(&self, id: i64) -> Result<()> {
        Self::check(&self.fail_deletes, "delete")?;
        self.inner.delete_template(id)
    }
}
