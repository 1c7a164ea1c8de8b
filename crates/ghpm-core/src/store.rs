//! Local Store Gateway: the persistence contract the synchronizer relies on,
//! plus its SQLite implementation.
//!
//! # Contract
//!
//! Every call is atomic on its own. `get_*` returns `Ok(None)` for an absent
//! row; `update_*` and `delete_*` on an absent row return
//! [`GhpmError::NotFound`]; engine failures return [`GhpmError::Store`], so a
//! caller can always tell "missing" from "broken".

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, Transaction};

use crate::error::{GhpmError, Result};
use crate::issue::{Issue, IssueChanges, NewIssue};
use crate::project::{NewProject, Project, ProjectChanges};
use crate::template::{NewTemplate, Template, TemplateChanges, TemplateContent};
use crate::types::{EntityKind, IssueStatus};

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: u64,
    pub limit: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: 100,
        }
    }
}

impl Page {
    pub fn new(skip: u64, limit: u64) -> Self {
        Self { skip, limit }
    }

    fn bounds(self) -> (i64, i64) {
        (
            i64::try_from(self.limit).unwrap_or(i64::MAX),
            i64::try_from(self.skip).unwrap_or(i64::MAX),
        )
    }
}

// ---------------------------------------------------------------------------
// LocalStore
// ---------------------------------------------------------------------------

pub trait LocalStore: Send + Sync {
    fn get_project(&self, id: i64) -> Result<Option<Project>>;
    fn list_projects(&self, page: Page) -> Result<Vec<Project>>;
    fn insert_project(&self, draft: &NewProject, remote_id: &str) -> Result<Project>;
    fn update_project(&self, id: i64, changes: &ProjectChanges) -> Result<Project>;
    fn delete_project(&self, id: i64) -> Result<()>;

    fn get_issue(&self, id: i64) -> Result<Option<Issue>>;
    /// Issues ordered by id, optionally restricted to one project.
    fn list_issues(&self, project_id: Option<i64>, page: Page) -> Result<Vec<Issue>>;
    fn insert_issue(&self, draft: &NewIssue, remote_id: &str) -> Result<Issue>;
    fn update_issue(&self, id: i64, changes: &IssueChanges) -> Result<Issue>;
    fn delete_issue(&self, id: i64) -> Result<()>;
    fn count_issues_for_project(&self, project_id: i64) -> Result<u64>;

    fn get_template(&self, id: i64) -> Result<Option<Template>>;
    fn get_template_by_name(&self, name: &str) -> Result<Option<Template>>;
    fn list_templates(&self, page: Page) -> Result<Vec<Template>>;
    /// Fails with [`GhpmError::TemplateExists`] when the name is taken.
    fn insert_template(&self, draft: &NewTemplate) -> Result<Template>;
    fn update_template(&self, id: i64, changes: &TemplateChanges) -> Result<Template>;
    fn delete_template(&self, id: i64) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS projects (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id   TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    description TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS issues (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id   TEXT NOT NULL UNIQUE,
    project_id  INTEGER NOT NULL REFERENCES projects(id),
    title       TEXT NOT NULL,
    body        TEXT NOT NULL,
    status      TEXT NOT NULL,
    fields      TEXT NOT NULL DEFAULT '{}',
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_issues_project ON issues(project_id);
CREATE TABLE IF NOT EXISTS templates (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL UNIQUE,
    content     TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT
);
";

const PROJECT_COLUMNS: &str = "id, remote_id, name, description, created_at, updated_at";
const ISSUE_COLUMNS: &str =
    "id, remote_id, project_id, title, body, status, fields, created_at, updated_at";
const TEMPLATE_COLUMNS: &str = "id, name, content, created_at, updated_at";

/// SQLite-backed store. One connection behind a mutex; each call is one
/// transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path` and bootstrap the schema.
    pub fn open(path: &Path) -> Result<Self> {
        crate::io::ensure_parent(path)?;
        Self::bootstrap(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| GhpmError::Store("connection mutex poisoned".into()))
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn now_text() -> String {
    Utc::now().to_rfc3339()
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        remote_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        created_at: ts(row, 4)?,
        updated_at: ts(row, 5)?,
    })
}

fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
    let status: String = row.get(5)?;
    let fields: String = row.get(6)?;
    Ok(Issue {
        id: row.get(0)?,
        remote_id: row.get(1)?,
        project_id: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        status: status
            .parse::<IssueStatus>()
            .map_err(|e| conversion_error(5, e))?,
        fields: serde_json::from_str::<BTreeMap<String, String>>(&fields)
            .map_err(|e| conversion_error(6, e))?,
        created_at: ts(row, 7)?,
        updated_at: ts(row, 8)?,
    })
}

fn template_from_row(row: &Row<'_>) -> rusqlite::Result<Template> {
    let content: String = row.get(2)?;
    let updated_at: Option<String> = row.get(4)?;
    Ok(Template {
        id: row.get(0)?,
        name: row.get(1)?,
        content: serde_json::from_str::<TemplateContent>(&content)
            .map_err(|e| conversion_error(2, e))?,
        created_at: ts(row, 3)?,
        updated_at: match updated_at {
            Some(text) => Some(
                DateTime::parse_from_rfc3339(&text)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|e| conversion_error(4, e))?,
            ),
            None => None,
        },
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

fn query_project(tx: &Transaction<'_>, id: i64) -> Result<Option<Project>> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1");
    Ok(tx.query_row(&sql, params![id], project_from_row).optional()?)
}

fn query_issue(tx: &Transaction<'_>, id: i64) -> Result<Option<Issue>> {
    let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1");
    Ok(tx.query_row(&sql, params![id], issue_from_row).optional()?)
}

fn query_template(tx: &Transaction<'_>, id: i64) -> Result<Option<Template>> {
    let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = ?1");
    Ok(tx.query_row(&sql, params![id], template_from_row).optional()?)
}

// ---------------------------------------------------------------------------
// LocalStore for SqliteStore
// ---------------------------------------------------------------------------

impl LocalStore for SqliteStore {
    fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1");
        Ok(conn.query_row(&sql, params![id], project_from_row).optional()?)
    }

    fn list_projects(&self, page: Page) -> Result<Vec<Project>> {
        let conn = self.lock()?;
        let (limit, offset) = page.bounds();
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY id LIMIT ?1 OFFSET ?2");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit, offset], project_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn insert_project(&self, draft: &NewProject, remote_id: &str) -> Result<Project> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = now_text();
        tx.execute(
            "INSERT INTO projects (remote_id, name, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![remote_id, draft.name, draft.description, now],
        )?;
        let id = tx.last_insert_rowid();
        let project = query_project(&tx, id)?
            .ok_or_else(|| GhpmError::Store(format!("project {id} vanished after insert")))?;
        tx.commit()?;
        Ok(project)
    }

    fn update_project(&self, id: i64, changes: &ProjectChanges) -> Result<Project> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let current =
            query_project(&tx, id)?.ok_or_else(|| GhpmError::not_found(EntityKind::Project, id))?;
        let next = current.merged_with(changes);
        tx.execute(
            "UPDATE projects SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
            params![next.name, next.description, now_text(), id],
        )?;
        let project = query_project(&tx, id)?
            .ok_or_else(|| GhpmError::Store(format!("project {id} vanished after update")))?;
        tx.commit()?;
        Ok(project)
    }

    fn delete_project(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(GhpmError::not_found(EntityKind::Project, id));
        }
        Ok(())
    }

    fn get_issue(&self, id: i64) -> Result<Option<Issue>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1");
        Ok(conn.query_row(&sql, params![id], issue_from_row).optional()?)
    }

    fn list_issues(&self, project_id: Option<i64>, page: Page) -> Result<Vec<Issue>> {
        let conn = self.lock()?;
        let (limit, offset) = page.bounds();
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues
             WHERE (?3 IS NULL OR project_id = ?3)
             ORDER BY id LIMIT ?1 OFFSET ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit, offset, project_id], issue_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn insert_issue(&self, draft: &NewIssue, remote_id: &str) -> Result<Issue> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = now_text();
        tx.execute(
            "INSERT INTO issues (remote_id, project_id, title, body, status, fields, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, '{}', ?6, ?6)",
            params![
                remote_id,
                draft.project_id,
                draft.title,
                draft.body,
                draft.status.as_str(),
                now
            ],
        )?;
        let id = tx.last_insert_rowid();
        let issue = query_issue(&tx, id)?
            .ok_or_else(|| GhpmError::Store(format!("issue {id} vanished after insert")))?;
        tx.commit()?;
        Ok(issue)
    }

    fn update_issue(&self, id: i64, changes: &IssueChanges) -> Result<Issue> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let current =
            query_issue(&tx, id)?.ok_or_else(|| GhpmError::not_found(EntityKind::Issue, id))?;
        let next = current.merged_with(changes);
        let fields = serde_json::to_string(&next.fields)?;
        tx.execute(
            "UPDATE issues SET title = ?1, body = ?2, status = ?3, fields = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                next.title,
                next.body,
                next.status.as_str(),
                fields,
                now_text(),
                id
            ],
        )?;
        let issue = query_issue(&tx, id)?
            .ok_or_else(|| GhpmError::Store(format!("issue {id} vanished after update")))?;
        tx.commit()?;
        Ok(issue)
    }

    fn delete_issue(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM issues WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(GhpmError::not_found(EntityKind::Issue, id));
        }
        Ok(())
    }

    fn count_issues_for_project(&self, project_id: i64) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM issues WHERE project_id = ?1",
            params![project_id],
            |row| row.get(0),
        )?;
        u64::try_from(count).map_err(|_| GhpmError::Store(format!("negative issue count {count}")))
    }

    fn get_template(&self, id: i64) -> Result<Option<Template>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = ?1");
        Ok(conn.query_row(&sql, params![id], template_from_row).optional()?)
    }

    fn get_template_by_name(&self, name: &str) -> Result<Option<Template>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE name = ?1");
        Ok(conn.query_row(&sql, params![name], template_from_row).optional()?)
    }

    fn list_templates(&self, page: Page) -> Result<Vec<Template>> {
        let conn = self.lock()?;
        let (limit, offset) = page.bounds();
        let sql =
            format!("SELECT {TEMPLATE_COLUMNS} FROM templates ORDER BY id LIMIT ?1 OFFSET ?2");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit, offset], template_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn insert_template(&self, draft: &NewTemplate) -> Result<Template> {
        let content = serde_json::to_string(&draft.content)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO templates (name, content, created_at) VALUES (?1, ?2, ?3)",
            params![draft.name, content, now_text()],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                GhpmError::TemplateExists(draft.name.clone())
            } else {
                GhpmError::from(e)
            }
        })?;
        let id = tx.last_insert_rowid();
        let template = query_template(&tx, id)?
            .ok_or_else(|| GhpmError::Store(format!("template {id} vanished after insert")))?;
        tx.commit()?;
        Ok(template)
    }

    fn update_template(&self, id: i64, changes: &TemplateChanges) -> Result<Template> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let current = query_template(&tx, id)?
            .ok_or_else(|| GhpmError::not_found(EntityKind::Template, id))?;
        let name = changes.name.clone().unwrap_or(current.name);
        let content = serde_json::to_string(changes.content.as_ref().unwrap_or(&current.content))?;
        tx.execute(
            "UPDATE templates SET name = ?1, content = ?2, updated_at = ?3 WHERE id = ?4",
            params![name, content, now_text(), id],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                GhpmError::TemplateExists(name.clone())
            } else {
                GhpmError::from(e)
            }
        })?;
        let template = query_template(&tx, id)?
            .ok_or_else(|| GhpmError::Store(format!("template {id} vanished after update")))?;
        tx.commit()?;
        Ok(template)
    }

    fn delete_template(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM templates WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(GhpmError::not_found(EntityKind::Template, id));
        }
        Ok(())
    }
}
