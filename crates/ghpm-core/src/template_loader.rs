//! Template reconciliation from a directory of template documents.
//!
//! One file per template; the name is the file stem unless the document
//! carries a `name` key. Reconciliation reads first and inserts only names
//! that are absent, so running it twice never duplicates or overwrites.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{GhpmError, Result};
use crate::paths::TEMPLATE_EXTENSIONS;
use crate::store::LocalStore;
use crate::template::{FieldDescriptor, NewTemplate, TemplateContent};

#[derive(Debug, Deserialize)]
struct TemplateFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    fields: IndexMap<String, FieldDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub inserted: Vec<String>,
    pub skipped: Vec<String>,
}

fn template_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if path.is_file() && TEMPLATE_EXTENSIONS.contains(&ext) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parse a single template document. The format follows the extension.
pub fn parse_template_file(path: &Path) -> Result<NewTemplate> {
    let invalid = |e: &dyn std::fmt::Display| {
        GhpmError::Validation(format!("template {}: {e}", path.display()))
    };

    let text = std::fs::read_to_string(path)?;
    let doc: TemplateFile = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&text).map_err(|e| invalid(&e))?,
        Some("json") => serde_json::from_str(&text).map_err(|e| invalid(&e))?,
        _ => serde_yaml::from_str(&text).map_err(|e| invalid(&e))?,
    };

    let name = match doc.name {
        Some(name) => name,
        None => path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| invalid(&"file name is not valid UTF-8"))?
            .to_string(),
    };
    let template = NewTemplate {
        name,
        content: TemplateContent {
            title: doc.title,
            fields: doc.fields,
        },
    };
    template.validate().map_err(|e| invalid(&e))?;
    Ok(template)
}

/// Load every template document in `dir`, in file-name order.
pub fn load_template_sources(dir: &Path) -> Result<Vec<NewTemplate>> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "templates directory not found; nothing to load");
        return Ok(Vec::new());
    }
    template_files(dir)?
        .iter()
        .map(|path| parse_template_file(path))
        .collect()
}

/// Insert every template from `dir` whose name is not yet stored.
pub fn reconcile_templates(store: &dyn LocalStore, dir: &Path) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();
    for draft in load_template_sources(dir)? {
        if store.get_template_by_name(&draft.name)?.is_some() {
            debug!(template = %draft.name, "template exists; skipping");
            report.skipped.push(draft.name);
            continue;
        }
        match store.insert_template(&draft) {
            Ok(_) => report.inserted.push(draft.name),
            Err(GhpmError::TemplateExists(name)) => {
                debug!(template = %name, "template inserted concurrently; skipping");
                report.skipped.push(name);
            }
            Err(e) => return Err(e),
        }
    }
    info!(
        inserted = report.inserted.len(),
        skipped = report.skipped.len(),
        "template reconciliation complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Page, SqliteStore};
    use tempfile::TempDir;

    const BUG_TOML: &str = r#"
title = "[Bug]"

[fields.priority]
type = "enum"
options = ["low", "medium", "high"]
default = "medium"

[fields.steps]
type = "text"
required = true
"#;

    const FEATURE_YAML: &str = "
title: '[Feature]'
fields:
  area:
    type: string
    default: core
";

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn loads_all_formats_in_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "bug.toml", BUG_TOML);
        write(dir.path(), "feature.yaml", FEATURE_YAML);
        write(
            dir.path(),
            "chore.json",
            r#"{"name": "maintenance", "title": "[Chore]", "fields": {}}"#,
        );
        write(dir.path(), "README.md", "not a template");

        let loaded = load_template_sources(dir.path()).unwrap();
        let names: Vec<_> = loaded.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["bug", "maintenance", "feature"]);

        let bug = &loaded[0].content;
        assert_eq!(bug.title, "[Bug]");
        let keys: Vec<_> = bug.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, ["priority", "steps"]);
        assert_eq!(bug.fields["priority"].default_value(), Some("medium"));
        assert!(bug.fields["steps"].is_required());
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let loaded = load_template_sources(&dir.path().join("absent")).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn invalid_document_names_the_file() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "broken.toml",
            "[fields.priority]\ntype = \"enum\"\noptions = [\"low\"]\ndefault = \"high\"\n",
        );
        let err = load_template_sources(dir.path()).unwrap_err();
        assert!(matches!(&err, GhpmError::Validation(msg) if msg.contains("broken.toml")));
    }

    #[test]
    fn invalid_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Bad Name.yaml", FEATURE_YAML);
        assert!(load_template_sources(dir.path()).is_err());
    }

    #[test]
    fn reconcile_twice_inserts_once() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "bug.toml", BUG_TOML);
        write(dir.path(), "feature.yml", FEATURE_YAML);
        let store = SqliteStore::in_memory().unwrap();

        let first = reconcile_templates(&store, dir.path()).unwrap();
        assert_eq!(first.inserted, ["bug", "feature"]);
        assert!(first.skipped.is_empty());

        let second = reconcile_templates(&store, dir.path()).unwrap();
        assert!(second.inserted.is_empty());
        assert_eq!(second.skipped, ["bug", "feature"]);
        assert_eq!(store.list_templates(Page::default()).unwrap().len(), 2);
    }

    #[test]
    fn reconcile_never_overwrites() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "feature.yaml", FEATURE_YAML);
        let store = SqliteStore::in_memory().unwrap();
        store
            .insert_template(&NewTemplate {
                name: "feature".into(),
                content: TemplateContent {
                    title: "[Custom]".into(),
                    fields: IndexMap::new(),
                },
            })
            .unwrap();

        reconcile_templates(&store, dir.path()).unwrap();
        let kept = store.get_template_by_name("feature").unwrap().unwrap();
        assert_eq!(kept.content.title, "[Custom]");
    }
}
