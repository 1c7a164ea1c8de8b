use crate::error::{GhpmError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const GHPM_DIR: &str = ".ghpm";
pub const CONFIG_FILE: &str = ".ghpm/config.yaml";
pub const DEFAULT_DATABASE: &str = ".ghpm/ghpm.db";
pub const DEFAULT_TEMPLATES_DIR: &str = "templates";

/// Extensions recognised as template documents, in no particular order.
pub const TEMPLATE_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json"];

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn ghpm_dir(root: &Path) -> PathBuf {
    root.join(GHPM_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Resolve `path` against `root` unless it is already absolute.
pub fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

// ---------------------------------------------------------------------------
// Template name validation
// ---------------------------------------------------------------------------

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_\-]*$").unwrap())
}

pub fn validate_template_name(name: &str) -> Result<()> {
    if name.len() > 64 || !name_re().is_match(name) {
        return Err(GhpmError::Validation(format!(
            "invalid template name '{name}': must be lowercase alphanumeric with '-' or '_'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
