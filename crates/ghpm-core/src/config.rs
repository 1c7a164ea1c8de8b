use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ToolConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "default_executable")]
    pub executable: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Passed as `--owner` on project commands when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Name of the environment variable holding the credential.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_executable() -> PathBuf {
    PathBuf::from("gh")
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            timeout_secs: default_timeout_secs(),
            owner: None,
            token_env: default_token_env(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub tool: ToolConfig,
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
}

fn default_version() -> u32 {
    1
}

fn default_database() -> PathBuf {
    PathBuf::from(paths::DEFAULT_DATABASE)
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from(paths::DEFAULT_TEMPLATES_DIR)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            tool: ToolConfig::default(),
            database: default_database(),
            templates_dir: default_templates_dir(),
        }
    }
}

impl Config {
    /// Load `.ghpm/config.yaml` under `root`; a missing file yields defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Apply `GITHUB_CLI_PATH`, `GHPM_DATABASE` and `GHPM_TEMPLATES_DIR`.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(exe) = lookup("GITHUB_CLI_PATH").filter(|v| !v.is_empty()) {
            self.tool.executable = PathBuf::from(exe);
        }
        if let Some(db) = lookup("GHPM_DATABASE").filter(|v| !v.is_empty()) {
            self.database = PathBuf::from(db);
        }
        if let Some(dir) = lookup("GHPM_TEMPLATES_DIR").filter(|v| !v.is_empty()) {
            self.templates_dir = PathBuf::from(dir);
        }
    }

    pub fn database_path(&self, root: &Path) -> PathBuf {
        paths::resolve(root, &self.database)
    }

    pub fn templates_path(&self, root: &Path) -> PathBuf {
        paths::resolve(root, &self.templates_dir)
    }

    /// Build the immutable adapter configuration, reading the credential
    /// from the environment variable named by `tool.token_env`.
    pub fn adapter_config(&self) -> AdapterConfig {
        let credential = std::env::var(&self.tool.token_env)
            .ok()
            .filter(|t| !t.is_empty())
            .map(Credential::new);
        AdapterConfig {
            executable: self.tool.executable.clone(),
            credential,
            credential_env: self.tool.token_env.clone(),
            timeout: Duration::from_secs(self.tool.timeout_secs),
            owner: self.tool.owner.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self, root: &Path) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.tool.executable.as_os_str().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "tool.executable is empty".to_string(),
            });
        }

        if self.tool.timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "tool.timeout_secs is 0; every call would time out".to_string(),
            });
        }

        if self.tool.token_env.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "tool.token_env is empty; no credential will be injected".to_string(),
            });
        }

        let templates = self.templates_path(root);
        if !templates.is_dir() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "templates directory '{}' does not exist; no templates will be loaded",
                    templates.display()
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Credential / AdapterConfig
// ---------------------------------------------------------------------------

/// Secret token. Never printed: `Debug` and `Display` both redact it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Everything the CLI adapter needs, fixed at construction time.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub executable: PathBuf,
    pub credential: Option<Credential>,
    /// Environment variable the credential is injected as.
    pub credential_env: String,
    pub timeout: Duration,
    pub owner: Option<String>,
}

impl AdapterConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            credential: None,
            credential_env: default_token_env(),
            timeout: Duration::from_secs(default_timeout_secs()),
            owner: None,
        }
    }

    pub fn with_credential(mut self, token: impl Into<String>) -> Self {
        self.credential = Some(Credential::new(token));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
