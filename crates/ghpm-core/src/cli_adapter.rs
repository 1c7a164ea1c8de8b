//! Subprocess driver for the external issue-tracker CLI (`gh` by default).
//!
//! Every call is one blocking process spawn: no pooling, no persistent
//! session. The exit code is the only success signal. On success, stdout is
//! parsed as JSON; free-text confirmations are wrapped as `{"output": text}`.
//!
//! # Failure classes
//! - tool not found / not authenticated: detected once by [`CliAdapter::connect`]
//!   and fatal at startup.
//! - tool present but erroring: per call, as [`GhpmError::ExternalTool`]. A call
//!   that exceeds the configured timeout is killed and reported the same way.
//!
//! The adapter never retries.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use serde_json::Value;
use wait_timeout::ChildExt;

use crate::config::AdapterConfig;
use crate::error::{GhpmError, Result, ToolFailure};
use crate::remote;

/// Upper bound on diagnostic text carried in errors.
const DIAGNOSTIC_LIMIT: usize = 500;

// ---------------------------------------------------------------------------
// RemoteTool
// ---------------------------------------------------------------------------

/// Structured command/response access to the remote tracker.
pub trait RemoteTool: Send + Sync {
    /// Run the tool and return its trimmed standard output.
    fn execute_raw(&self, args: &[String]) -> Result<String>;

    /// Run the tool and parse its output; see [`parse_output`].
    fn execute(&self, args: &[String]) -> Result<Value> {
        Ok(parse_output(&self.execute_raw(args)?))
    }
}

/// Parse tool stdout: JSON when it parses, otherwise `{"output": trimmed}`.
pub fn parse_output(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return serde_json::json!({ "output": "" });
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| serde_json::json!({ "output": trimmed }))
}

// ---------------------------------------------------------------------------
// CliAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct RawOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl RawOutput {
    /// Stderr when present, otherwise the head of stdout.
    fn diagnostic(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        text.chars().take(DIAGNOSTIC_LIMIT).collect()
    }

    fn failure(&self) -> ToolFailure {
        match self.status.code() {
            Some(code) => ToolFailure::Exit(code),
            None => ToolFailure::Signal,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CliAdapter {
    config: AdapterConfig,
}

impl CliAdapter {
    /// Construct without probing the tool.
    pub fn new(config: AdapterConfig) -> Self {
        Self { config }
    }

    /// Construct and run the startup checks in [`CliAdapter::validate`].
    /// Without a configured owner, the authenticated account becomes the
    /// owner of project commands.
    pub fn connect(config: AdapterConfig) -> Result<Self> {
        let mut adapter = Self::new(config);
        adapter.validate()?;
        if adapter.config.owner.is_none() {
            adapter.config.owner = Some(adapter.resolve_owner()?);
        }
        Ok(adapter)
    }

    /// Login of the account the tool is authenticated as.
    pub fn resolve_owner(&self) -> Result<String> {
        let stdout = self.execute_raw(&remote::current_user_args())?;
        let login = stdout.lines().next().unwrap_or("").trim();
        if login.is_empty() {
            return Err(GhpmError::ExternalTool {
                failure: ToolFailure::MalformedOutput,
                diagnostic: "account lookup returned no login".into(),
            });
        }
        tracing::info!(owner = login, "project owner resolved from account");
        Ok(login.to_string())
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Classify the tool as missing, unauthenticated or usable.
    pub fn validate(&self) -> Result<()> {
        let path = self.locate()?;
        tracing::debug!(path = %path.display(), "external tool located");

        let version = self.run(&["--version".to_string()])?;
        if !version.status.success() {
            return Err(GhpmError::ExternalTool {
                failure: version.failure(),
                diagnostic: version.diagnostic(),
            });
        }

        let auth = self.run(&["auth".to_string(), "status".to_string()])?;
        if !auth.status.success() {
            return Err(GhpmError::ToolNotAuthenticated(auth.diagnostic()));
        }

        tracing::info!(
            version = %version.stdout.lines().next().unwrap_or("").trim(),
            "external tool ready"
        );
        Ok(())
    }

    /// Resolve the executable: explicit paths must exist, bare names go
    /// through `PATH`.
    fn locate(&self) -> Result<PathBuf> {
        let exe = &self.config.executable;
        if exe.components().count() > 1 {
            return if exe.is_file() {
                Ok(exe.clone())
            } else {
                Err(GhpmError::ToolNotFound(exe.display().to_string()))
            };
        }
        which::which(exe).map_err(|_| GhpmError::ToolNotFound(exe.display().to_string()))
    }

    fn build_command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.config.executable);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("GH_PROMPT_DISABLED", "1");
        if let Some(credential) = &self.config.credential {
            cmd.env(&self.config.credential_env, credential.expose());
        }
        cmd
    }

    fn run(&self, args: &[String]) -> Result<RawOutput> {
        let started = Instant::now();
        tracing::debug!(?args, "invoking external tool");

        let mut child = self.build_command(args).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GhpmError::ToolNotFound(self.config.executable.display().to_string())
            } else {
                GhpmError::ExternalTool {
                    failure: ToolFailure::Spawn,
                    diagnostic: e.to_string(),
                }
            }
        })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let waited = child
            .wait_timeout(self.config.timeout)
            .map_err(|e| GhpmError::ExternalTool {
                failure: ToolFailure::Spawn,
                diagnostic: format!("wait failed: {e}"),
            })?;
        let status = match waited {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(
                    ?args,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "external tool timed out"
                );
                // Reader threads are left to finish on their own: a
                // grandchild may still hold the pipes open.
                return Err(GhpmError::ExternalTool {
                    failure: ToolFailure::Timeout(self.config.timeout),
                    diagnostic: format!(
                        "'{}' did not finish",
                        args.first().map(String::as_str).unwrap_or("")
                    ),
                });
            }
        };

        let output = RawOutput {
            status,
            stdout: collect(stdout),
            stderr: collect(stderr),
        };
        tracing::debug!(
            exit_code = ?output.status.code(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "external tool finished"
        );
        Ok(output)
    }
}

impl RemoteTool for CliAdapter {
    fn execute_raw(&self, args: &[String]) -> Result<String> {
        let output = self.run(args)?;
        if !output.status.success() {
            tracing::warn!(?args, exit_code = ?output.status.code(), "external tool failed");
            return Err(GhpmError::ExternalTool {
                failure: output.failure(),
                diagnostic: output.diagnostic(),
            });
        }
        Ok(output.stdout.trim().to_string())
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut r) = pipe {
            let _ = r.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(handle: JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}
