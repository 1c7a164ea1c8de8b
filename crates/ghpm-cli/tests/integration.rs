#![cfg(unix)]
#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::TempDir;

// Scripts are written then executed by a child process; serialize so no
// concurrently forked child holds a write handle on a script being run.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|p| p.into_inner())
}

const FAKE_GH: &str = r#"#!/bin/sh
echo "$*" >> "$(dirname "$0")/calls.log"
case "$1 $2" in
  --version*) echo "gh version 2.40.0" ;;
  "auth status") echo "Logged in" ;;
  "api user") echo "octocat" ;;
  "project view") echo '{"number":7,"title":"Alpha"}' ;;
  "issue list") echo '[{"number":31,"title":"Crash"}]' ;;
  "project create") echo '{"id":"7","title":"Alpha"}' ;;
  "issue create") echo '{"number":31,"url":"https://github.com/o/r/issues/31"}' ;;
  "project edit"|"issue edit") echo '{}' ;;
  "project delete"|"issue delete") echo "Deleted" ;;
  *) echo "unexpected: $*" >&2; exit 2 ;;
esac
"#;

const BROKEN_GH: &str = "#!/bin/sh\necho 'HTTP 502: boom' >&2\nexit 1\n";

fn write_tool(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-gh");
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn ghpm(dir: &TempDir, tool: &Path) -> Command {
    let mut cmd = Command::cargo_bin("ghpm").unwrap();
    cmd.current_dir(dir.path())
        .env("GHPM_ROOT", dir.path())
        .env("GITHUB_CLI_PATH", tool)
        .env_remove("GHPM_DATABASE")
        .env_remove("GHPM_TEMPLATES_DIR")
        .env_remove("GITHUB_TOKEN");
    cmd
}

fn write_bug_template(dir: &TempDir) {
    let templates = dir.path().join("templates");
    std::fs::create_dir_all(&templates).unwrap();
    std::fs::write(
        templates.join("bug.toml"),
        "title = \"[Bug]\"\n\n[fields.priority]\ntype = \"enum\"\noptions = [\"low\", \"medium\", \"high\"]\ndefault = \"medium\"\n",
    )
    .unwrap();
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

fn tool_calls(dir: &TempDir) -> Vec<String> {
    std::fs::read_to_string(dir.path().join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// ghpm project
// ---------------------------------------------------------------------------

#[test]
fn project_create_records_remote_id() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let tool = write_tool(dir.path(), FAKE_GH);

    ghpm(&dir, &tool)
        .args(["project", "create", "Alpha"])
        .assert()
        .success()
        .stdout(predicate::str::contains("remote 7"));

    let out = ghpm(&dir, &tool)
        .args(["--json", "project", "list"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let list = stdout_json(&out);
    assert_eq!(list[0]["remote_id"], "7");
    assert_eq!(list[0]["name"], "Alpha");
    assert!(dir.path().join(".ghpm/ghpm.db").exists());
}

#[test]
fn project_commands_use_account_owner() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let tool = write_tool(dir.path(), FAKE_GH);

    ghpm(&dir, &tool).args(["project", "create", "Alpha"]).assert().success();
    let calls = tool_calls(&dir);
    assert_eq!(calls[0], "api user --jq .login");
    assert_eq!(
        calls[1],
        "project create --title Alpha --owner octocat --format json"
    );
}

#[test]
fn configured_owner_skips_account_lookup() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let tool = write_tool(dir.path(), FAKE_GH);
    std::fs::create_dir_all(dir.path().join(".ghpm")).unwrap();
    std::fs::write(dir.path().join(".ghpm/config.yaml"), "tool:\n  owner: acme\n").unwrap();

    ghpm(&dir, &tool).args(["project", "create", "Alpha"]).assert().success();
    assert_eq!(
        tool_calls(&dir),
        ["project create --title Alpha --owner acme --format json"]
    );
}

#[test]
fn remote_views_read_without_recording() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let tool = write_tool(dir.path(), FAKE_GH);

    let out = ghpm(&dir, &tool)
        .args(["project", "remote", "7"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(stdout_json(&out)["title"], "Alpha");
    assert!(tool_calls(&dir).contains(&"project view 7 --owner octocat --format json".to_string()));

    let out = ghpm(&dir, &tool).args(["issue", "remote"]).output().unwrap();
    assert!(out.status.success());
    assert_eq!(stdout_json(&out)[0]["number"], 31);

    ghpm(&dir, &tool)
        .args(["project", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No projects."));
}

#[test]
fn remote_failure_leaves_no_local_row() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let tool = write_tool(dir.path(), BROKEN_GH);

    ghpm(&dir, &tool)
        .args(["project", "create", "Alpha"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("HTTP 502: boom"));

    ghpm(&dir, &tool)
        .args(["project", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No projects."));
}

#[test]
fn project_with_issues_cannot_be_deleted() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let tool = write_tool(dir.path(), FAKE_GH);

    ghpm(&dir, &tool).args(["project", "create", "Alpha"]).assert().success();
    ghpm(&dir, &tool)
        .args(["issue", "create", "--project", "1", "--title", "Crash"])
        .assert()
        .success();
    ghpm(&dir, &tool)
        .args(["project", "delete", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("still has 1 issue"));
}

// ---------------------------------------------------------------------------
// ghpm issue
// ---------------------------------------------------------------------------

#[test]
fn delete_missing_issue_reports_not_found() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let tool = write_tool(dir.path(), BROKEN_GH);

    ghpm(&dir, &tool)
        .args(["issue", "delete", "99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("issue not found: 99"));
}

#[test]
fn issue_update_sets_status_and_fields() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let tool = write_tool(dir.path(), FAKE_GH);

    ghpm(&dir, &tool).args(["project", "create", "Alpha"]).assert().success();
    ghpm(&dir, &tool)
        .args(["issue", "create", "--project", "1", "--title", "Crash"])
        .assert()
        .success();

    let out = ghpm(&dir, &tool)
        .args([
            "-j",
            "issue",
            "update",
            "1",
            "--status",
            "in-progress",
            "--field",
            "priority=high",
        ])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let issue = stdout_json(&out);
    assert_eq!(issue["status"], "in_progress");
    assert_eq!(issue["fields"]["priority"], "high");
    assert_eq!(issue["remote_id"], "31");

    let out = ghpm(&dir, &tool)
        .args(["-j", "issue", "update", "1", "--field", "owner=ana"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let issue = stdout_json(&out);
    assert_eq!(issue["fields"]["priority"], "high");
    assert_eq!(issue["fields"]["owner"], "ana");
}

#[test]
fn apply_template_renders_defaults() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let tool = write_tool(dir.path(), FAKE_GH);
    write_bug_template(&dir);

    ghpm(&dir, &tool).args(["project", "create", "Alpha"]).assert().success();
    ghpm(&dir, &tool)
        .args(["issue", "create", "--project", "1", "--title", "Crash"])
        .assert()
        .success();
    ghpm(&dir, &tool).args(["template", "sync"]).assert().success();

    let out = ghpm(&dir, &tool)
        .args(["--json", "issue", "apply-template", "1", "--template", "1"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let report = stdout_json(&out);
    assert_eq!(report["issue"]["title"], "[Bug] Crash");
    assert!(report["issue"]["body"]
        .as_str()
        .unwrap()
        .contains("priority: medium"));
}

// ---------------------------------------------------------------------------
// ghpm template
// ---------------------------------------------------------------------------

#[test]
fn template_sync_is_idempotent() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let tool = write_tool(dir.path(), BROKEN_GH);
    write_bug_template(&dir);

    ghpm(&dir, &tool)
        .args(["template", "sync"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 inserted"));
    ghpm(&dir, &tool)
        .args(["template", "sync"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 inserted, 1 already present"));

    let out = ghpm(&dir, &tool)
        .args(["--json", "template", "list"])
        .output()
        .unwrap();
    assert_eq!(stdout_json(&out).as_array().unwrap().len(), 1);

    ghpm(&dir, &tool)
        .args(["template", "show", "bug"])
        .assert()
        .success()
        .stdout(predicate::str::contains("priority = medium"));
}

#[test]
fn template_create_rejects_duplicate_name() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let tool = write_tool(dir.path(), BROKEN_GH);
    write_bug_template(&dir);
    let file = dir.path().join("templates/bug.toml");

    ghpm(&dir, &tool)
        .args(["template", "create", "--file"])
        .arg(&file)
        .assert()
        .success();
    ghpm(&dir, &tool)
        .args(["template", "create", "--file"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("template already exists: bug"));
}

// ---------------------------------------------------------------------------
// ghpm check
// ---------------------------------------------------------------------------

#[test]
fn check_redacts_credential() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let tool = write_tool(dir.path(), FAKE_GH);
    std::fs::create_dir_all(dir.path().join("templates")).unwrap();

    let out = ghpm(&dir, &tool)
        .env("GITHUB_TOKEN", "ghp_supersecret")
        .args(["--json", "check"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(!stdout.contains("ghp_supersecret"));
    let report = stdout_json(&out);
    assert_eq!(report["credential"], "***");
    assert_eq!(report["tool"], "ok");
    assert_eq!(report["owner"], "octocat");
}

#[test]
fn check_fails_when_tool_missing() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("no-such-gh");

    ghpm(&dir, &missing)
        .arg("check")
        .assert()
        .failure()
        .stdout(predicate::str::contains("external tool not found"));

    ghpm(&dir, &missing).args(["check", "--skip-auth"]).assert().success();
}

// ---------------------------------------------------------------------------
// ghpm serve
// ---------------------------------------------------------------------------

#[test]
fn serve_refuses_fatal_config() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let tool = write_tool(dir.path(), FAKE_GH);
    std::fs::create_dir_all(dir.path().join(".ghpm")).unwrap();
    std::fs::write(
        dir.path().join(".ghpm/config.yaml"),
        "tool:\n  timeout_secs: 0\n",
    )
    .unwrap();

    ghpm(&dir, &tool)
        .args(["serve", "--port", "0"])
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .failure()
        .stderr(predicate::str::contains("tool.timeout_secs is 0"));
    assert!(tool_calls(&dir).is_empty());
}
