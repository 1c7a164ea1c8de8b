use crate::cmd::Session;
use crate::output::{print_json, print_table, truncate};
use anyhow::bail;
use clap::Subcommand;
use ghpm_core::issue::{Issue, IssueChanges, NewIssue};
use ghpm_core::types::IssueStatus;
use ghpm_core::Page;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Subcommand)]
pub enum IssueSubcommand {
    /// Create an issue in a project, remotely then locally
    Create {
        /// Local project id
        #[arg(long)]
        project: i64,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        body: String,
        /// open | in_progress | closed
        #[arg(long, default_value = "open")]
        status: IssueStatus,
    },
    /// List issues, optionally for one project
    List {
        #[arg(long)]
        project: Option<i64>,
        #[arg(long, default_value_t = 0)]
        skip: u64,
        #[arg(long, default_value_t = 100)]
        limit: u64,
    },
    /// Show one issue with its custom fields
    Show { id: i64 },
    /// Edit an issue remotely, then locally
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
        #[arg(long)]
        status: Option<IssueStatus>,
        /// Set a custom field (repeatable: --field priority=high)
        #[arg(long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,
    },
    /// Delete an issue remotely, then locally
    Delete { id: i64 },
    /// Merge a template's field defaults into an issue
    ApplyTemplate {
        id: i64,
        /// Local template id
        #[arg(long)]
        template: i64,
    },
    /// Show an issue as the remote side sees it, or list remote issues
    Remote {
        /// Remote issue id; omit to list
        remote_id: Option<String>,
    },
}

pub fn run(root: &Path, subcmd: IssueSubcommand, json: bool) -> anyhow::Result<()> {
    let session = Session::open(root)?;
    let sync = &session.sync;
    match subcmd {
        IssueSubcommand::Create {
            project,
            title,
            body,
            status,
        } => {
            let draft = NewIssue {
                project_id: project,
                title,
                body,
                status,
            };
            let issue = sync.create_issue(&draft)?;
            if json {
                return print_json(&issue);
            }
            println!(
                "Created issue {} '{}' (remote {}).",
                issue.id, issue.title, issue.remote_id
            );
        }
        IssueSubcommand::List {
            project,
            skip,
            limit,
        } => {
            let issues = sync.list_issues(project, Page::new(skip, limit))?;
            if json {
                return print_json(&issues);
            }
            if issues.is_empty() {
                println!("No issues.");
                return Ok(());
            }
            let rows = issues
                .iter()
                .map(|i| {
                    vec![
                        i.id.to_string(),
                        i.remote_id.clone(),
                        i.project_id.to_string(),
                        i.status.to_string(),
                        truncate(&i.title, 50),
                    ]
                })
                .collect();
            print_table(&["ID", "REMOTE", "PROJECT", "STATUS", "TITLE"], rows);
        }
        IssueSubcommand::Show { id } => {
            let issue = sync.get_issue(id)?;
            if json {
                return print_json(&issue);
            }
            print_issue(&issue);
        }
        IssueSubcommand::Update {
            id,
            title,
            body,
            status,
            fields,
        } => {
            let mut set_fields = BTreeMap::new();
            for pair in &fields {
                let (name, value) = parse_field(pair)?;
                set_fields.insert(name.to_string(), value.to_string());
            }
            let changes = IssueChanges {
                title,
                body,
                status,
                fields: None,
            };
            let issue = sync.update_issue_merging_fields(id, &changes, &set_fields)?;
            if json {
                return print_json(&issue);
            }
            println!("Updated issue {} (remote {}).", issue.id, issue.remote_id);
        }
        IssueSubcommand::Delete { id } => {
            sync.delete_issue(id)?;
            if json {
                return print_json(&serde_json::json!({ "deleted": id }));
            }
            println!("Deleted issue {id}.");
        }
        IssueSubcommand::ApplyTemplate { id, template } => {
            let report = sync.apply_template(id, template)?;
            if json {
                return print_json(&report);
            }
            println!("Applied template {template} to issue {id}.");
            println!("  Title:   {}", report.issue.title);
            if !report.applied.is_empty() {
                println!("  Filled:  {}", report.applied.join(", "));
            }
            if !report.invalid_choices.is_empty() {
                println!("  Out of range (kept): {}", report.invalid_choices.join(", "));
            }
            if !report.is_complete() {
                println!(
                    "  Incomplete: required fields unset: {}",
                    report.missing_required.join(", ")
                );
            }
        }
        IssueSubcommand::Remote { remote_id } => {
            let value = match remote_id {
                Some(remote_id) => sync.view_remote_issue(&remote_id)?,
                None => sync.list_remote_issues()?,
            };
            print_json(&value)?;
        }
    }
    Ok(())
}

fn parse_field(pair: &str) -> anyhow::Result<(&str, &str)> {
    match pair.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value)),
        _ => bail!("invalid --field '{pair}': expected NAME=VALUE"),
    }
}

fn print_issue(i: &Issue) {
    println!("Issue {} (remote {})", i.id, i.remote_id);
    println!("  Project: {}", i.project_id);
    println!("  Title:   {}", i.title);
    println!("  Status:  {}", i.status);
    for (name, value) in &i.fields {
        println!("  {name}: {value}");
    }
    if !i.body.is_empty() {
        println!();
        println!("{}", i.body);
    }
}
