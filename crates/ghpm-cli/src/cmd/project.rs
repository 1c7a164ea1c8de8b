use crate::cmd::Session;
use crate::output::{print_json, print_table, truncate};
use clap::Subcommand;
use ghpm_core::project::{NewProject, Project, ProjectChanges};
use ghpm_core::Page;
use std::path::Path;

#[derive(Subcommand)]
pub enum ProjectSubcommand {
    /// Create a project remotely, then record it locally
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// List locally recorded projects
    List {
        #[arg(long, default_value_t = 0)]
        skip: u64,
        #[arg(long, default_value_t = 100)]
        limit: u64,
    },
    /// Show one project
    Show { id: i64 },
    /// Edit a project remotely, then locally
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a project remotely, then locally
    Delete { id: i64 },
    /// Show a project as the remote side sees it, or list remote projects
    Remote {
        /// Remote project id; omit to list
        remote_id: Option<String>,
    },
}

pub fn run(root: &Path, subcmd: ProjectSubcommand, json: bool) -> anyhow::Result<()> {
    let session = match subcmd {
        ProjectSubcommand::List { .. } | ProjectSubcommand::Show { .. } => Session::open(root)?,
        _ => Session::open_with_owner(root)?,
    };
    let sync = &session.sync;
    match subcmd {
        ProjectSubcommand::Create { name, description } => {
            let draft = NewProject { name, description };
            let project = sync.create_project(&draft)?;
            if json {
                return print_json(&project);
            }
            println!(
                "Created project {} '{}' (remote {}).",
                project.id, project.name, project.remote_id
            );
        }
        ProjectSubcommand::List { skip, limit } => {
            let projects = sync.list_projects(Page::new(skip, limit))?;
            if json {
                return print_json(&projects);
            }
            if projects.is_empty() {
                println!("No projects.");
                return Ok(());
            }
            let rows = projects
                .iter()
                .map(|p| {
                    vec![
                        p.id.to_string(),
                        p.remote_id.clone(),
                        truncate(&p.name, 40),
                        truncate(p.description.as_deref().unwrap_or(""), 50),
                    ]
                })
                .collect();
            print_table(&["ID", "REMOTE", "NAME", "DESCRIPTION"], rows);
        }
        ProjectSubcommand::Show { id } => {
            let project = sync.get_project(id)?;
            if json {
                return print_json(&project);
            }
            print_project(&project);
        }
        ProjectSubcommand::Update {
            id,
            name,
            description,
        } => {
            let project = sync.update_project(id, &ProjectChanges { name, description })?;
            if json {
                return print_json(&project);
            }
            println!("Updated project {} (remote {}).", project.id, project.remote_id);
        }
        ProjectSubcommand::Delete { id } => {
            sync.delete_project(id)?;
            if json {
                return print_json(&serde_json::json!({ "deleted": id }));
            }
            println!("Deleted project {id}.");
        }
        ProjectSubcommand::Remote { remote_id } => {
            let value = match remote_id {
                Some(remote_id) => sync.view_remote_project(&remote_id)?,
                None => sync.list_remote_projects()?,
            };
            print_json(&value)?;
        }
    }
    Ok(())
}

fn print_project(p: &Project) {
    println!("Project {} (remote {})", p.id, p.remote_id);
    println!("  Name:        {}", p.name);
    println!("  Description: {}", p.description.as_deref().unwrap_or("-"));
    println!("  Created:     {}", p.created_at.to_rfc3339());
    println!("  Updated:     {}", p.updated_at.to_rfc3339());
}
