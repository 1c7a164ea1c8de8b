use crate::cmd::Session;
use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use ghpm_core::template::Template;
use ghpm_core::template_loader::{parse_template_file, reconcile_templates};
use ghpm_core::types::EntityKind;
use ghpm_core::{GhpmError, Page};
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum TemplateSubcommand {
    /// List stored templates
    List,
    /// Show a template by id or name
    Show { template: String },
    /// Store a template from a .toml, .yaml or .json file
    Create {
        #[arg(long)]
        file: PathBuf,
    },
    /// Delete a stored template
    Delete { id: i64 },
    /// Load templates from the templates directory, skipping names already stored
    Sync,
}

pub fn run(root: &Path, subcmd: TemplateSubcommand, json: bool) -> anyhow::Result<()> {
    let session = Session::open(root)?;
    let sync = &session.sync;
    match subcmd {
        TemplateSubcommand::List => {
            let templates = sync.list_templates(Page::default())?;
            if json {
                return print_json(&templates);
            }
            if templates.is_empty() {
                println!("No templates.");
                return Ok(());
            }
            let rows = templates
                .iter()
                .map(|t| {
                    vec![
                        t.id.to_string(),
                        t.name.clone(),
                        t.content.title.clone(),
                        t.content.fields.len().to_string(),
                    ]
                })
                .collect();
            print_table(&["ID", "NAME", "TITLE", "FIELDS"], rows);
        }
        TemplateSubcommand::Show { template } => {
            let t = match template.parse::<i64>() {
                Ok(id) => sync.get_template(id)?,
                Err(_) => sync
                    .store()
                    .get_template_by_name(&template)?
                    .ok_or_else(|| GhpmError::not_found(EntityKind::Template, &template))?,
            };
            if json {
                return print_json(&t);
            }
            print_template(&t);
        }
        TemplateSubcommand::Create { file } => {
            let draft = parse_template_file(&file)
                .with_context(|| format!("failed to read template {}", file.display()))?;
            let t = sync.create_template(&draft)?;
            if json {
                return print_json(&t);
            }
            println!("Created template {} '{}'.", t.id, t.name);
        }
        TemplateSubcommand::Delete { id } => {
            sync.delete_template(id)?;
            if json {
                return print_json(&serde_json::json!({ "deleted": id }));
            }
            println!("Deleted template {id}.");
        }
        TemplateSubcommand::Sync => {
            let dir = session.config.templates_path(root);
            let report = reconcile_templates(&**sync.store(), &dir)?;
            if json {
                return print_json(&report);
            }
            println!(
                "Templates from {}: {} inserted, {} already present.",
                dir.display(),
                report.inserted.len(),
                report.skipped.len()
            );
            for name in &report.inserted {
                println!("  + {name}");
            }
        }
    }
    Ok(())
}

fn print_template(t: &Template) {
    println!("Template {} '{}'", t.id, t.name);
    println!("  Title: {}", t.content.title);
    for (name, field) in &t.content.fields {
        let mut line = format!("  {name}");
        if let Some(default) = field.default_value() {
            line.push_str(&format!(" = {default}"));
        }
        if field.is_required() {
            line.push_str(" (required)");
        }
        if !field.options().is_empty() {
            line.push_str(&format!(" [{}]", field.options().join("|")));
        }
        println!("{line}");
    }
}
