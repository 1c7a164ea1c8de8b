mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    issue::IssueSubcommand, project::ProjectSubcommand, template::TemplateSubcommand,
};
use ghpm_core::GhpmError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ghpm",
    about = "Projects, issues and templates kept in sync with GitHub through the gh CLI",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .ghpm/ or .git/)
    #[arg(long, global = true, env = "GHPM_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API (validates the tool and loads templates first)
    Serve {
        #[arg(long, default_value_t = 8000)]
        port: u16,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Check configuration and the external tool
    Check {
        /// Only check configuration; do not run the tool
        #[arg(long)]
        skip_auth: bool,
    },

    /// Manage projects
    Project {
        #[command(subcommand)]
        subcommand: ProjectSubcommand,
    },

    /// Manage issues
    Issue {
        #[command(subcommand)]
        subcommand: IssueSubcommand,
    },

    /// Manage templates
    Template {
        #[command(subcommand)]
        subcommand: TemplateSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Serve { port, host } => cmd::serve::run(&root, &host, port),
        Commands::Check { skip_auth } => cmd::check::run(&root, skip_auth, cli.json),
        Commands::Project { subcommand } => cmd::project::run(&root, subcommand, cli.json),
        Commands::Issue { subcommand } => cmd::issue::run(&root, subcommand, cli.json),
        Commands::Template { subcommand } => cmd::template::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        if let Some(remote_id) = e
            .downcast_ref::<GhpmError>()
            .and_then(GhpmError::orphaned_remote_id)
        {
            eprintln!("orphaned remote resource: {remote_id} (adopt or delete it manually)");
        }
        std::process::exit(1);
    }
}
