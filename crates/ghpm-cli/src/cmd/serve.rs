use crate::cmd::{load_config, open_store};
use anyhow::{bail, Context};
use ghpm_core::config::WarnLevel;
use ghpm_core::template_loader::reconcile_templates;
use ghpm_core::{CliAdapter, Synchronizer};
use ghpm_server::AppState;
use std::path::Path;
use std::sync::Arc;

/// Validate the tool, reconcile templates once, then serve the API.
pub fn run(root: &Path, host: &str, port: u16) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let mut fatal = Vec::new();
    for w in config.validate(root) {
        match w.level {
            WarnLevel::Error => fatal.push(w.message),
            WarnLevel::Warning => tracing::warn!("config: {}", w.message),
        }
    }
    if !fatal.is_empty() {
        bail!("invalid configuration: {}", fatal.join("; "));
    }

    let adapter = CliAdapter::connect(config.adapter_config())
        .context("external tool is not usable; run `ghpm check` for details")?;
    let owner = adapter.config().owner.clone();
    let store = open_store(root, &config)?;

    let templates = config.templates_path(root);
    let report = reconcile_templates(&*store, &templates)
        .with_context(|| format!("failed to load templates from {}", templates.display()))?;
    tracing::info!(
        inserted = report.inserted.len(),
        skipped = report.skipped.len(),
        "templates reconciled"
    );

    let sync = Synchronizer::new(Arc::new(adapter), store).with_owner(owner);
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(ghpm_server::serve(AppState::new(sync), host, port))
}
