use crate::cmd::load_config;
use crate::output::print_json;
use anyhow::bail;
use ghpm_core::config::WarnLevel;
use ghpm_core::CliAdapter;
use std::path::Path;

/// Validate configuration and, unless skipped, the external tool itself.
pub fn run(root: &Path, skip_tool: bool, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let warnings = config.validate(root);
    let adapter_config = config.adapter_config();

    let mut owner = adapter_config.owner.clone();
    let tool_status = if skip_tool {
        "skipped".to_string()
    } else {
        match CliAdapter::connect(adapter_config.clone()) {
            Ok(adapter) => {
                owner = adapter.config().owner.clone();
                "ok".to_string()
            }
            Err(e) => e.to_string(),
        }
    };
    let tool_ok = skip_tool || tool_status == "ok";
    let has_errors = warnings.iter().any(|w| w.level == WarnLevel::Error);

    if json {
        print_json(&serde_json::json!({
            "root": root,
            "executable": adapter_config.executable,
            "timeout_secs": adapter_config.timeout.as_secs(),
            "owner": owner,
            "token_env": adapter_config.credential_env,
            "credential": adapter_config.credential.as_ref().map(|c| c.to_string()),
            "database": config.database_path(root),
            "templates_dir": config.templates_path(root),
            "warnings": warnings,
            "tool": tool_status,
        }))?;
    } else {
        println!("Root:       {}", root.display());
        println!("Executable: {}", adapter_config.executable.display());
        println!("Timeout:    {}s", adapter_config.timeout.as_secs());
        println!("Owner:      {}", owner.as_deref().unwrap_or("-"));
        println!(
            "Credential: {} ({})",
            adapter_config
                .credential
                .as_ref()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "not set".to_string()),
            adapter_config.credential_env
        );
        println!("Database:   {}", config.database_path(root).display());
        println!("Templates:  {}", config.templates_path(root).display());
        println!("Tool:       {tool_status}");
        for w in &warnings {
            let tag = match w.level {
                WarnLevel::Error => "error",
                WarnLevel::Warning => "warning",
            };
            println!("  {tag}: {}", w.message);
        }
    }

    if has_errors || !tool_ok {
        bail!("check failed");
    }
    Ok(())
}
