pub mod check;
pub mod issue;
pub mod project;
pub mod serve;
pub mod template;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use ghpm_core::config::Config;
use ghpm_core::{CliAdapter, SqliteStore, Synchronizer};

pub(crate) fn load_config(root: &Path) -> anyhow::Result<Config> {
    let mut config = Config::load(root).context("failed to load .ghpm/config.yaml")?;
    config.apply_env();
    Ok(config)
}

pub(crate) fn open_store(root: &Path, config: &Config) -> anyhow::Result<Arc<SqliteStore>> {
    let path = config.database_path(root);
    let store = SqliteStore::open(&path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Config plus a synchronizer over an unprobed adapter. Tool problems
/// surface on the first remote call instead of at startup.
pub(crate) struct Session {
    pub config: Config,
    pub sync: Synchronizer,
}

impl Session {
    pub fn open(root: &Path) -> anyhow::Result<Self> {
        Self::build(root, false)
    }

    /// Like [`Session::open`], but project commands get an owner: the
    /// configured one, else the account the tool is logged in as.
    pub fn open_with_owner(root: &Path) -> anyhow::Result<Self> {
        Self::build(root, true)
    }

    fn build(root: &Path, resolve_owner: bool) -> anyhow::Result<Self> {
        let config = load_config(root)?;
        let store = open_store(root, &config)?;
        let adapter = CliAdapter::new(config.adapter_config());
        let owner = match config.tool.owner.clone() {
            None if resolve_owner => Some(
                adapter
                    .resolve_owner()
                    .context("could not resolve the project owner; set tool.owner in .ghpm/config.yaml")?,
            ),
            owner => owner,
        };
        let sync = Synchronizer::new(Arc::new(adapter), store).with_owner(owner);
        Ok(Self { config, sync })
    }
}
