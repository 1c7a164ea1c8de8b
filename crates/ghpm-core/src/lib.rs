pub mod cli_adapter;
pub mod config;
pub mod error;
pub mod io;
pub mod issue;
pub mod lease;
pub mod merge;
pub mod paths;
pub mod project;
pub mod remote;
pub mod store;
pub mod sync;
pub mod template;
pub mod template_loader;
pub mod types;

#[doc(hidden)]
pub mod testing;

pub use cli_adapter::{CliAdapter, RemoteTool};
pub use error::{GhpmError, Result, SyncOperation, ToolFailure};
pub use merge::MergeReport;
pub use store::{LocalStore, Page, SqliteStore};
pub use sync::Synchronizer;
