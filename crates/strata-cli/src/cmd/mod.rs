pub mod category;
pub mod completions;
pub mod init;
pub mod pole;
mod tree_view;

use std::path::Path;

use strata_core::StrataError;
use strata_core::config::{self, ProjectConfig};
use strata_core::store::{SqliteStore, StoreError};
use tracing::{debug, warn};

use crate::output::{CliError, OutputMode, render_error};

/// An error that has already been rendered to stderr.
///
/// `main` exits non-zero on it without printing anything else.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct Reported {
    pub code: String,
    pub message: String,
}

/// Render a domain error and turn it into a [`Reported`] failure.
pub fn fail(output: OutputMode, err: impl Into<StrataError>) -> anyhow::Error {
    let err = err.into();
    report(output, CliError::from(&err))
}

/// Render `error` to stderr and turn it into a [`Reported`] failure.
pub fn report(output: OutputMode, error: CliError) -> anyhow::Error {
    if let Err(render_err) = render_error(output, &error) {
        warn!(error = %render_err, "failed to render error");
    }
    anyhow::Error::new(Reported {
        code: error.error_code.unwrap_or_default(),
        message: error.message,
    })
}

/// Open the project database, refusing to create one implicitly.
pub fn open_store(project_root: &Path) -> Result<SqliteStore, StrataError> {
    let path = config::database_path(project_root);
    if !path.exists() {
        return Err(StrataError::NotInitialized { path });
    }
    debug!(path = %path.display(), "opening project database");
    SqliteStore::open(&path).map_err(|e| StrataError::Store(StoreError::Backend(e)))
}

pub fn load_config(project_root: &Path) -> Result<ProjectConfig, StrataError> {
    config::load_project_config(project_root).map_err(StrataError::Config)
}
