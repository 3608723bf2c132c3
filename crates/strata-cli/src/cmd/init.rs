use crate::output::{OutputMode, render};
use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;
use strata_core::config::{self, ProjectConfig};
use strata_core::store::SqliteStore;
use tracing::info;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Re-initialize even if `.strata/` already exists. Existing data is kept.
    #[arg(long)]
    pub force: bool,
}

const GITIGNORE: &str = "strata.db\nstrata.db-wal\nstrata.db-shm\n";

#[derive(Debug, Serialize)]
struct InitReport {
    ok: bool,
    strata_dir: String,
    database: String,
    config: String,
}

/// Execute `strata init`. Creates the project skeleton:
///
/// ```text
/// .strata/
///   strata.db     (migrated SQLite database)
///   config.toml   (default project config, written once)
///   .gitignore    (database files)
/// ```
///
/// # Errors
///
/// Returns an error if `.strata/` already exists and `--force` is not set,
/// or if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let strata_dir = config::strata_dir(project_root);

    if strata_dir.exists() && !args.force {
        anyhow::bail!(".strata/ already exists. Use `strata init --force` to reinitialize.");
    }

    std::fs::create_dir_all(&strata_dir)
        .with_context(|| format!("Failed to create {}", strata_dir.display()))?;

    let config_path = config::project_config_path(project_root);
    if !config_path.exists() {
        config::save_project_config(project_root, &ProjectConfig::default())?;
    }

    let gitignore_path = strata_dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write {}", gitignore_path.display()))?;

    let db_path = config::database_path(project_root);
    SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to initialize {}", db_path.display()))?;

    info!(path = %strata_dir.display(), "project initialized");

    let report = InitReport {
        ok: true,
        strata_dir: strata_dir.display().to_string(),
        database: db_path.display().to_string(),
        config: config_path.display().to_string(),
    };
    render(output, &report, |r, w| {
        writeln!(w, "Initialized strata project in {}", r.strata_dir)
    })
}
