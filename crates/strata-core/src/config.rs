use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::relations::ProtocolOptions;
use crate::tree::BuildOptions;

/// Directory holding a project's database and config.
pub const STRATA_DIR: &str = ".strata";
/// Database file name inside [`STRATA_DIR`].
pub const DATABASE_FILE: &str = "strata.db";
/// Project config file name inside [`STRATA_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub tree: TreeConfig,
    #[serde(default)]
    pub relationships: RelationshipConfig,
    #[serde(default)]
    pub tenant: TenantConfig,
}

impl ProjectConfig {
    #[must_use]
    pub const fn build_options(&self) -> BuildOptions {
        BuildOptions {
            expand_roots: self.tree.expand_roots,
        }
    }

    #[must_use]
    pub const fn protocol_options(&self) -> ProtocolOptions {
        ProtocolOptions {
            auto_promote_oldest: self.relationships.auto_promote_oldest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    #[serde(default = "default_true")]
    pub expand_roots: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            expand_roots: default_true(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipConfig {
    /// Promote the oldest remaining parent when the primary one is detached.
    #[serde(default)]
    pub auto_promote_oldest: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Tenant used by `pole` commands when `--tenant` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[must_use]
pub fn strata_dir(project_root: &Path) -> PathBuf {
    project_root.join(STRATA_DIR)
}

#[must_use]
pub fn database_path(project_root: &Path) -> PathBuf {
    strata_dir(project_root).join(DATABASE_FILE)
}

#[must_use]
pub fn project_config_path(project_root: &Path) -> PathBuf {
    strata_dir(project_root).join(CONFIG_FILE)
}

/// Load `.strata/config.toml`, falling back to defaults when absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_config_path(project_root);
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write `config` to `.strata/config.toml`, creating the directory.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn save_project_config(project_root: &Path, config: &ProjectConfig) -> Result<PathBuf> {
    let path = project_config_path(project_root);
    std::fs::create_dir_all(strata_dir(project_root))
        .with_context(|| format!("Failed to create {}", strata_dir(project_root).display()))?;
    let content = toml::to_string_pretty(config).context("Failed to serialize project config")?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Load `<config_dir>/strata/config.toml`, falling back to defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("strata/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Output mode precedence: `--json` > `FORMAT` env > user config > TTY.
#[must_use]
pub fn resolve_output(
    cli_json: bool,
    user_output: Option<&str>,
    env_format: Option<&str>,
) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

const fn default_true() -> bool {
    true
}
