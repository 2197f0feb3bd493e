use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name looked up next to the register database.
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterConfig {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Longest parent chain followed before graph assembly gives up.
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Attempts per mutation when a concurrent writer wins the race.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default = "default_true")]
    pub cache: bool,
    /// Ancestor level shown next to a unit's direct classification codes.
    #[serde(default)]
    pub display_level: usize,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            cache: default_true(),
            display_level: 0,
        }
    }
}

/// Load `config.toml` from `dir`, falling back to defaults when absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(dir: &Path) -> Result<RegisterConfig> {
    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(RegisterConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<RegisterConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    tracing::debug!(path = %path.display(), ?config, "loaded register config");
    Ok(config)
}

const fn default_true() -> bool {
    true
}

const fn default_max_hops() -> usize {
    16
}

const fn default_max_retries() -> u32 {
    3
}
