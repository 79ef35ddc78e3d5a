use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::{Error, Result};

/// Connection and naming settings for one store.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StoreConfig {
    pub host: Option<String>,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub protocol: Option<String>,
    pub table_prefix: Option<String>,
    pub store_name: Option<String>,
    #[serde(default)]
    pub cache_enabled: bool,
}

impl StoreConfig {
    /// Config for a SQLite database file
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            protocol: Some("sqlite".to_string()),
            name: Some(path.into()),
            ..Self::default()
        }
    }

    /// Config for a private in-memory SQLite database
    pub fn sqlite_in_memory() -> Self {
        Self::sqlite(":memory:")
    }

    pub fn store_name(&self) -> &str {
        match self.store_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => "arc",
        }
    }

    /// `{table_prefix}_{store_name}_`, or `{store_name}_` without a prefix
    pub fn table_prefix(&self) -> String {
        let mut prefix = String::new();
        if let Some(p) = self.table_prefix.as_deref().filter(|p| !p.is_empty()) {
            prefix.push_str(p);
            prefix.push('_');
        }
        prefix.push_str(self.store_name());
        prefix.push('_');
        prefix
    }
}

impl StoreConfig {
    /// Check that the config names a supported backend it can reach
    pub fn validate(&self) -> Result<()> {
        let protocol = self
            .protocol
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::Configuration("`protocol` is required (e.g. \"sqlite\")".to_string()))?;

        match protocol.to_lowercase().as_str() {
            "sqlite" => {
                let has_path = [&self.name, &self.host]
                    .into_iter()
                    .any(|v| v.as_deref().is_some_and(|v| !v.is_empty()));
                if !has_path {
                    return Err(Error::Configuration("sqlite needs a database path in `name`".to_string()));
                }
            }
            other => return Err(Error::Configuration(format!("unsupported protocol: {}", other))),
        }

        if self.store_name.as_deref().is_some_and(|n| !is_identifier(n))
            || self.table_prefix.as_deref().is_some_and(|p| !p.is_empty() && !is_identifier(p))
        {
            return Err(Error::Configuration(
                "`store_name` and `table_prefix` may only contain letters, digits and `_`".to_string(),
            ));
        }
        Ok(())
    }
}

/// Names end up inside table names, unquoted
fn is_identifier(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("tristore.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<StoreConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config: StoreConfig =
        toml::from_str(&contents).with_context(|| format!("invalid store config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid store config {}", path.display()))?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &StoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    config.validate()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}
