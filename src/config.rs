use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DB_ENV: &str = "SCULPT_DB";
pub const DEFAULT_USER: &str = "local";

/// Flat key/value settings stored as TOML.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub map: BTreeMap<String, String>,
}

pub fn config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("sculpt").join("config.toml"))
        .context("Could not determine config directory")
}

impl Config {
    /// A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).with_context(|| format!("reading `{}`", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing `{}`", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating `{}`", dir.display()))?;
        }
        let raw = toml::to_string(self)?;
        fs::write(path, raw).with_context(|| format!("writing `{}`", path.display()))
    }

    /// Identity that owns every row this process reads or writes.
    pub fn user(&self) -> String {
        self.map
            .get("user")
            .filter(|u| !u.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_USER.to_string())
    }

    /// `SCULPT_DB`, then the `db` key, then the platform data directory.
    pub fn db_path(&self) -> Result<String> {
        if let Ok(p) = std::env::var(DB_ENV) {
            if !p.is_empty() {
                return Ok(p);
            }
        }
        if let Some(p) = self.map.get("db") {
            return Ok(p.clone());
        }
        let dir = dirs::data_dir()
            .map(|d| d.join("sculpt"))
            .context("Could not determine data directory")?;
        fs::create_dir_all(&dir).with_context(|| format!("creating `{}`", dir.display()))?;
        Ok(dir.join("sculpt.db").display().to_string())
    }

    pub fn log_level(&self) -> Option<&str> {
        self.map.get("log").map(String::as_str)
    }
}
