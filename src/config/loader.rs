//! Configuration loader with tier-based merging.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::merge::deep_merge_all;
use super::types::AppConfig;

const CONFIG_FILE: &str = "config.yaml";

/// Configuration tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    /// `$CWD/entity-sync/config.yaml`
    Project = 1,
    /// `~/.entity-sync/config.yaml`
    User = 2,
    /// `ENTITY_SYNC_CONFIG_PATH` or `--config`
    Explicit = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Explicit => write!(f, "explicit"),
        }
    }
}

/// Directories and files consulted while loading.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
    pub explicit_file: Option<PathBuf>,
}

impl ConfigPaths {
    /// Discover configuration paths from environment and defaults.
    pub fn discover() -> Self {
        let project_dir = std::env::var("ENTITY_SYNC_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("entity-sync")));

        let user_dir = std::env::var("ENTITY_SYNC_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".entity-sync")));

        let explicit_file = std::env::var("ENTITY_SYNC_CONFIG_PATH")
            .ok()
            .map(PathBuf::from);

        Self {
            project_dir,
            user_dir,
            explicit_file,
        }
    }

    fn tier_files(&self) -> Vec<(ConfigTier, PathBuf)> {
        let mut files = Vec::new();
        if let Some(dir) = &self.project_dir {
            files.push((ConfigTier::Project, dir.join(CONFIG_FILE)));
        }
        if let Some(dir) = &self.user_dir {
            files.push((ConfigTier::User, dir.join(CONFIG_FILE)));
        }
        if let Some(file) = &self.explicit_file {
            files.push((ConfigTier::Explicit, file.clone()));
        }
        files
    }
}

/// Loads and merges every configuration tier.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: AppConfig,
    /// Files that contributed, lowest tier first.
    sources: Vec<(ConfigTier, PathBuf)>,
}

impl ConfigLoader {
    /// Load configuration from all tiers with environment overrides.
    /// `explicit` (from `--config`) takes the place of `ENTITY_SYNC_CONFIG_PATH`.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self> {
        let mut paths = ConfigPaths::discover();
        if explicit.is_some() {
            paths.explicit_file = explicit;
        }
        let mut loader = Self::load_with_paths(paths)?;
        apply_env_overrides(&mut loader.config, |key| std::env::var(key).ok());
        Ok(loader)
    }

    /// Load configuration files only (no environment overrides).
    ///
    /// Missing project/user files are skipped; a missing or malformed explicit
    /// file is an error.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        let mut tiers: Vec<Value> = vec![serde_json::to_value(AppConfig::default())?];
        let mut sources = Vec::new();

        for (tier, file) in paths.tier_files() {
            if tier != ConfigTier::Explicit && !file.exists() {
                continue;
            }
            match read_yaml(&file) {
                Ok(value) => {
                    debug!(tier = %tier, path = %file.display(), "loaded config tier");
                    tiers.push(value);
                    sources.push((tier, file));
                }
                Err(e) if tier == ConfigTier::Explicit => return Err(e),
                Err(e) => warn!(tier = %tier, "ignoring unreadable config: {:#}", e),
            }
        }

        let config: AppConfig = serde_json::from_value(deep_merge_all(tiers))
            .context("merged configuration is invalid")?;

        Ok(Self {
            paths,
            config,
            sources,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// Highest-priority file that contributed, if any.
    pub fn config_path(&self) -> Option<&Path> {
        self.sources.last().map(|(_, p)| p.as_path())
    }

    pub fn sources(&self) -> &[(ConfigTier, PathBuf)] {
        &self.sources
    }
}

fn read_yaml(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(value)
}

/// Apply `ENTITY_SYNC_*` overrides. `lookup` abstracts the environment.
pub fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("ENTITY_SYNC_BASE_URL") {
        config.remote.base_url = url;
    }

    if let Some(user) = lookup("ENTITY_SYNC_USER_ID") {
        config.remote.user_id = user;
    }

    if let Some(timeout) = lookup("ENTITY_SYNC_TIMEOUT_SECS") {
        match timeout.parse() {
            Ok(secs) => config.remote.timeout_secs = secs,
            Err(_) => warn!(value = %timeout, "ignoring invalid ENTITY_SYNC_TIMEOUT_SECS"),
        }
    }
}
