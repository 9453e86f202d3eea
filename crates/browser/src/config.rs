//! `pageplus.{toml,json}` loading.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::{intercept::InterceptOptions, types::LaunchOptions};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["pageplus.toml", "pageplus.json"];

/// Root of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PagePlusConfig {
    pub launch: LaunchOptions,
    pub intercept: InterceptSettings,
}

/// Serialisable part of [`InterceptOptions`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptSettings {
    pub max_refresh: u32,
    pub timeout_ms: u64,
    pub goto_timeout_ms: u64,
    pub refresh_timeout_ms: u64,
    pub poll_floor_ms: u64,
    pub wait_seconds: u32,
    pub expect_more: u32,
}

impl Default for InterceptSettings {
    fn default() -> Self {
        Self {
            max_refresh: 1,
            timeout_ms: 4000,
            goto_timeout_ms: 30000,
            refresh_timeout_ms: 3000,
            poll_floor_ms: 500,
            wait_seconds: 4,
            expect_more: 0,
        }
    }
}

impl From<&InterceptSettings> for InterceptOptions {
    fn from(settings: &InterceptSettings) -> Self {
        Self {
            max_refresh: settings.max_refresh,
            timeout: Duration::from_millis(settings.timeout_ms),
            goto_timeout: Duration::from_millis(settings.goto_timeout_ms),
            refresh_timeout: Duration::from_millis(settings.refresh_timeout_ms),
            poll_floor: Duration::from_millis(settings.poll_floor_ms),
            wait_seconds: settings.wait_seconds,
            expect_more: settings.expect_more,
            ..Self::default()
        }
    }
}

/// Load config from the given path (`.toml` or `.json`).
pub fn load_config(path: &Path) -> anyhow::Result<PagePlusConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./pageplus.{toml,json}`
/// 2. the user config directory, e.g. `~/.config/pageplus/`
///
/// Returns the defaults if no file is found or it fails to parse.
pub fn discover_and_load() -> PagePlusConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    PagePlusConfig::default()
}

/// Returns the user config directory.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "pageplus").map(|d| d.config_dir().to_path_buf())
}

fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<PagePlusConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
