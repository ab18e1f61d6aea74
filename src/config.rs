//! Paths, persisted bin settings and the document/proxy policy.
//!
//! Directory priority:
//! 1. CLI `--config-dir`
//! 2. `MEDIABIN_CONFIG_DIR` environment variable
//! 3. Current folder IF it already holds `mediabin.json` or `mediabin.log`
//! 4. Platform dirs from dirs-next (`~/.config/mediabin`, `~/.cache/mediabin`, ...)

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::thumbs::DEFAULT_THUMB_ENTRIES;
use crate::core::workers::default_thread_count;
use crate::entities::clip_type::ClipType;

pub const APP_NAME: &str = "mediabin";
pub const SETTINGS_FILE: &str = "mediabin.json";
pub const LOG_FILE: &str = "mediabin.log";
pub const CONFIG_DIR_ENV: &str = "MEDIABIN_CONFIG_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read settings {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("invalid settings {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Overrides for default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// CLI argument first, then environment variable.
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }

    pub fn config_dir(&self) -> PathBuf {
        self.resolve(dirs_next::config_dir)
    }

    /// Root of generated caches (proxies, audio thumbnails)
    pub fn cache_dir(&self) -> PathBuf {
        self.resolve(dirs_next::cache_dir)
    }

    pub fn config_file(&self, name: &str) -> PathBuf {
        self.config_dir().join(name)
    }

    /// Create config and cache directories if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.config_dir(), self.cache_dir()] {
            if !dir.exists() {
                fs::create_dir_all(&dir).with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }
        }
        Ok(())
    }

    fn resolve(&self, platform: fn() -> Option<PathBuf>) -> PathBuf {
        if let Some(dir) = &self.config_dir {
            return dir.clone();
        }
        if let Ok(cwd) = std::env::current_dir()
            && has_local_files(&cwd)
        {
            return cwd;
        }
        platform()
            .map(|d| d.join(APP_NAME))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn has_local_files(dir: &Path) -> bool {
    [SETTINGS_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

/// Persisted bin settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinSettings {
    /// Proxy clips are allowed in this document
    pub enable_proxy: bool,
    /// Generate proxies for large videos on load
    pub generate_proxy: bool,
    /// Generate proxies for large images on load
    pub generate_image_proxy: bool,
    /// Minimum video width (px) for automatic proxies
    pub proxy_min_size: u32,
    /// Minimum image width (px) for automatic proxies
    pub proxy_image_min_size: u32,
    /// Background worker threads
    pub workers: usize,
    /// Thumbnails kept in memory
    pub thumb_cache_entries: usize,
}

impl Default for BinSettings {
    fn default() -> Self {
        Self {
            enable_proxy: true,
            generate_proxy: false,
            generate_image_proxy: false,
            proxy_min_size: 1000,
            proxy_image_min_size: 2000,
            workers: default_thread_count(),
            thumb_cache_entries: DEFAULT_THUMB_ENTRIES,
        }
    }
}

impl BinSettings {
    /// Load from JSON; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        info!("Settings loaded from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                key: "workers",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Kind of generated cache folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Proxy,
    Audio,
    Thumbs,
}

impl CacheKind {
    fn folder(self) -> &'static str {
        match self {
            CacheKind::Proxy => "proxy",
            CacheKind::Audio => "audio",
            CacheKind::Thumbs => "thumbs",
        }
    }
}

/// Document/proxy policy collaborator.
pub trait ProxyPolicy: Send + Sync {
    /// Proxies may be used at all
    fn proxy_enabled(&self) -> bool;
    /// A proxy should be generated for a freshly loaded asset of this width.
    fn auto_generate_proxy(&self, clip_type: ClipType, width: u32) -> bool;
    fn cache_dir(&self, kind: CacheKind) -> PathBuf;
}

/// Policy backed by [`BinSettings`] and a cache root.
#[derive(Debug, Clone)]
pub struct DocumentPolicy {
    settings: BinSettings,
    cache_root: PathBuf,
}

impl DocumentPolicy {
    pub fn new(settings: BinSettings, cache_root: PathBuf) -> Self {
        Self { settings, cache_root }
    }

    pub fn settings(&self) -> &BinSettings {
        &self.settings
    }
}

impl ProxyPolicy for DocumentPolicy {
    fn proxy_enabled(&self) -> bool {
        self.settings.enable_proxy
    }

    fn auto_generate_proxy(&self, clip_type: ClipType, width: u32) -> bool {
        if !self.settings.enable_proxy || !clip_type.supports_proxy() {
            return false;
        }
        match clip_type {
            ClipType::Image => self.settings.generate_image_proxy && width > self.settings.proxy_image_min_size,
            _ => self.settings.generate_proxy && width > self.settings.proxy_min_size,
        }
    }

    fn cache_dir(&self, kind: CacheKind) -> PathBuf {
        self.cache_root.join(kind.folder())
    }
}
