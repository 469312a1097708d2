//! # Configuration
//!
//! Sync settings are managed by [`confique`], which layers environment variables over
//! TOML files over compiled defaults.
//!
//! ## Storage Hierarchy
//!
//! Configuration is resolved in priority order:
//! 1. **Environment variables**: `PLANNER_BASE_URL`, `PLANNER_CACHE_TTL_SECS`, etc.
//! 2. **Project Config**: `.planner/planner.toml` in the working directory.
//! 3. **Global Config**: OS-appropriate config directory (via `directories` crate).
//! 4. **Compiled Defaults**: Built-in fallbacks via `#[config(default = ...)]`.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `base_url` | `http://localhost:3000` | Data Store origin |
//! | `cache_ttl_secs` | `300` | Age after which a cached page is stale |
//! | `inline_debounce_ms` | `2000` | Save delay for inline field edits |
//! | `autosave_debounce_ms` | `5000` | Save delay for the profile wizard |
//! | `retry_backoff_secs` | `5` | Wait before retrying an unavailable server |
//! | `max_retries` | `1` | Retries per dispatched save |
//! | `page_size` | `20` | Records requested per page |
//! | `request_timeout_secs` | `30` | Deadline for one HTTP request |
//! | `cache_dir` | OS cache dir | Where cached pages are persisted |

use confique::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PlannerError, Result};
use crate::model::SaveMode;

pub const CONFIG_FILE_NAME: &str = "planner.toml";

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Origin of the Data Store, e.g. "https://planner.example.edu".
    #[config(env = "PLANNER_BASE_URL", default = "http://localhost:3000")]
    pub base_url: String,

    /// Seconds a cached page may be served before it must be refetched.
    #[config(env = "PLANNER_CACHE_TTL_SECS", default = 300)]
    pub cache_ttl_secs: u64,

    #[config(env = "PLANNER_INLINE_DEBOUNCE_MS", default = 2000)]
    pub inline_debounce_ms: u64,

    #[config(env = "PLANNER_AUTOSAVE_DEBOUNCE_MS", default = 5000)]
    pub autosave_debounce_ms: u64,

    #[config(env = "PLANNER_RETRY_BACKOFF_SECS", default = 5)]
    pub retry_backoff_secs: u64,

    #[config(env = "PLANNER_MAX_RETRIES", default = 1)]
    pub max_retries: u32,

    #[config(env = "PLANNER_PAGE_SIZE", default = 20)]
    pub page_size: u32,

    #[config(env = "PLANNER_REQUEST_TIMEOUT_SECS", default = 30)]
    pub request_timeout_secs: u64,

    /// Directory for persisted cache entries. Defaults to the OS cache dir.
    #[config(env = "PLANNER_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            cache_ttl_secs: 300,
            inline_debounce_ms: 2000,
            autosave_debounce_ms: 5000,
            retry_backoff_secs: 5,
            max_retries: 1,
            page_size: 20,
            request_timeout_secs: 30,
            cache_dir: None,
        }
    }
}

impl SyncConfig {
    /// Load from the environment and the given files, highest priority first.
    /// Missing files are skipped.
    pub fn load(files: &[&Path]) -> Result<Self> {
        let mut builder = SyncConfig::builder().env();
        for file in files {
            builder = builder.file(*file);
        }
        let config = builder
            .load()
            .map_err(|e| PlannerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(PlannerError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.page_size == 0 {
            return Err(PlannerError::Config("page_size must be positive".into()));
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn debounce_for(&self, mode: SaveMode) -> Duration {
        match mode {
            SaveMode::Inline => Duration::from_millis(self.inline_debounce_ms),
            SaveMode::Autosave => Duration::from_millis(self.autosave_debounce_ms),
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
