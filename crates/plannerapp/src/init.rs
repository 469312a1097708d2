//! # Context Initialization
//!
//! Builds the production wiring: configuration, session, the HTTP remote and a
//! filesystem-backed cache.
//!
//! ## Config discovery
//!
//! [`find_project_root`] walks up from the working directory looking for a
//! `.planner/` directory, stopping at `HOME` or the filesystem root. Config files are
//! then read in priority order:
//!
//! 1. `<project>/.planner/planner.toml` (or `<cwd>/.planner/planner.toml`)
//! 2. `<global config dir>/planner.toml` (via the `directories` crate)
//!
//! Environment variables override both; see [`crate::config`].
//!
//! ## Cache location
//!
//! `cache_dir` from the config (`PLANNER_CACHE_DIR`), else the OS cache directory.
//! Each signed-in user gets a subdirectory named after a UUID v5 of their id, so
//! two accounts on one machine never read each other's entries.
//!
//! ## Session
//!
//! The CLI has no sign-in flow. [`session_from_env`] reads `PLANNER_USER` and
//! `PLANNER_TOKEN`.

use directories::{BaseDirs, ProjectDirs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::fs_backend::FsBackend;
use crate::cache::LocalCache;
use crate::clock::{Clock, SystemClock};
use crate::config::{SyncConfig, CONFIG_FILE_NAME};
use crate::error::{PlannerError, Result};
use crate::model::Schema;
use crate::remote::http::HttpRemote;
use crate::session::Session;
use crate::sync::ResourceSync;

pub const PROJECT_DIR_NAME: &str = ".planner";

pub struct PlannerContext {
    pub config: SyncConfig,
    pub session: Session,
    pub remote: Arc<HttpRemote>,
    pub cache: Arc<LocalCache<FsBackend>>,
    pub clock: Arc<dyn Clock>,
    pub config_files: Vec<PathBuf>,
}

impl PlannerContext {
    /// A sync surface for one resource, sharing this context's remote and cache.
    pub fn resource<S: Schema>(&self) -> ResourceSync<S, HttpRemote, FsBackend> {
        ResourceSync::new(
            self.remote.clone(),
            self.cache.clone(),
            self.clock.clone(),
            &self.config,
        )
    }

    pub fn cache_dir(&self) -> &Path {
        self.cache.backend().root()
    }
}

/// Walk up from `cwd` to the nearest directory holding `.planner/`.
pub fn find_project_root(cwd: &Path) -> Option<PathBuf> {
    let home_dir = BaseDirs::new().map(|bd| bd.home_dir().to_path_buf());
    let mut current = cwd.to_path_buf();

    loop {
        if current.join(PROJECT_DIR_NAME).is_dir() {
            return Some(current);
        }
        if home_dir.as_ref() == Some(&current) {
            return None;
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => return None,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("edu", "planner", "planner")
}

/// Config files to read, highest priority first.
pub fn config_files(cwd: &Path) -> Vec<PathBuf> {
    let project_root = find_project_root(cwd).unwrap_or_else(|| cwd.to_path_buf());
    let mut files = vec![project_root.join(PROJECT_DIR_NAME).join(CONFIG_FILE_NAME)];
    if let Some(dirs) = project_dirs() {
        files.push(dirs.config_dir().join(CONFIG_FILE_NAME));
    }
    files
}

/// Base cache directory before the per-user subdirectory.
pub fn base_cache_dir(config: &SyncConfig) -> Result<PathBuf> {
    if let Some(dir) = &config.cache_dir {
        return Ok(dir.clone());
    }
    project_dirs()
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .ok_or_else(|| PlannerError::Config("could not determine a cache directory".into()))
}

/// Directory holding one user's cache entries.
pub fn user_cache_dir(base: &Path, session: &Session) -> PathBuf {
    match session.user_id() {
        Some(user) => {
            let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, user.as_bytes());
            base.join(format!("user-{}", id))
        }
        None => base.join("anonymous"),
    }
}

pub fn session_from_env() -> Session {
    match std::env::var("PLANNER_USER") {
        Ok(user) if !user.trim().is_empty() => {
            Session::authenticated(user, std::env::var("PLANNER_TOKEN").ok())
        }
        _ => Session::anonymous(),
    }
}

/// Build the production context for `cwd`.
pub fn initialize(cwd: &Path, session: Session) -> Result<PlannerContext> {
    let config_files = config_files(cwd);
    let paths: Vec<&Path> = config_files.iter().map(PathBuf::as_path).collect();
    let config = SyncConfig::load(&paths)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache_dir = user_cache_dir(&base_cache_dir(&config)?, &session);
    let cache = Arc::new(LocalCache::new(
        FsBackend::new(cache_dir),
        config.cache_ttl(),
        clock.clone(),
    ));
    let remote = Arc::new(HttpRemote::new(&config, session.clone())?);

    Ok(PlannerContext {
        config,
        session,
        remote,
        cache,
        clock,
        config_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_project_root_walks_up() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("school");
        let nested = root.join("essays").join("drafts");
        std::fs::create_dir_all(root.join(PROJECT_DIR_NAME)).unwrap();
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_project_root(&nested), Some(root));
    }

    #[test]
    fn test_config_files_fall_back_to_cwd() {
        let temp = TempDir::new().unwrap();
        let files = config_files(temp.path());
        assert_eq!(
            files[0],
            temp.path().join(PROJECT_DIR_NAME).join(CONFIG_FILE_NAME)
        );
    }

    #[test]
    fn test_user_cache_dirs_are_separate() {
        let base = Path::new("/tmp/planner-cache");
        let ana = user_cache_dir(base, &Session::authenticated("ana", None));
        let ben = user_cache_dir(base, &Session::authenticated("ben", None));
        assert_ne!(ana, ben);
        assert_eq!(ana, user_cache_dir(base, &Session::authenticated("ana", None)));
        assert_eq!(
            user_cache_dir(base, &Session::anonymous()),
            base.join("anonymous")
        );
    }

    #[test]
    fn test_configured_cache_dir_wins() {
        let config = SyncConfig {
            cache_dir: Some(PathBuf::from("/var/cache/planner")),
            ..Default::default()
        };
        assert_eq!(
            base_cache_dir(&config).unwrap(),
            PathBuf::from("/var/cache/planner")
        );
    }
}
