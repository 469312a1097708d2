use super::backend::CacheBackend;
use crate::error::{PlannerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

const FILE_PREFIX: &str = "cache-";
const FILE_EXT: &str = ".json";

/// What one cache file holds. The key is kept alongside the value because file
/// names are derived from a hash of it.
#[derive(Serialize, Deserialize)]
struct Envelope {
    key: String,
    value: String,
}

/// Cache backend persisting one file per key under a directory.
///
/// Cache files that no longer parse are deleted when keys are listed.
///
/// ```text
/// <root>/
/// └── cache-{uuid-v5(key)}.json   # {"key": "...", "value": "..."}
/// ```
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes());
        self.root.join(format!("{}{}{}", FILE_PREFIX, id, FILE_EXT))
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root).map_err(PlannerError::Io)?;
        }
        Ok(())
    }

    fn read_envelope(path: &Path) -> Result<Option<Envelope>> {
        match fs::read_to_string(path) {
            Ok(raw) => Ok(serde_json::from_str(&raw).ok()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PlannerError::Io(e)),
        }
    }
}

impl CacheBackend for FsBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key);
        match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Envelope>(&raw) {
                Ok(envelope) if envelope.key == key => Ok(Some(envelope.value)),
                Ok(_) => Ok(None),
                // Unreadable file: hand the raw text up so the cache treats it as corrupt.
                Err(_) => Ok(Some(raw)),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PlannerError::Io(e)),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_dir()?;
        let envelope = Envelope {
            key: key.to_string(),
            value: value.to_string(),
        };
        let content = serde_json::to_string(&envelope)?;

        let tmp_path = self.root.join(format!(".cache-{}.tmp", Uuid::new_v4()));
        fs::write(&tmp_path, content).map_err(PlannerError::Io)?;
        fs::rename(&tmp_path, self.entry_path(key)).map_err(PlannerError::Io)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PlannerError::Io(e)),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let entries = fs::read_dir(&self.root).map_err(PlannerError::Io)?;
        for entry in entries {
            let path = entry.map_err(PlannerError::Io)?.path();
            let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            if !(name.starts_with(FILE_PREFIX) && name.ends_with(FILE_EXT)) {
                continue;
            }
            match Self::read_envelope(&path)? {
                Some(envelope) => keys.push(envelope.key),
                // No key to address it by, so nothing could ever read or clear it.
                None => {
                    warn!(path = %path.display(), "removing unreadable cache file");
                    match fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(PlannerError::Io(e)),
                    }
                }
            }
        }
        Ok(keys)
    }
}
