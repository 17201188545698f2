use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::data_dir;

/// Session cookies kept between command invocations. Job records are never
/// written here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSession {
    pub backend_url: String,
    pub cookies: Option<String>,
    pub user_email: Option<String>,
}

impl SavedSession {
    pub fn default_path() -> PathBuf {
        data_dir().join("session.json")
    }

    /// Returns `None` when there is no saved session for `backend_url`.
    pub fn load(path: &Path, backend_url: &str) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        let saved: SavedSession = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt session file: {}", path.display()))?;

        if saved.backend_url != backend_url {
            debug!(saved = %saved.backend_url, current = backend_url, "ignoring session for another backend");
            return Ok(None);
        }
        Ok(Some(saved))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        // cookies are credentials: owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(path)
            .with_context(|| format!("Failed to write session file: {}", path.display()))?;
        // mode() only applies on creation; tighten a file left by an older run
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write session file: {}", path.display()))
    }

    pub fn remove(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove session file: {}", path.display())),
        }
    }
}
