use anyhow::{Context, Result, anyhow};
use reqwest::Url;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";
pub const BACKEND_URL_ENV: &str = "JOBTRACK_BACKEND_URL";
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend_url: String,
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// File config, then environment, then the command-line flag.
    pub fn load(cli_backend_url: Option<&str>) -> Result<Self> {
        let config = match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        let env_backend_url = std::env::var(BACKEND_URL_ENV).ok();
        config.with_overrides(env_backend_url.as_deref(), cli_backend_url)
    }

    /// Applies the environment and command-line backend URLs, in that order,
    /// then validates. A blank environment value is ignored.
    pub fn with_overrides(
        mut self,
        env_backend_url: Option<&str>,
        cli_backend_url: Option<&str>,
    ) -> Result<Self> {
        if let Some(url) = env_backend_url.filter(|url| !url.trim().is_empty()) {
            self.backend_url = url.to_string();
        }
        if let Some(url) = cli_backend_url {
            self.backend_url = url.to_string();
        }
        self.validate()?;
        Ok(self)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.backend_url)
            .with_context(|| format!("Invalid backend URL: {}", self.backend_url))?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(anyhow!(
                "Backend URL must use http or https, got '{}': {}",
                other,
                self.backend_url
            )),
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "jobtrack")
}

pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Where session cookies and the log file live. Falls back to the current
/// directory when the platform has no data directory.
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}
