//! Configuration
//!
//! Loaded from a TOML file; every field has a default so a file only needs
//! to name what differs. Command-line flags are applied on top.

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::error::DepositError;

/// How the remap phase writes a changed graph back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchMode {
    /// `PATCH` with a SPARQL Update of the minimal diff
    #[default]
    SparqlUpdate,
    /// `PUT` of the whole updated graph
    Replace,
}

/// Repository connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// REST endpoint of the repository, e.g. "http://localhost:8080/rest"
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Wrap each deposit in a server-side transaction
    #[serde(default = "default_true")]
    pub use_transactions: bool,

    #[serde(default)]
    pub patch_mode: PatchMode,

    /// Per-request timeout; none means the client default
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            username: None,
            password: None,
            use_transactions: default_true(),
            patch_mode: PatchMode::default(),
            timeout_secs: None,
        }
    }
}

/// Where packages go
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositSection {
    /// Container receiving the package roots; defaults to the repository base
    #[serde(default)]
    pub target_container: Option<String>,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive: trace, debug, info, warn, error, off, or a full
    /// `EnvFilter` expression
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Complete configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositConfig {
    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub deposit: DepositSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_base_url() -> String {
    "http://localhost:8080/rest".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl DepositConfig {
    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self, DepositError> {
        if !path.is_file() {
            return Err(DepositError::InvalidPath(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, DepositError> {
        toml::from_str(content).map_err(|e| DepositError::Config(e.to_string()))
    }

    /// Container receiving the package
    pub fn target_container(&self) -> &str {
        self.deposit
            .target_container
            .as_deref()
            .unwrap_or(&self.repository.base_url)
    }

    /// Check that the URLs are absolute http(s) URLs
    pub fn validate(&self) -> Result<(), DepositError> {
        validate_http_url(&self.repository.base_url)?;
        if let Some(target) = &self.deposit.target_container {
            validate_http_url(target)?;
        }
        if self.repository.password.is_some() && self.repository.username.is_none() {
            return Err(DepositError::Config(
                "repository.password is set without repository.username".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_http_url(value: &str) -> Result<(), DepositError> {
    let url = Url::parse(value).map_err(|_| DepositError::InvalidUri(value.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(DepositError::Config(format!(
            "unsupported URL scheme '{}' in {}",
            other, value
        ))),
    }
}
