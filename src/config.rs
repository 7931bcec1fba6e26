//! config
//!
//! Configuration file loading.
//!
//! # Storage
//!
//! - `<config-dir>/stagesync/config.toml` - TOML configuration
//! - `STAGESYNC_TOKEN` - environment override for the hub token
//!
//! # Example
//!
//! ```toml
//! hub_url = "https://hub.example.edu"
//! remote_url = "https://git.example.edu/cs101/student.git"
//! branch = "main"
//! token = "tok_..."
//!
//! [author]
//! name = "Ada Lovelace"
//! email = "ada@example.edu"
//! ```
//!
//! The token is the only secret; it is redacted from `Debug` output and
//! never written back.

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::auth::CredentialProvider;
use crate::git::Author;

/// Environment variable overriding the configured token.
pub const TOKEN_ENV: &str = "STAGESYNC_TOKEN";

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but cannot be read.
    #[error("cannot read {path}: {message}")]
    Read {
        /// Path to the config file
        path: PathBuf,
        /// Description of the failure
        message: String,
    },

    /// The config file is not valid TOML.
    #[error("cannot parse {path}: {message}")]
    Parse {
        /// Path to the config file
        path: PathBuf,
        /// Description of the failure
        message: String,
    },
}

/// Author identity as configured.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AuthorConfig {
    /// Author name
    pub name: String,
    /// Author email
    pub email: String,
}

impl Default for AuthorConfig {
    fn default() -> Self {
        Self {
            name: "stagesync".to_string(),
            email: "stagesync@localhost".to_string(),
        }
    }
}

impl From<&AuthorConfig> for Author {
    fn from(config: &AuthorConfig) -> Self {
        Author::new(&config.name, &config.email)
    }
}

/// The stagesync configuration.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Base URL of the course hub.
    pub hub_url: Option<String>,
    /// URL of the repository remote (used by `clone`).
    pub remote_url: Option<String>,
    /// Branch the single-branch workflow targets.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Commit author identity.
    #[serde(default)]
    pub author: AuthorConfig,
    /// Hub/remote token. Overridden by [`TOKEN_ENV`].
    token: Option<String>,
}

fn default_branch() -> String {
    crate::sync::DEFAULT_BRANCH.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hub_url: None,
            remote_url: None,
            branch: default_branch(),
            author: AuthorConfig::default(),
            token: None,
        }
    }
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("hub_url", &self.hub_url)
            .field("remote_url", &self.remote_url)
            .field("branch", &self.branch)
            .field("author", &self.author)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl Config {
    /// The config file path.
    pub fn path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("stagesync").join("config.toml")
    }

    /// Load the configuration, falling back to defaults when no file
    /// exists.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path())
    }

    /// Load the configuration from an explicit path.
    pub fn load_from(path: &PathBuf) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    message: e.to_string(),
                })
            }
        };

        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })
    }

    /// The commit author identity.
    pub fn author(&self) -> Author {
        Author::from(&self.author)
    }

    /// Build the credential provider: environment token first, then the
    /// configured one.
    pub fn credentials(&self) -> CredentialProvider {
        let token = std::env::var(TOKEN_ENV).ok().or_else(|| self.token.clone());
        CredentialProvider::from_optional(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).expect("load");
        assert_eq!(config.branch, "main");
        assert!(config.hub_url.is_none());
        assert_eq!(config.author.name, "stagesync");
    }

    #[test]
    fn parses_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
hub_url = "https://hub.example.edu"
remote_url = "https://git.example.edu/cs101/student.git"
branch = "term-2026"
token = "tok_secret"

[author]
name = "Ada Lovelace"
email = "ada@example.edu"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).expect("load");
        assert_eq!(config.hub_url.as_deref(), Some("https://hub.example.edu"));
        assert_eq!(config.branch, "term-2026");
        assert_eq!(config.author().name, "Ada Lovelace");
        assert!(!config.credentials().is_anonymous());
    }

    #[test]
    fn rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "surprise = true\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn debug_output_does_not_expose_token() {
        let config = Config {
            token: Some("tok_secret".to_string()),
            ..Config::default()
        };
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("tok_secret"));
        assert!(debug_output.contains("has_token: true"));
    }
}
