//! assets
//!
//! HTTP client for the course hub (assignment downloads and token
//! validation).
//!
//! # Design
//!
//! Simple request/response only - no state machine lives here. The client
//! validates the configured token, lists the files of an assignment, and
//! deposits them into the working tree. It never overwrites a file that is
//! already on disk: deciding what wins between local and incoming content
//! is the reconciliation engine's job, not the downloader's.
//!
//! # Example
//!
//! ```ignore
//! use stagesync::assets::HubClient;
//! use stagesync::auth::CredentialProvider;
//!
//! let client = HubClient::new("https://hub.example.edu", CredentialProvider::token(token))?;
//! if client.validate_token().await? {
//!     let files = client.assignment_files("cs101", "hw3").await?;
//!     client.download_into(&files, repo_root).await?;
//! }
//! ```

use std::path::{Component, Path, PathBuf};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::auth::CredentialProvider;

/// User-Agent header value for hub requests.
const USER_AGENT_VALUE: &str = "stagesync";

/// Errors from the hub client.
#[derive(Debug, Error)]
pub enum AssetError {
    /// The hub rejected the token.
    #[error("hub rejected the token")]
    Unauthorized,

    /// The hub answered with a status the client does not handle.
    #[error("unexpected hub response: {status}")]
    UnexpectedStatus {
        /// The HTTP status code
        status: u16,
    },

    /// An asset path escapes the working tree.
    #[error("asset path escapes the working tree: {path}")]
    InvalidPath {
        /// The offending path
        path: String,
    },

    /// Transport or decoding failure.
    #[error("hub request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A file could not be written.
    #[error("cannot write {path}: {message}")]
    Io {
        /// The destination path
        path: PathBuf,
        /// Description of the failure
        message: String,
    },
}

/// One downloadable file of an assignment.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RemoteAsset {
    /// Repository-relative destination path.
    pub path: String,
    /// Absolute download URL.
    pub url: String,
}

/// The course hub client.
pub struct HubClient {
    base_url: String,
    http: Client,
    credentials: CredentialProvider,
}

impl std::fmt::Debug for HubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HubClient {
    /// Create a hub client.
    pub fn new(
        base_url: impl Into<String>,
        credentials: CredentialProvider,
    ) -> Result<Self, AssetError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            credentials,
        })
    }

    /// Attach the bearer token, when one is configured.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.credentials.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Check the configured token against the hub.
    ///
    /// `Ok(true)` for an accepted token, `Ok(false)` for a rejected one;
    /// anything else is an error.
    pub async fn validate_token(&self) -> Result<bool, AssetError> {
        let url = format!("{}/api/v1/user", self.base_url);
        let response = self.authorize(self.http.get(&url)).send().await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            status => Err(AssetError::UnexpectedStatus {
                status: status.as_u16(),
            }),
        }
    }

    /// List the files of one assignment.
    pub async fn assignment_files(
        &self,
        course: &str,
        assignment: &str,
    ) -> Result<Vec<RemoteAsset>, AssetError> {
        let url = format!(
            "{}/api/v1/courses/{course}/assignments/{assignment}/files",
            self.base_url
        );
        let response = self.authorize(self.http.get(&url)).send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AssetError::Unauthorized),
            status => Err(AssetError::UnexpectedStatus {
                status: status.as_u16(),
            }),
        }
    }

    /// Download assets into the working tree, skipping any file already on
    /// disk. Returns the paths actually written.
    pub async fn download_into(
        &self,
        assets: &[RemoteAsset],
        dest_root: &Path,
    ) -> Result<Vec<PathBuf>, AssetError> {
        let mut written = Vec::new();
        for asset in assets {
            let rel = safe_relative_path(&asset.path)?;
            let dest = dest_root.join(&rel);
            if dest.exists() {
                debug!(path = %asset.path, "skipping existing file");
                continue;
            }

            let response = self.authorize(self.http.get(&asset.url)).send().await?;
            match response.status() {
                StatusCode::OK => {}
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    return Err(AssetError::Unauthorized)
                }
                status => {
                    return Err(AssetError::UnexpectedStatus {
                        status: status.as_u16(),
                    })
                }
            }
            let body = response.bytes().await?;

            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| AssetError::Io {
                    path: parent.to_path_buf(),
                    message: e.to_string(),
                })?;
            }
            std::fs::write(&dest, &body).map_err(|e| AssetError::Io {
                path: dest.clone(),
                message: e.to_string(),
            })?;
            written.push(rel);
        }
        Ok(written)
    }
}

/// Validate an asset path as strictly relative (no traversal, no absolute
/// components).
fn safe_relative_path(path: &str) -> Result<PathBuf, AssetError> {
    let candidate = Path::new(path);
    let mut out = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => {
                return Err(AssetError::InvalidPath {
                    path: path.to_string(),
                })
            }
        }
    }
    if out.as_os_str().is_empty() {
        return Err(AssetError::InvalidPath {
            path: path.to_string(),
        });
    }
    Ok(out)
}
