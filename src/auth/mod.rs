//! auth
//!
//! Token-based credential injection for remote operations.
//!
//! # Design
//!
//! Every remote-communicating operation (clone, fetch/merge, push, and the
//! hub asset client) receives a [`CredentialProvider`]. With a token the
//! provider yields `(username = "oauth2", password = token)`; without one
//! the operation proceeds unauthenticated. The provider is pure: tokens
//! are supplied per call and never persisted here.
//!
//! # Redaction
//!
//! Tokens never appear in logs, errors, or `Debug` output.

use std::fmt;

/// Fixed username presented alongside a bearer token.
pub const OAUTH2_USERNAME: &str = "oauth2";

/// A bearer token whose `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Expose the raw token for transport-layer use.
    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

// Custom Debug to avoid exposing tokens
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Produces either anonymous access or oauth2 basic authentication.
///
/// Applied identically at clone, pull, and push call sites, and reused as
/// the bearer token for the hub asset client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialProvider {
    token: Option<Credential>,
}

impl CredentialProvider {
    /// Unauthenticated access.
    pub fn anonymous() -> Self {
        Self { token: None }
    }

    /// Token-authenticated access.
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(Credential::new(token)),
        }
    }

    /// Build a provider from an optional token.
    pub fn from_optional(token: Option<String>) -> Self {
        match token {
            Some(t) => Self::token(t),
            None => Self::anonymous(),
        }
    }

    /// Whether no token is configured.
    pub fn is_anonymous(&self) -> bool {
        self.token.is_none()
    }

    /// The `(username, password)` pair for basic authentication, if a
    /// token is configured.
    pub(crate) fn userpass(&self) -> Option<(&str, &str)> {
        self.token
            .as_ref()
            .map(|token| (OAUTH2_USERNAME, token.expose()))
    }

    /// The raw bearer token for HTTP use, if configured.
    pub(crate) fn bearer_token(&self) -> Option<&str> {
        self.token.as_ref().map(Credential::expose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_provider_has_no_userpass() {
        let provider = CredentialProvider::anonymous();
        assert!(provider.is_anonymous());
        assert!(provider.userpass().is_none());
        assert!(provider.bearer_token().is_none());
    }

    #[test]
    fn token_provider_uses_fixed_username() {
        let provider = CredentialProvider::token("tok_secret");
        assert!(!provider.is_anonymous());
        assert_eq!(provider.userpass(), Some(("oauth2", "tok_secret")));
        assert_eq!(provider.bearer_token(), Some("tok_secret"));
    }

    #[test]
    fn from_optional_maps_presence() {
        assert!(CredentialProvider::from_optional(None).is_anonymous());
        assert!(!CredentialProvider::from_optional(Some("t".into())).is_anonymous());
    }

    #[test]
    fn debug_output_does_not_expose_tokens() {
        let provider = CredentialProvider::token("tok_secret");
        let debug_output = format!("{:?}", provider);
        assert!(!debug_output.contains("tok_secret"));
        assert!(debug_output.contains("redacted"));
    }
}
