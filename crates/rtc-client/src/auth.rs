//! Credentials and the token refresh collaborator
//!
//! Token issuance happens elsewhere; this crate only presents an access token
//! to the relay and, when the relay rejects it, asks an [`AuthRefresher`] for a
//! new one.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Credential presented to the relay when opening the signaling link
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Bearer token sent on connect
    pub access_token: String,

    /// Token handed to the refresher when the access token is rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Credentials {
    /// Create credentials with an access token only
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
        }
    }

    /// Attach a refresh token
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }
}

// Tokens never end up in logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Result of a successful token refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshedToken {
    /// New access token
    pub access_token: String,

    /// Rotated refresh token, if the issuer rotates them
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// External token refresh collaborator
#[async_trait]
pub trait AuthRefresher: Send + Sync {
    /// Exchange a refresh token for a new access token
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken>;
}

/// Refresher for deployments without refresh tokens; always fails
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRefresh;

#[async_trait]
impl AuthRefresher for NoRefresh {
    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshedToken> {
        Err(crate::error::ConnectionError::Auth("token refresh not supported".to_string()).into())
    }
}

const AUTH_MARKERS: &[&str] = &[
    "unauthorized",
    "401",
    "403",
    "forbidden",
    "jwt",
    "token expired",
    "invalid token",
    "authentication",
];

/// Detect an authentication problem from a disconnect or error message
pub fn is_auth_failure(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    AUTH_MARKERS.iter().any(|marker| lower.contains(marker))
}
