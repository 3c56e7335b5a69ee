//! Authentication error types.
//!
//! This module defines the errors surfaced by the user cache and the
//! authenticator. Per-value key parse failures have their own type,
//! [`KeyParseError`](crate::key_codec::KeyParseError), because they never
//! escape a snapshot build.

use credbroker_directory::DirectoryError;
use thiserror::Error;

/// Authentication and cache errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The directory query behind a refresh failed.
    ///
    /// The previously installed snapshot is still being served.
    #[error("Directory error: {0}")]
    Directory(
        /// The connector error that failed the refresh.
        #[source]
        DirectoryError,
    ),

    /// No key of the user verified the signature, or the user is unknown
    /// even after a forced refresh.
    #[error("Not authenticated: {username}")]
    NotAuthenticated {
        /// The username presented by the caller.
        username: String,
    },

    /// The task running a refresh ended without reporting an outcome.
    #[error("Refresh abandoned before completion")]
    RefreshAbandoned,

    /// Invalid cache configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl AuthError {
    /// Creates a new `NotAuthenticated` error.
    #[must_use]
    pub fn not_authenticated(username: impl Into<String>) -> Self {
        Self::NotAuthenticated { username: username.into() }
    }

    /// Creates a new `Config` error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns `true` if this is a terminal authentication denial rather than
    /// an infrastructure failure.
    #[must_use]
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::NotAuthenticated { .. })
    }
}

impl From<DirectoryError> for AuthError {
    fn from(err: DirectoryError) -> Self {
        AuthError::Directory(err)
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
