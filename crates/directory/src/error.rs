//! Directory error types and result alias.
//!
//! Every [`DirectoryConnector`](crate::DirectoryConnector) implementation maps
//! its transport and protocol failures onto [`DirectoryError`], so the user
//! cache can treat all connectors alike.
//!
//! # Error Types
//!
//! - [`DirectoryError::Connection`] - Network, bind, or TLS failures
//! - [`DirectoryError::Timeout`] - The connector gave up waiting for the server
//! - [`DirectoryError::Protocol`] - The server answered with an error result code
//! - [`DirectoryError::InvalidRequest`] - The request was rejected before being sent
//! - [`DirectoryError::NoSuchEntry`] - A modify targeted a DN that does not exist
//!
//! # Example
//!
//! ```
//! use credbroker_directory::{DirectoryError, DirectoryResult};
//!
//! fn bind() -> DirectoryResult<()> {
//!     Err(DirectoryError::connection("ldap.example.com:636 refused connection"))
//! }
//!
//! assert!(bind().unwrap_err().is_transient());
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A shareable boxed error used for source chain tracking.
///
/// `Arc` rather than `Box` so that [`DirectoryError`] stays [`Clone`]; a single
/// failed refresh is reported to every caller waiting on it.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors that can occur while talking to the directory.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. Downstream match expressions must
/// include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum DirectoryError {
    /// Connection, bind, or TLS failure.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// The directory did not answer in time.
    #[error("Operation timeout")]
    Timeout,

    /// The directory answered with a non-success result code.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol error, typically the result code text.
        message: String,
        /// The underlying error, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// The request was malformed and never reached the server.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A modify operation targeted an entry that does not exist.
    #[error("No such entry: {dn}")]
    NoSuchEntry {
        /// The distinguished name that was not found.
        dn: String,
    },
}

impl DirectoryError {
    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Creates a new `Protocol` error with the given message.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol { message: message.into(), source: None }
    }

    /// Creates a new `Protocol` error with a message and source error.
    #[must_use]
    pub fn protocol_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Protocol { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Creates a new `NoSuchEntry` error for the given DN.
    #[must_use]
    pub fn no_such_entry(dn: impl Into<String>) -> Self {
        Self::NoSuchEntry { dn: dn.into() }
    }

    /// Returns `true` for failures that indicate the directory is temporarily
    /// unreachable rather than that the request itself was wrong.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout)
    }
}
