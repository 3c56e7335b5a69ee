//! # credbroker authentication
//!
//! Directory-backed user cache and SSH challenge-response authentication
//! for the credential broker.
//!
//! This crate provides:
//! - **Key codec**: SSH public keys from raw blobs or `authorized_keys` lines
//! - **Group resolution**: per-entry role identifiers and credential lifetime
//! - **User cache**: atomically swapped directory snapshots with coalesced
//!   and periodic refreshes
//! - **Authenticator**: signature verification with a single forced refresh
//!   for users the cache has not seen yet
//!
//! ## Features
//!
//! - Ed25519 and RSA (`rsa-sha2-256`, `rsa-sha2-512`) keys
//! - Malformed directory data is skipped per value, never per snapshot
//! - A failed refresh keeps serving the previous snapshot
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use credbroker_authn::{AuthMetrics, Authenticator, UserCache, UserCacheConfig};
//! use credbroker_directory::DirectoryConnector;
//!
//! # async fn example(
//! #     connector: Arc<dyn DirectoryConnector>,
//! #     challenge: &[u8],
//! #     signature: &[u8],
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = UserCacheConfig::builder()
//!     .base_dn("dc=example,dc=com")
//!     .role_attribute("roleAttribute")
//!     .timeout_attribute("timeoutAttribute")
//!     .build()?;
//!
//! let cache = UserCache::connect(connector, config, Arc::new(AuthMetrics::new()))
//!     .await?
//!     .with_background_refresh();
//! let authenticator = Authenticator::new(cache);
//!
//! let user = authenticator.authenticate("alice", challenge, signature).await?;
//! let groups = authenticator.groups();
//! for dn in user.dns() {
//!     if let Some(group) = groups.get(dn) {
//!         println!("{dn}: roles {:?}, lifetime {}s", group.arns, group.timeout);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - **`testutil`**: Key pairs, signature encoding, a standard test
//!   configuration, and the `assert_auth_error!` macro.
//! - **`failpoints`**: Enables fail-point injection (`snapshot-before-search`).

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Challenge-response authentication.
pub mod authenticator;
/// User cache configuration.
pub mod config;
/// Authentication error types.
pub mod error;
/// Group policy resolution.
pub mod group;
/// SSH public key parsing.
pub mod key_codec;
/// Refresh and authentication metrics.
pub mod metrics;
/// SSH signature decoding and verification.
pub mod signature;
/// Directory snapshots.
pub mod snapshot;
/// Shared test utilities.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;
/// Directory-backed user cache.
pub mod user_cache;
mod wire;

// Re-export key types for convenience
pub use authenticator::Authenticator;
pub use config::{DirectoryCredentials, UserCacheConfig};
pub use error::{AuthError, Result};
pub use group::{DEFAULT_TIMEOUT_SECS, Group, GroupResolver, ResolvedGroup, TimeoutFallback};
pub use key_codec::{
    KeyAlgorithm, KeyParseError, PublicKey, parse_authorized_key, parse_public_key, parse_raw_key,
};
pub use metrics::{AuthMetrics, AuthMetricsSnapshot, MetricsSink, NoopMetrics};
pub use signature::SshSignature;
pub use snapshot::{Snapshot, SnapshotBuilder, SnapshotStats, User};
pub use user_cache::UserCache;
