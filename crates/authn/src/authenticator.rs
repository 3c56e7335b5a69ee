//! Challenge-response authentication against the user cache.
//!
//! # Retry policy
//!
//! ```text
//! lookup(username)
//!   ├─ found     → try keys in order → first match wins, none → NotAuthenticated
//!   └─ not found → one forced update() → lookup again
//!                    ├─ found     → try keys as above
//!                    └─ not found → NotAuthenticated
//!                                   (a failed refresh is audited, not returned)
//! ```
//!
//! A known user whose keys all fail is denied without a refresh: the cached
//! key set is what the directory held at the last refresh, and a refresh per
//! bad signature would let anyone drive directory load.

use std::{collections::HashMap, sync::Arc};

use crate::{
    error::{AuthError, Result},
    group::Group,
    signature::SshSignature,
    snapshot::{SnapshotStats, User},
    user_cache::UserCache,
};

/// Verifies signed challenges for directory users.
#[derive(Debug, Clone)]
pub struct Authenticator {
    cache: Arc<UserCache>,
}

impl Authenticator {
    /// Creates an authenticator over a shared cache.
    #[must_use]
    pub fn new(cache: Arc<UserCache>) -> Self {
        Self { cache }
    }

    /// Authenticates `username` by checking `signature` over `challenge`.
    ///
    /// `signature` is the SSH wire encoding (format name, then signature
    /// bytes). A signature that cannot be decoded matches no key.
    ///
    /// An audit event is emitted at INFO level for every verdict.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotAuthenticated`] if no key of the user verifies
    /// the signature, or the user is unknown even after a forced refresh. A
    /// failed forced refresh is also a denial; its error is recorded on the
    /// audit event.
    #[tracing::instrument(skip(self, challenge, signature))]
    pub async fn authenticate(
        &self,
        username: &str,
        challenge: &[u8],
        signature: &[u8],
    ) -> Result<Arc<User>> {
        let signature = SshSignature::decode(signature);
        if signature.is_none() {
            tracing::debug!("signature is not a valid SSH signature encoding");
        }

        let user = match self.cache.lookup(username) {
            Some(user) => user,
            None => {
                tracing::debug!("unknown user, forcing refresh");
                self.cache.metrics().forced_refresh();
                let refreshed = self.cache.update().await;
                match (self.cache.lookup(username), refreshed) {
                    (Some(user), _) => user,
                    (None, Ok(_)) => return Err(self.deny(username, "unknown_user", None)),
                    (None, Err(err)) => {
                        return Err(self.deny(username, "unknown_user", Some(&err)));
                    },
                }
            },
        };

        let verified = signature.as_ref().and_then(|sig| user.find_verifying_key(challenge, sig));
        match verified {
            Some(key) => {
                self.cache.metrics().auth_success();
                tracing::info!(
                    audit.action = "authenticate",
                    audit.resource = %format_args!("user:{username}"),
                    audit.result = "success",
                    audit.key_fingerprint = key.fingerprint(),
                    "audit_event"
                );
                Ok(user)
            },
            None => Err(self.deny(username, "no_matching_key", None)),
        }
    }

    /// Counts and audits a denial. `refresh_error` is the failure of the
    /// forced refresh, if there was one.
    fn deny(
        &self,
        username: &str,
        reason: &'static str,
        refresh_error: Option<&AuthError>,
    ) -> AuthError {
        self.cache.metrics().auth_failure();
        tracing::info!(
            audit.action = "authenticate",
            audit.resource = %format_args!("user:{username}"),
            audit.result = "denied",
            audit.reason = reason,
            error = refresh_error.map(tracing::field::display),
            "audit_event"
        );
        AuthError::not_authenticated(username)
    }

    /// Refreshes the underlying cache. See [`UserCache::update`].
    ///
    /// # Errors
    ///
    /// Returns the refresh error; the previous snapshot stays installed.
    pub async fn update(&self) -> Result<Arc<SnapshotStats>> {
        self.cache.update().await
    }

    /// Groups of the installed snapshot, keyed by entry DN.
    #[must_use]
    pub fn groups(&self) -> Arc<HashMap<String, Group>> {
        self.cache.groups()
    }

    /// Users of the installed snapshot, keyed by login name.
    #[must_use]
    pub fn users(&self) -> Arc<HashMap<String, Arc<User>>> {
        self.cache.users()
    }

    /// The underlying cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<UserCache> {
        &self.cache
    }
}
