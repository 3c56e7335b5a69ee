//! Immutable directory snapshots and the pass that builds them.
//!
//! # Build pass
//!
//! ```text
//! search(base_dn, objectClass=<class>)
//!   → per entry: username, keys (KeyCodec), group (GroupResolver)
//!   → fold same-named entries into one User
//!   → Snapshot { users, groups, stats }
//! ```
//!
//! Per-entry data problems (malformed keys, unusable timeouts, missing
//! usernames) are logged and counted but never fail the build. Only a
//! connector error does, and then no snapshot is produced.

use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use credbroker_directory::{
    DirectoryConnector, DirectoryError, Entry, SearchFilter, SearchRequest,
};
use fail::fail_point;

use crate::{
    config::UserCacheConfig,
    group::{Group, GroupResolver, TimeoutFallback},
    key_codec::{PublicKey, parse_public_key},
    metrics::MetricsSink,
    signature::SshSignature,
};

/// A user as seen in one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    name: String,
    keys: Vec<PublicKey>,
    dns: Vec<String>,
}

impl User {
    /// Creates a user from already-parsed keys.
    #[must_use]
    pub fn new(name: impl Into<String>, keys: Vec<PublicKey>, dns: Vec<String>) -> Self {
        Self { name: name.into(), keys, dns }
    }

    /// Login name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keys from every entry with this name, first-seen order, no duplicates.
    #[must_use]
    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }

    /// DNs of the entries this user was assembled from, in directory order.
    ///
    /// Look these up in [`Snapshot::groups`] to find the user's policy.
    #[must_use]
    pub fn dns(&self) -> &[String] {
        &self.dns
    }

    /// Returns the first key, in order, that verifies `signature` over
    /// `challenge`.
    #[must_use]
    pub fn find_verifying_key(
        &self,
        challenge: &[u8],
        signature: &SshSignature,
    ) -> Option<&PublicKey> {
        self.keys.iter().find(|key| key.verify(challenge, signature))
    }
}

/// Counters describing one build pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotStats {
    /// Entries returned by the search.
    pub entries: usize,
    /// Distinct usernames.
    pub users: usize,
    /// Groups, one per entry DN.
    pub groups: usize,
    /// Distinct keys across all users.
    pub keys: usize,
    /// Key values skipped because they could not be parsed.
    pub key_parse_errors: usize,
    /// Entries whose timeout fell back to the default.
    pub timeout_fallbacks: usize,
    /// Entries that contributed a group but no user.
    pub entries_without_username: usize,
    /// Wall-clock time spent in the pass, in microseconds.
    pub build_micros: u64,
    /// When the pass finished.
    pub built_at: DateTime<Utc>,
}

/// One consistent view of the directory.
///
/// Never modified after construction; a refresh builds a new one.
#[derive(Debug, Clone)]
pub struct Snapshot {
    users: Arc<HashMap<String, Arc<User>>>,
    groups: Arc<HashMap<String, Group>>,
    stats: Arc<SnapshotStats>,
}

impl Snapshot {
    /// A snapshot with no users or groups, served until the first refresh.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            users: Arc::default(),
            groups: Arc::default(),
            stats: Arc::new(SnapshotStats {
                entries: 0,
                users: 0,
                groups: 0,
                keys: 0,
                key_parse_errors: 0,
                timeout_fallbacks: 0,
                entries_without_username: 0,
                build_micros: 0,
                built_at: DateTime::<Utc>::UNIX_EPOCH,
            }),
        }
    }

    /// Looks up a user by login name.
    #[must_use]
    pub fn lookup(&self, username: &str) -> Option<Arc<User>> {
        self.users.get(username).cloned()
    }

    /// All users keyed by login name.
    #[must_use]
    pub fn users(&self) -> Arc<HashMap<String, Arc<User>>> {
        Arc::clone(&self.users)
    }

    /// All groups keyed by entry DN.
    #[must_use]
    pub fn groups(&self) -> Arc<HashMap<String, Group>> {
        Arc::clone(&self.groups)
    }

    /// Statistics of the pass that built this snapshot.
    #[must_use]
    pub fn stats(&self) -> Arc<SnapshotStats> {
        Arc::clone(&self.stats)
    }
}

/// Runs the directory search and folds its entries into a [`Snapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    base_dn: String,
    object_class: String,
    username_attribute: String,
    key_attribute: String,
    resolver: GroupResolver,
}

#[derive(Default)]
struct PendingUser {
    keys: Vec<PublicKey>,
    dns: Vec<String>,
}

impl SnapshotBuilder {
    /// Creates a builder for the given configuration.
    #[must_use]
    pub fn new(config: &UserCacheConfig) -> Self {
        Self {
            base_dn: config.base_dn().to_owned(),
            object_class: config.group_object_class().to_owned(),
            username_attribute: config.username_attribute().to_owned(),
            key_attribute: config.key_attribute().to_owned(),
            resolver: GroupResolver::new(
                config.role_attribute().map(str::to_owned),
                config.timeout_attribute().map(str::to_owned),
            ),
        }
    }

    /// The search issued by [`build`](Self::build).
    #[must_use]
    pub fn search_request(&self) -> SearchRequest {
        let mut attributes = vec![self.username_attribute.clone(), self.key_attribute.clone()];
        attributes.extend(self.resolver.role_attribute().map(str::to_owned));
        attributes.extend(self.resolver.timeout_attribute().map(str::to_owned));

        SearchRequest::builder()
            .base_dn(self.base_dn.as_str())
            .filter(SearchFilter::ObjectClass(self.object_class.clone()))
            .attributes(attributes)
            .build()
    }

    /// Runs one full synchronization pass.
    ///
    /// # Errors
    ///
    /// Returns the connector's [`DirectoryError`] if the search fails.
    #[tracing::instrument(skip(self, connector, metrics), fields(base_dn = %self.base_dn))]
    pub async fn build(
        &self,
        connector: &dyn DirectoryConnector,
        metrics: &dyn MetricsSink,
    ) -> Result<Snapshot, DirectoryError> {
        let start = Instant::now();
        metrics.refresh_attempt();

        fail_point!("snapshot-before-search", |_| {
            Err(DirectoryError::connection("injected failure before directory search"))
        });
        let entries = connector.search(&self.search_request()).await?;

        let mut snapshot = self.assemble(&entries, metrics);
        if let Some(stats) = Arc::get_mut(&mut snapshot.stats) {
            stats.build_micros = start.elapsed().as_micros().try_into().unwrap_or(u64::MAX);
        }
        Ok(snapshot)
    }

    /// Folds search results into a snapshot. Never fails.
    #[must_use]
    pub fn assemble(&self, entries: &[Entry], metrics: &dyn MetricsSink) -> Snapshot {
        let start = Instant::now();
        let mut pending: HashMap<String, PendingUser> = HashMap::new();
        let mut groups = HashMap::with_capacity(entries.len());
        let mut key_parse_errors = 0;
        let mut timeout_fallbacks = 0;
        let mut entries_without_username = 0;

        for entry in entries {
            let resolved = self.resolver.resolve(entry);
            if let Some(reason) = &resolved.timeout_fallback {
                timeout_fallbacks += 1;
                match reason {
                    TimeoutFallback::Invalid(_) | TimeoutFallback::NonPositive(_) => {
                        metrics.timeout_parse_error();
                        tracing::warn!(dn = %entry.dn, reason = %reason, "using default timeout");
                    },
                    TimeoutFallback::Absent | TimeoutFallback::Empty => {
                        tracing::debug!(dn = %entry.dn, reason = %reason, "using default timeout");
                    },
                }
            }
            groups.insert(entry.dn.clone(), resolved.group);

            let Some(username) =
                entry.get(&self.username_attribute).first().map(str::trim).filter(|u| !u.is_empty())
            else {
                entries_without_username += 1;
                tracing::debug!(dn = %entry.dn, "entry has no username, keeping group only");
                continue;
            };

            let user = pending.entry(username.to_owned()).or_default();
            user.dns.push(entry.dn.clone());
            for value in entry.get(&self.key_attribute).as_slice() {
                match parse_public_key(value) {
                    Ok(key) => {
                        if !user.keys.contains(&key) {
                            user.keys.push(key);
                        }
                    },
                    Err(error) => {
                        key_parse_errors += 1;
                        metrics.key_parse_error();
                        tracing::warn!(
                            dn = %entry.dn,
                            attribute = %self.key_attribute,
                            error = %error,
                            "skipping unparsable public key"
                        );
                    },
                }
            }
        }

        let users: HashMap<String, Arc<User>> = pending
            .into_iter()
            .map(|(name, p)| {
                let user = User { name: name.clone(), keys: p.keys, dns: p.dns };
                (name, Arc::new(user))
            })
            .collect();

        let stats = SnapshotStats {
            entries: entries.len(),
            users: users.len(),
            groups: groups.len(),
            keys: users.values().map(|u| u.keys.len()).sum(),
            key_parse_errors,
            timeout_fallbacks,
            entries_without_username,
            build_micros: start.elapsed().as_micros().try_into().unwrap_or(u64::MAX),
            built_at: Utc::now(),
        };

        Snapshot { users: Arc::new(users), groups: Arc::new(groups), stats: Arc::new(stats) }
    }
}
