//! Directory-backed user cache with coalesced refreshes.
//!
//! # Architecture
//!
//! ```text
//! lookup/groups/users → ArcSwap<Snapshot> (lock-free load)
//!
//! update() ─┬─ refresh in flight? → wait on its watch channel
//!           └─ none → start one:  spawn task
//!                                   → SnapshotBuilder::build
//!                                   → install (ArcSwap::store)
//!                                   → clear in-flight slot
//!                                   → publish outcome to every waiter
//! ```
//!
//! # Coalescing
//!
//! At most one refresh runs at a time. Callers that arrive while one is in
//! flight wait for it and receive the same outcome, success or error. The
//! refresh runs on its own task, so a caller that gives up waiting does not
//! cancel it for the others. A failed refresh leaves the installed snapshot
//! in place.
//!
//! # Background refresh
//!
//! [`UserCache::with_refresh_interval`] spawns a task that calls the same
//! coalesced refresh on a fixed period until [`UserCache::shutdown`] is
//! called or the cache is dropped.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use credbroker_authn::{NoopMetrics, UserCache, UserCacheConfig};
//! use credbroker_directory::{Entry, MemoryDirectory};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let directory = MemoryDirectory::with_entries([Entry::new("cn=alice,dc=example,dc=com")
//!         .with_attribute("objectClass", ["groupOfNames"])
//!         .with_attribute("cn", ["alice"])]);
//!     let config = UserCacheConfig::builder().base_dn("dc=example,dc=com").build()?;
//!
//!     let cache = UserCache::connect(Arc::new(directory), config, Arc::new(NoopMetrics)).await?;
//!
//!     assert!(cache.lookup("alice").is_some());
//!     assert_eq!(cache.generation(), 1);
//!     Ok(())
//! }
//! ```

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use credbroker_directory::DirectoryConnector;
use parking_lot::Mutex;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    config::UserCacheConfig,
    error::{AuthError, Result},
    group::Group,
    metrics::MetricsSink,
    snapshot::{Snapshot, SnapshotBuilder, SnapshotStats, User},
};

type RefreshOutcome = Result<Arc<SnapshotStats>>;

/// A refresh that has started but not yet published its outcome.
struct InFlight {
    id: u64,
    outcome: watch::Receiver<Option<RefreshOutcome>>,
}

struct Inner {
    connector: Arc<dyn DirectoryConnector>,
    builder: SnapshotBuilder,
    metrics: Arc<dyn MetricsSink>,
    current: ArcSwap<Snapshot>,
    /// Number of snapshots installed so far.
    generation: AtomicU64,
    last_refresh: Mutex<Option<DateTime<Utc>>>,
    /// Held only to test or replace the slot, never across I/O.
    in_flight: Mutex<Option<InFlight>>,
    next_refresh_id: AtomicU64,
}

/// Cache of directory users and groups.
///
/// Cheap reads against the installed [`Snapshot`]; refreshes through
/// [`update`](Self::update). Share it behind an `Arc`.
pub struct UserCache {
    inner: Arc<Inner>,
    config: UserCacheConfig,
    cancel_token: CancellationToken,
    /// Wrapped in `Mutex` so `shutdown()` can take it via `&self`.
    refresh_handle: Mutex<Option<JoinHandle<()>>>,
}

impl UserCache {
    /// Creates a cache serving an empty snapshot. No directory I/O happens
    /// until the first [`update`](Self::update).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if `config` fails validation.
    pub fn new(
        connector: Arc<dyn DirectoryConnector>,
        config: UserCacheConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                connector,
                builder: SnapshotBuilder::new(&config),
                metrics,
                current: ArcSwap::from_pointee(Snapshot::empty()),
                generation: AtomicU64::new(0),
                last_refresh: Mutex::new(None),
                in_flight: Mutex::new(None),
                next_refresh_id: AtomicU64::new(0),
            }),
            config,
            cancel_token: CancellationToken::new(),
            refresh_handle: Mutex::new(None),
        })
    }

    /// Creates a cache and loads the directory before returning.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] for an invalid configuration, or the
    /// error of the initial refresh.
    pub async fn connect(
        connector: Arc<dyn DirectoryConnector>,
        config: UserCacheConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Arc<Self>> {
        let cache = Arc::new(Self::new(connector, config, metrics)?);
        cache.update().await?;
        Ok(cache)
    }

    /// Looks up a user in the installed snapshot. Never touches the directory.
    #[must_use]
    pub fn lookup(&self, username: &str) -> Option<Arc<User>> {
        let user = self.inner.current.load().lookup(username);
        tracing::debug!(username, hit = user.is_some(), "user cache lookup");
        user
    }

    /// Rebuilds the snapshot from the directory.
    ///
    /// Joins the refresh already in flight if there is one, so concurrent
    /// callers cause a single directory search and all observe its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Directory`] if the search failed (the previous
    /// snapshot stays installed), or [`AuthError::RefreshAbandoned`] if the
    /// refresh task ended without an outcome.
    #[tracing::instrument(skip(self))]
    pub async fn update(&self) -> Result<Arc<SnapshotStats>> {
        Inner::refresh(&self.inner).await
    }

    /// All groups of the installed snapshot, keyed by entry DN.
    #[must_use]
    pub fn groups(&self) -> Arc<HashMap<String, Group>> {
        self.inner.current.load().groups()
    }

    /// All users of the installed snapshot, keyed by login name.
    #[must_use]
    pub fn users(&self) -> Arc<HashMap<String, Arc<User>>> {
        self.inner.current.load().users()
    }

    /// The installed snapshot, for reads that must agree with each other.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.current.load_full()
    }

    /// How many snapshots have been installed. Zero until the first
    /// successful refresh.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// When the installed snapshot was built, if any refresh has succeeded.
    #[must_use]
    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_refresh.lock()
    }

    /// The configuration the cache was created with.
    #[must_use]
    pub fn config(&self) -> &UserCacheConfig {
        &self.config
    }

    pub(crate) fn metrics(&self) -> &dyn MetricsSink {
        self.inner.metrics.as_ref()
    }

    /// Starts the background refresh at the configured interval.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    #[must_use]
    pub fn with_background_refresh(self: Arc<Self>) -> Arc<Self> {
        let interval = self.config.refresh_interval();
        self.with_refresh_interval(interval)
    }

    /// Starts a background task refreshing the cache every `interval`.
    ///
    /// The first refresh happens one full interval after the call. Failures
    /// are logged and the next tick tries again. The task stops on
    /// [`shutdown`](Self::shutdown) or when the cache is dropped. A zero
    /// `interval` falls back to the configured refresh interval.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    #[must_use]
    pub fn with_refresh_interval(self: Arc<Self>, interval: Duration) -> Arc<Self> {
        let interval = if interval.is_zero() {
            let fallback = self.config.refresh_interval();
            tracing::warn!(
                fallback = ?fallback,
                "zero background refresh interval, using the configured interval"
            );
            fallback
        } else {
            interval
        };
        let inner = Arc::clone(&self.inner);
        let token = self.cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; consume it so we start
            // with a full interval wait.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("background refresh task shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = Inner::refresh(&inner).await {
                            tracing::warn!(error = %err, "background refresh failed");
                        }
                    }
                }
            }
        });

        let previous = self.refresh_handle.lock().replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        self
    }

    /// Stops the background refresh task and waits for it to exit.
    ///
    /// A refresh already in flight still completes and installs its result.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let handle = self.refresh_handle.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
            && !err.is_cancelled()
        {
            tracing::warn!(error = %err, "background refresh task panicked");
        }
    }

    /// Returns the token that stops the background refresh.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for UserCache {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl std::fmt::Debug for UserCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCache")
            .field("base_dn", &self.config.base_dn())
            .field("generation", &self.generation())
            .field("last_refresh", &self.last_refresh())
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn refresh(this: &Arc<Self>) -> RefreshOutcome {
        let mut outcome = Self::join_or_start(this);
        let published = match outcome.wait_for(Option::is_some).await {
            Ok(published) => published.clone(),
            Err(_) => None,
        };
        published.unwrap_or(Err(AuthError::RefreshAbandoned))
    }

    /// Returns the outcome channel of the refresh in flight, starting one if
    /// none is.
    fn join_or_start(this: &Arc<Self>) -> watch::Receiver<Option<RefreshOutcome>> {
        let mut slot = this.in_flight.lock();
        if let Some(in_flight) = slot.as_ref() {
            tracing::debug!(refresh_id = in_flight.id, "joining refresh in flight");
            return in_flight.outcome.clone();
        }

        let id = this.next_refresh_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        *slot = Some(InFlight { id, outcome: rx.clone() });
        drop(slot);

        let ticket = RefreshTicket { inner: Arc::clone(this), id, tx };
        tokio::spawn(async move {
            let outcome = ticket.inner.run(id).await;
            ticket.complete(outcome);
        });
        rx
    }

    async fn run(&self, id: u64) -> RefreshOutcome {
        tracing::debug!(refresh_id = id, "starting directory refresh");
        match self.builder.build(self.connector.as_ref(), self.metrics.as_ref()).await {
            Ok(snapshot) => Ok(self.install(snapshot)),
            Err(err) => {
                self.metrics.refresh_failure(&err);
                tracing::warn!(
                    refresh_id = id,
                    error = %err,
                    generation = self.generation.load(Ordering::Acquire),
                    "directory refresh failed, keeping current snapshot"
                );
                Err(AuthError::Directory(err))
            },
        }
    }

    fn install(&self, snapshot: Snapshot) -> Arc<SnapshotStats> {
        let stats = snapshot.stats();
        self.current.store(Arc::new(snapshot));
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *self.last_refresh.lock() = Some(stats.built_at);

        tracing::info!(
            generation,
            entries = stats.entries,
            users = stats.users,
            groups = stats.groups,
            keys = stats.keys,
            key_parse_errors = stats.key_parse_errors,
            build_micros = stats.build_micros,
            "installed directory snapshot"
        );
        stats
    }
}

/// Owned by the task running a refresh. Publishing the outcome or being
/// dropped without one both free the in-flight slot.
struct RefreshTicket {
    inner: Arc<Inner>,
    id: u64,
    tx: watch::Sender<Option<RefreshOutcome>>,
}

impl RefreshTicket {
    fn complete(self, outcome: RefreshOutcome) {
        // Clear before publishing so a caller woken by this outcome that
        // immediately refreshes again starts a new search.
        self.release();
        self.tx.send_replace(Some(outcome));
    }

    fn release(&self) {
        let mut slot = self.inner.in_flight.lock();
        if slot.as_ref().is_some_and(|f| f.id == self.id) {
            *slot = None;
        }
    }
}

impl Drop for RefreshTicket {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use credbroker_directory::{
        DirectoryError, MemoryDirectory,
        testutil::{TEST_BASE_DN, account_dn, account_entry},
    };

    use super::*;
    use crate::{
        metrics::{AuthMetrics, NoopMetrics},
        testutil::{TestKeyPair, test_config},
    };

    fn cache_over(directory: &MemoryDirectory) -> UserCache {
        UserCache::new(Arc::new(directory.clone()), test_config(), Arc::new(NoopMetrics))
            .expect("cache")
    }

    #[tokio::test]
    async fn test_new_serves_empty_snapshot_without_io() {
        let directory = MemoryDirectory::with_entries([account_entry("alice")]);

        let cache = cache_over(&directory);

        assert!(cache.lookup("alice").is_none());
        assert_eq!(cache.generation(), 0);
        assert_eq!(cache.last_refresh(), None);
        assert_eq!(directory.search_count(), 0);
    }

    #[tokio::test]
    async fn test_update_installs_snapshot() {
        let pair = TestKeyPair::generate_ed25519();
        let directory = MemoryDirectory::with_entries([
            account_entry("alice").with_attribute("sshPublicKey", [pair.raw_key()])
        ]);
        let cache = cache_over(&directory);

        let stats = cache.update().await.expect("update");

        assert_eq!(stats.users, 1);
        assert_eq!(cache.generation(), 1);
        assert_eq!(cache.last_refresh(), Some(stats.built_at));
        assert_eq!(cache.lookup("alice").expect("alice").keys().len(), 1);
        assert_eq!(cache.users().len(), 1);
        assert_eq!(cache.groups().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_update_keeps_previous_snapshot() {
        let directory = MemoryDirectory::with_entries([account_entry("alice")]);
        let metrics = AuthMetrics::new();
        let cache =
            UserCache::new(Arc::new(directory.clone()), test_config(), Arc::new(metrics.clone()))
                .expect("cache");
        cache.update().await.expect("first update");
        let before = cache.snapshot();

        directory.set_search_failure(Some(DirectoryError::connection("ldap down")));
        directory.insert(account_entry("bob"));
        let result = cache.update().await;

        assert!(matches!(result, Err(AuthError::Directory(DirectoryError::Connection { .. }))));
        assert!(Arc::ptr_eq(&before, &cache.snapshot()));
        assert!(cache.lookup("alice").is_some());
        assert!(cache.lookup("bob").is_none());
        assert_eq!(cache.generation(), 1);
        assert_eq!(metrics.snapshot().refresh_failures, 1);
        assert_eq!(metrics.snapshot().refresh_failures_transient, 1);
    }

    #[tokio::test]
    async fn test_readers_keep_their_snapshot_across_swaps() {
        let directory = MemoryDirectory::with_entries([account_entry("alice")]);
        let cache = cache_over(&directory);
        cache.update().await.expect("update");

        let held = cache.snapshot();
        directory.remove(&account_dn("alice"));
        cache.update().await.expect("update");

        assert!(held.lookup("alice").is_some());
        assert!(cache.lookup("alice").is_none());
    }

    #[tokio::test]
    async fn test_sequential_updates_each_search() {
        let directory = MemoryDirectory::new();
        let cache = cache_over(&directory);

        cache.update().await.expect("update");
        cache.update().await.expect("update");

        assert_eq!(directory.search_count(), 2);
        assert_eq!(cache.generation(), 2);
    }

    #[tokio::test]
    async fn test_connect_loads_eagerly() {
        let directory = MemoryDirectory::with_entries([account_entry("alice")]);

        let cache = UserCache::connect(Arc::new(directory.clone()), test_config(), Arc::new(NoopMetrics))
            .await
            .expect("connect");

        assert!(cache.lookup("alice").is_some());
        assert_eq!(directory.search_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_fails_when_directory_is_down() {
        let directory = MemoryDirectory::new();
        directory.set_search_failure(Some(DirectoryError::timeout()));

        let result =
            UserCache::connect(Arc::new(directory), test_config(), Arc::new(NoopMetrics)).await;

        assert!(matches!(result, Err(AuthError::Directory(DirectoryError::Timeout))));
    }

    #[test]
    fn test_new_rejects_invalid_deserialized_config() {
        let config: UserCacheConfig =
            serde_json::from_value(serde_json::json!({ "base_dn": "" })).expect("deserialize");

        let result = UserCache::new(Arc::new(MemoryDirectory::new()), config, Arc::new(NoopMetrics));

        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[tokio::test]
    async fn test_background_refresh_picks_up_changes() {
        let directory = MemoryDirectory::new();
        let cache = Arc::new(cache_over(&directory)).with_refresh_interval(Duration::from_millis(50));

        directory.insert(account_entry("alice"));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(cache.lookup("alice").is_some());
        assert!(directory.search_count() >= 1);
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_interval_falls_back_to_configured_interval() {
        let directory = MemoryDirectory::new();
        let config = UserCacheConfig::builder()
            .base_dn(TEST_BASE_DN)
            .refresh_interval(Duration::from_millis(50))
            .build()
            .expect("config");
        let cache = Arc::new(
            UserCache::new(Arc::new(directory.clone()), config, Arc::new(NoopMetrics))
                .expect("cache"),
        )
        .with_refresh_interval(Duration::ZERO);

        directory.insert(account_entry("alice"));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(cache.lookup("alice").is_some(), "background task is still running");
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_background_refresh() {
        let directory = MemoryDirectory::new();
        let cache = Arc::new(cache_over(&directory)).with_refresh_interval(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(70)).await;

        cache.shutdown().await;
        let searches = directory.search_count();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(searches >= 1);
        assert_eq!(directory.search_count(), searches);
        assert!(cache.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_drop_cancels_background_refresh() {
        let directory = MemoryDirectory::new();
        let cache = Arc::new(cache_over(&directory)).with_refresh_interval(Duration::from_millis(20));
        let token = cache.cancel_token().clone();

        drop(cache);

        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_background_refresh_survives_failures() {
        let directory = MemoryDirectory::new();
        directory.set_search_failure(Some(DirectoryError::timeout()));
        let cache = Arc::new(cache_over(&directory)).with_refresh_interval(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(70)).await;

        directory.set_search_failure(None);
        directory.insert(account_entry("alice"));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cache.lookup("alice").is_some());
        cache.shutdown().await;
    }

    #[test]
    fn test_debug_output() {
        let cache = cache_over(&MemoryDirectory::new());
        let debug = format!("{cache:?}");
        assert!(debug.contains(TEST_BASE_DN));
        assert!(debug.contains("generation: 0"));
    }
}
