//! Metrics hooks for refreshes and authentication attempts.
//!
//! The cache reports events through the [`MetricsSink`] trait. Every method
//! has a no-op default, so an exporter only overrides what it cares about.
//! [`AuthMetrics`] is the in-process implementation backed by atomic
//! counters.
//!
//! # Examples
//!
//! ```
//! use credbroker_authn::{AuthMetrics, MetricsSink};
//!
//! let metrics = AuthMetrics::new();
//! metrics.auth_success();
//! metrics.auth_failure();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.auth_attempts(), 2);
//! assert_eq!(snapshot.auth_failure_rate(), 0.5);
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use credbroker_directory::DirectoryError;

/// Receiver for cache and authentication events.
///
/// Implementations must be cheap and must not fail; calls happen on the
/// authentication path.
pub trait MetricsSink: Send + Sync {
    /// A snapshot refresh started a directory search.
    fn refresh_attempt(&self) {}

    /// A snapshot refresh failed. The previous snapshot stays installed.
    fn refresh_failure(&self, _error: &DirectoryError) {}

    /// A signature verified against one of the user's keys.
    fn auth_success(&self) {}

    /// An authentication attempt ended in a denial.
    fn auth_failure(&self) {}

    /// A key attribute value could not be parsed and was skipped.
    fn key_parse_error(&self) {}

    /// A timeout attribute value was unusable and the default was applied.
    fn timeout_parse_error(&self) {}

    /// An unknown username forced a refresh.
    fn forced_refresh(&self) {}
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

impl<T: MetricsSink + ?Sized> MetricsSink for Arc<T> {
    fn refresh_attempt(&self) {
        (**self).refresh_attempt();
    }

    fn refresh_failure(&self, error: &DirectoryError) {
        (**self).refresh_failure(error);
    }

    fn auth_success(&self) {
        (**self).auth_success();
    }

    fn auth_failure(&self) {
        (**self).auth_failure();
    }

    fn key_parse_error(&self) {
        (**self).key_parse_error();
    }

    fn timeout_parse_error(&self) {
        (**self).timeout_parse_error();
    }

    fn forced_refresh(&self) {
        (**self).forced_refresh();
    }
}

/// Counter values at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, bon::Builder)]
pub struct AuthMetricsSnapshot {
    /// Directory searches started by refreshes.
    #[builder(default)]
    pub refresh_attempts: u64,
    /// Refreshes that failed.
    #[builder(default)]
    pub refresh_failures: u64,
    /// Refresh failures the connector classified as transient.
    #[builder(default)]
    pub refresh_failures_transient: u64,
    /// Successful authentications.
    #[builder(default)]
    pub auth_successes: u64,
    /// Denied authentications.
    #[builder(default)]
    pub auth_failures: u64,
    /// Skipped key attribute values.
    #[builder(default)]
    pub key_parse_errors: u64,
    /// Defaulted timeout values.
    #[builder(default)]
    pub timeout_parse_errors: u64,
    /// Refreshes forced by unknown usernames.
    #[builder(default)]
    pub forced_refreshes: u64,
}

impl AuthMetricsSnapshot {
    /// Total authentication attempts that reached a verdict.
    #[must_use]
    pub fn auth_attempts(&self) -> u64 {
        self.auth_successes + self.auth_failures
    }

    /// Fraction of attempts denied (0.0 to 1.0).
    #[must_use]
    pub fn auth_failure_rate(&self) -> f64 {
        let total = self.auth_attempts();
        if total == 0 { 0.0 } else { self.auth_failures as f64 / total as f64 }
    }
}

#[derive(Debug, Default)]
struct AuthMetricsInner {
    refresh_attempts: AtomicU64,
    refresh_failures: AtomicU64,
    refresh_failures_transient: AtomicU64,
    auth_successes: AtomicU64,
    auth_failures: AtomicU64,
    key_parse_errors: AtomicU64,
    timeout_parse_errors: AtomicU64,
    forced_refreshes: AtomicU64,
}

/// Atomic-counter [`MetricsSink`].
///
/// Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct AuthMetrics {
    inner: Arc<AuthMetricsInner>,
}

impl AuthMetrics {
    /// Creates a collector with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every counter.
    #[must_use]
    pub fn snapshot(&self) -> AuthMetricsSnapshot {
        let i = &self.inner;
        AuthMetricsSnapshot::builder()
            .refresh_attempts(i.refresh_attempts.load(Ordering::Relaxed))
            .refresh_failures(i.refresh_failures.load(Ordering::Relaxed))
            .refresh_failures_transient(i.refresh_failures_transient.load(Ordering::Relaxed))
            .auth_successes(i.auth_successes.load(Ordering::Relaxed))
            .auth_failures(i.auth_failures.load(Ordering::Relaxed))
            .key_parse_errors(i.key_parse_errors.load(Ordering::Relaxed))
            .timeout_parse_errors(i.timeout_parse_errors.load(Ordering::Relaxed))
            .forced_refreshes(i.forced_refreshes.load(Ordering::Relaxed))
            .build()
    }
}

impl MetricsSink for AuthMetrics {
    fn refresh_attempt(&self) {
        self.inner.refresh_attempts.fetch_add(1, Ordering::Relaxed);
    }

    fn refresh_failure(&self, error: &DirectoryError) {
        self.inner.refresh_failures.fetch_add(1, Ordering::Relaxed);
        if error.is_transient() {
            self.inner.refresh_failures_transient.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn auth_success(&self) {
        self.inner.auth_successes.fetch_add(1, Ordering::Relaxed);
    }

    fn auth_failure(&self) {
        self.inner.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn key_parse_error(&self) {
        self.inner.key_parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn timeout_parse_error(&self) {
        self.inner.timeout_parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn forced_refresh(&self) {
        self.inner.forced_refreshes.fetch_add(1, Ordering::Relaxed);
    }
}
