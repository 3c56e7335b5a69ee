//! In-memory directory for tests and development.
//!
//! [`MemoryDirectory`] answers searches from a vector of entries and applies
//! modify requests to them. It also counts calls and can inject latency and
//! failures, which is what the user cache tests need to observe refresh
//! coalescing and stale-snapshot retention.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::{
    connector::DirectoryConnector,
    entry::Entry,
    error::{DirectoryError, DirectoryResult},
    request::{Modification, ModifyRequest, SearchRequest},
};

/// In-memory implementation of [`DirectoryConnector`].
///
/// Clones share the same underlying entries and counters, so a test can hand
/// one clone to the cache and keep another to mutate the directory.
///
/// # Examples
///
/// ```
/// use credbroker_directory::{
///     DirectoryConnector, Entry, MemoryDirectory, SearchFilter, SearchRequest,
/// };
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let directory = MemoryDirectory::new();
///     directory.insert(
///         Entry::new("cn=alice,dc=example,dc=com")
///             .with_attribute("objectClass", ["groupOfNames"])
///             .with_attribute("cn", ["alice"]),
///     );
///
///     let request = SearchRequest::builder()
///         .base_dn("dc=example,dc=com")
///         .filter(SearchFilter::ObjectClass("groupOfNames".into()))
///         .build();
///     let entries = directory.search(&request).await?;
///
///     assert_eq!(entries.len(), 1);
///     assert_eq!(directory.search_count(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryDirectory {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: RwLock<Vec<Entry>>,
    /// Returned by every search while set.
    search_failure: Mutex<Option<DirectoryError>>,
    /// Artificial latency added to every search.
    search_delay: Mutex<Option<Duration>>,
    search_count: AtomicU64,
    modify_count: AtomicU64,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory holding the given entries.
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        let directory = Self::new();
        *directory.inner.entries.write() = entries.into_iter().collect();
        directory
    }

    /// Inserts an entry, replacing any existing entry with the same DN.
    pub fn insert(&self, entry: Entry) {
        let mut entries = self.inner.entries.write();
        match entries.iter_mut().find(|e| e.has_dn(&entry.dn)) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    /// Removes the entry named `dn`. Returns `false` if it did not exist.
    pub fn remove(&self, dn: &str) -> bool {
        let mut entries = self.inner.entries.write();
        let before = entries.len();
        entries.retain(|e| !e.has_dn(dn));
        entries.len() != before
    }

    /// Returns a copy of every stored entry.
    #[must_use]
    pub fn entries(&self) -> Vec<Entry> {
        self.inner.entries.read().clone()
    }

    /// Makes every subsequent search fail with `failure` until cleared with `None`.
    pub fn set_search_failure(&self, failure: Option<DirectoryError>) {
        *self.inner.search_failure.lock() = failure;
    }

    /// Delays every subsequent search by `delay` until cleared with `None`.
    pub fn set_search_delay(&self, delay: Option<Duration>) {
        *self.inner.search_delay.lock() = delay;
    }

    /// Number of searches issued so far, including failed ones.
    #[must_use]
    pub fn search_count(&self) -> u64 {
        self.inner.search_count.load(Ordering::SeqCst)
    }

    /// Number of modify requests issued so far.
    #[must_use]
    pub fn modify_count(&self) -> u64 {
        self.inner.modify_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryConnector for MemoryDirectory {
    #[tracing::instrument(skip(self, request), fields(base_dn = %request.base_dn, filter = %request.filter))]
    async fn search(&self, request: &SearchRequest) -> DirectoryResult<Vec<Entry>> {
        self.inner.search_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.inner.search_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.inner.search_failure.lock().clone();
        if let Some(err) = failure {
            return Err(err);
        }

        let entries = self.inner.entries.read();
        let results: Vec<Entry> = entries
            .iter()
            .filter(|entry| entry.is_within(&request.base_dn) && request.filter.matches(entry))
            .map(|entry| {
                let mut entry = entry.clone();
                entry.attributes.retain_only(&request.attributes);
                entry
            })
            .collect();

        tracing::debug!(matched = results.len(), "search complete");
        Ok(results)
    }

    #[tracing::instrument(skip(self, request), fields(dn = %request.dn, changes = request.changes.len()))]
    async fn modify(&self, request: &ModifyRequest) -> DirectoryResult<()> {
        self.inner.modify_count.fetch_add(1, Ordering::SeqCst);

        let mut entries = self.inner.entries.write();
        let entry = entries
            .iter_mut()
            .find(|e| e.has_dn(&request.dn))
            .ok_or_else(|| DirectoryError::no_such_entry(&request.dn))?;

        // Apply to a copy so a failing change leaves the entry untouched.
        let mut attributes = entry.attributes.clone();
        for change in &request.changes {
            match change {
                Modification::Add { attribute, values } => {
                    attributes.add(attribute, values.iter().cloned());
                },
                Modification::Delete { attribute, values } => {
                    let removed = if values.is_empty() {
                        attributes.remove(attribute)
                    } else {
                        attributes.remove_values(attribute, values)
                    };
                    if !removed {
                        return Err(DirectoryError::protocol(format!(
                            "noSuchAttribute: {attribute}"
                        )));
                    }
                },
                Modification::Replace { attribute, values } if values.is_empty() => {
                    attributes.remove(attribute);
                },
                Modification::Replace { attribute, values } => {
                    attributes.replace(attribute, values.iter().cloned());
                },
            }
        }
        entry.attributes = attributes;
        Ok(())
    }
}
