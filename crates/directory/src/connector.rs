//! The directory connector abstraction.
//!
//! The wire protocol (bind, PDU encoding, TLS) lives behind this trait. The
//! user cache only needs search; modify is part of the contract because the
//! surrounding service writes through the same connection.
//!
//! # Usage
//!
//! ```no_run
//! use credbroker_directory::{DirectoryConnector, DirectoryResult, SearchFilter, SearchRequest};
//!
//! async fn count_groups<C: DirectoryConnector>(connector: &C) -> DirectoryResult<usize> {
//!     let request = SearchRequest::builder()
//!         .base_dn("dc=example,dc=com")
//!         .filter(SearchFilter::ObjectClass("groupOfNames".into()))
//!         .build();
//!     Ok(connector.search(&request).await?.len())
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    entry::Entry,
    error::DirectoryResult,
    request::{ModifyRequest, SearchRequest},
};

/// Access to a directory service.
///
/// # Timeouts
///
/// Implementations own their timeouts. A request that exceeds them must
/// resolve to [`DirectoryError::Timeout`](crate::DirectoryError::Timeout)
/// rather than hang, because callers do not wrap these futures in their own
/// deadline.
///
/// # Empty results
///
/// A search matching nothing returns `Ok(vec![])`; it is not an error.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Runs a subtree search and returns every matching entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is unreachable, times out, or
    /// rejects the request.
    async fn search(&self, request: &SearchRequest) -> DirectoryResult<Vec<Entry>>;

    /// Applies a modify operation to a single entry.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::NoSuchEntry`](crate::DirectoryError::NoSuchEntry)
    /// if the entry does not exist, or a transport error.
    async fn modify(&self, request: &ModifyRequest) -> DirectoryResult<()>;
}

#[async_trait]
impl<T: DirectoryConnector + ?Sized> DirectoryConnector for Arc<T> {
    async fn search(&self, request: &SearchRequest) -> DirectoryResult<Vec<Entry>> {
        (**self).search(request).await
    }

    async fn modify(&self, request: &ModifyRequest) -> DirectoryResult<()> {
        (**self).modify(request).await
    }
}
