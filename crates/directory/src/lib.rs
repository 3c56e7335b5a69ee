//! # credbroker directory
//!
//! Directory-service abstraction consumed by the credbroker user cache.
//!
//! This crate provides:
//! - **Data model**: [`Entry`] and [`Attributes`], with explicit absent/empty
//!   states via [`AttributeValues`]
//! - **Requests**: [`SearchRequest`], [`SearchFilter`], [`ModifyRequest`]
//! - **Connector trait**: [`DirectoryConnector`], the seam behind which the
//!   wire protocol lives
//! - **In-memory directory**: [`MemoryDirectory`] for tests and development
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │        credbroker-authn (UserCache)          │
//! ├──────────────────────────────────────────────┤
//! │      DirectoryConnector trait (search)       │
//! ├───────────────────┬──────────────────────────┤
//! │  MemoryDirectory  │  LDAP connector          │
//! │     (testing)     │  (provided by the host)  │
//! └───────────────────┴──────────────────────────┘
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with entry fixtures and the
//!   `assert_directory_error!` macro.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod connector;
pub mod entry;
pub mod error;
pub mod memory;
pub mod request;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;

pub use connector::DirectoryConnector;
pub use entry::{Attribute, AttributeValues, Attributes, Entry};
pub use error::{BoxError, DirectoryError, DirectoryResult};
pub use memory::MemoryDirectory;
pub use request::{Modification, ModifyRequest, SearchFilter, SearchRequest};
