//! Shared test utilities for directory-backed tests.
//!
//! Feature-gated behind `testutil` so fixtures never leak into production
//! builds. Enable it from dependent crates' `[dev-dependencies]`:
//!
//! ```toml
//! [dev-dependencies]
//! credbroker-directory = { path = "../directory", features = ["testutil"] }
//! ```

use crate::entry::Entry;

/// Base DN used by the fixtures.
pub const TEST_BASE_DN: &str = "dc=testdn,dc=com";

/// Object class the fixtures put on every account entry.
pub const TEST_OBJECT_CLASS: &str = "groupOfNames";

/// Returns the DN the fixtures use for an account entry.
///
/// `rdn` distinguishes entries that share a login name.
#[must_use]
pub fn account_dn(rdn: &str) -> String {
    format!("cn={rdn},ou=people,{TEST_BASE_DN}")
}

/// Creates an account entry under [`TEST_BASE_DN`] with the given login name
/// in `cn` and the [`TEST_OBJECT_CLASS`] object class.
///
/// The DN's RDN is the login name; use [`account_entry_with_rdn`] when several
/// entries must share one login name.
#[must_use]
pub fn account_entry(username: &str) -> Entry {
    account_entry_with_rdn(username, username)
}

/// Creates an account entry whose DN uses `rdn` while `cn` holds `username`.
#[must_use]
pub fn account_entry_with_rdn(rdn: &str, username: &str) -> Entry {
    Entry::new(account_dn(rdn))
        .with_attribute("objectClass", ["top", TEST_OBJECT_CLASS])
        .with_attribute("cn", [username])
}

/// Asserts that a [`DirectoryResult`](crate::DirectoryResult) is an `Err`
/// matching the given [`DirectoryError`](crate::DirectoryError) variant.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use credbroker_directory::{assert_directory_error, DirectoryError, DirectoryResult};
///
/// let result: DirectoryResult<()> = Err(DirectoryError::timeout());
/// assert_directory_error!(result, Timeout);
/// ```
#[macro_export]
macro_rules! assert_directory_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::DirectoryError::$variant { .. })),
            "expected DirectoryError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DirectoryError, DirectoryResult};

    #[test]
    fn test_account_entry_shape() {
        let entry = account_entry_with_rdn("alice-ops", "alice");

        assert_eq!(entry.dn, "cn=alice-ops,ou=people,dc=testdn,dc=com");
        assert_eq!(entry.get("cn").first(), Some("alice"));
        assert!(entry.is_within(TEST_BASE_DN));
    }

    #[test]
    fn test_assert_directory_error_macro() {
        let result: DirectoryResult<()> = Err(DirectoryError::connection("down"));
        assert_directory_error!(result, Connection);
    }
}
