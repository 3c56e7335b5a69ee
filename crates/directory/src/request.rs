//! Search and modify requests.

use std::fmt;

use crate::entry::Entry;

/// A search filter.
///
/// Only the filter shapes the user cache needs are modelled. [`fmt::Display`]
/// renders the RFC 4515 string form for connectors that speak the wire
/// protocol; [`SearchFilter::matches`] evaluates the filter locally for the
/// in-memory directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFilter {
    /// `(objectClass=<class>)`
    ObjectClass(String),
    /// `(<attribute>=*)`
    Present(String),
    /// `(<attribute>=<value>)`
    Equality {
        /// Attribute name.
        attribute: String,
        /// Value to compare against, case-insensitively.
        value: String,
    },
    /// `(&<filter>...)`
    And(Vec<SearchFilter>),
}

impl SearchFilter {
    /// Evaluates the filter against an entry.
    ///
    /// Values compare ASCII case-insensitively, matching the default equality
    /// rule for the attributes the cache filters on.
    #[must_use]
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Self::ObjectClass(class) => has_value(entry, "objectClass", class),
            Self::Present(attribute) => !entry.get(attribute).as_slice().is_empty(),
            Self::Equality { attribute, value } => has_value(entry, attribute, value),
            Self::And(filters) => filters.iter().all(|f| f.matches(entry)),
        }
    }
}

fn has_value(entry: &Entry, attribute: &str, value: &str) -> bool {
    entry.get(attribute).as_slice().iter().any(|v| v.eq_ignore_ascii_case(value))
}

impl fmt::Display for SearchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectClass(class) => write!(f, "(objectClass={})", escape(class)),
            Self::Present(attribute) => write!(f, "({attribute}=*)"),
            Self::Equality { attribute, value } => write!(f, "({attribute}={})", escape(value)),
            Self::And(filters) => {
                f.write_str("(&")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            },
        }
    }
}

/// Escapes the characters RFC 4515 reserves inside assertion values.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\\' => out.push_str("\\5c"),
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }
    out
}

/// A subtree search.
///
/// # Example
///
/// ```
/// use credbroker_directory::{SearchFilter, SearchRequest};
///
/// let request = SearchRequest::builder()
///     .base_dn("dc=example,dc=com")
///     .filter(SearchFilter::ObjectClass("groupOfNames".into()))
///     .attributes(vec!["cn".into(), "sshPublicKey".into()])
///     .build();
///
/// assert_eq!(request.filter.to_string(), "(objectClass=groupOfNames)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct SearchRequest {
    /// Base of the subtree to search.
    #[builder(into)]
    pub base_dn: String,
    /// Entries must match this filter.
    pub filter: SearchFilter,
    /// Attributes to return. Empty means all attributes.
    #[builder(default)]
    pub attributes: Vec<String>,
}

/// A single change within a [`ModifyRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    /// Append values to an attribute.
    Add {
        /// Attribute name.
        attribute: String,
        /// Values to add.
        values: Vec<String>,
    },
    /// Remove the listed values, or the whole attribute when `values` is empty.
    Delete {
        /// Attribute name.
        attribute: String,
        /// Values to remove.
        values: Vec<String>,
    },
    /// Replace all values of an attribute.
    Replace {
        /// Attribute name.
        attribute: String,
        /// New values.
        values: Vec<String>,
    },
}

/// A modify operation against one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyRequest {
    /// Entry to modify.
    pub dn: String,
    /// Changes, applied in order.
    pub changes: Vec<Modification>,
}

impl ModifyRequest {
    /// Creates an empty modify request for `dn`.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self { dn: dn.into(), changes: Vec::new() }
    }

    /// Adds values to an attribute.
    #[must_use]
    pub fn add(mut self, attribute: impl Into<String>, values: Vec<String>) -> Self {
        self.changes.push(Modification::Add { attribute: attribute.into(), values });
        self
    }

    /// Deletes values (or the whole attribute, if `values` is empty).
    #[must_use]
    pub fn delete(mut self, attribute: impl Into<String>, values: Vec<String>) -> Self {
        self.changes.push(Modification::Delete { attribute: attribute.into(), values });
        self
    }

    /// Replaces all values of an attribute.
    #[must_use]
    pub fn replace(mut self, attribute: impl Into<String>, values: Vec<String>) -> Self {
        self.changes.push(Modification::Replace { attribute: attribute.into(), values });
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn person() -> Entry {
        Entry::new("cn=alice,dc=example,dc=com")
            .with_attribute("objectClass", ["top", "groupOfNames"])
            .with_attribute("cn", ["alice"])
    }

    #[test]
    fn test_filter_display() {
        let filter = SearchFilter::And(vec![
            SearchFilter::ObjectClass("groupOfNames".into()),
            SearchFilter::Present("sshPublicKey".into()),
            SearchFilter::Equality { attribute: "cn".into(), value: "a*(b)".into() },
        ]);

        assert_eq!(
            filter.to_string(),
            "(&(objectClass=groupOfNames)(sshPublicKey=*)(cn=a\\2a\\28b\\29))"
        );
    }

    #[test]
    fn test_filter_matches() {
        let entry = person();

        assert!(SearchFilter::ObjectClass("GROUPOFNAMES".into()).matches(&entry));
        assert!(!SearchFilter::ObjectClass("posixAccount".into()).matches(&entry));
        assert!(SearchFilter::Present("cn".into()).matches(&entry));
        assert!(!SearchFilter::Present("sshPublicKey".into()).matches(&entry));
        assert!(
            SearchFilter::Equality { attribute: "cn".into(), value: "Alice".into() }
                .matches(&entry)
        );
        assert!(
            !SearchFilter::And(vec![
                SearchFilter::ObjectClass("groupOfNames".into()),
                SearchFilter::Present("mail".into()),
            ])
            .matches(&entry)
        );
    }

    #[test]
    fn test_search_request_builder_defaults() {
        let request = SearchRequest::builder()
            .base_dn("dc=example,dc=com")
            .filter(SearchFilter::ObjectClass("groupOfNames".into()))
            .build();

        assert!(request.attributes.is_empty());
        assert_eq!(request.base_dn, "dc=example,dc=com");
    }

    #[test]
    fn test_modify_request_preserves_change_order() {
        let request = ModifyRequest::new("cn=alice,dc=example,dc=com")
            .delete("sshPublicKey", vec!["k1".into()])
            .add("sshPublicKey", vec!["k2".into()])
            .replace("timeoutAttribute", vec!["7200".into()]);

        assert_eq!(request.changes.len(), 3);
        assert!(matches!(&request.changes[0], Modification::Delete { values, .. } if values == &["k1"]));
        assert!(matches!(&request.changes[2], Modification::Replace { attribute, .. } if attribute == "timeoutAttribute"));
    }
}
