//! Per-entry group policy: allowed role identifiers and credential lifetime.

use credbroker_directory::{AttributeValues, Entry};

/// Credential lifetime used when an entry has no usable timeout value.
pub const DEFAULT_TIMEOUT_SECS: i64 = 3600;

/// Access policy carried by one directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Role identifiers the entry's members may assume, in directory order.
    pub arns: Vec<String>,
    /// Credential lifetime in seconds. Always positive.
    pub timeout: i64,
}

impl Default for Group {
    fn default() -> Self {
        Self { arns: Vec::new(), timeout: DEFAULT_TIMEOUT_SECS }
    }
}

/// Why an entry's timeout fell back to [`DEFAULT_TIMEOUT_SECS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutFallback {
    /// The entry has no timeout attribute.
    Absent,
    /// The timeout attribute has no values.
    Empty,
    /// The first value is not a base-10 integer.
    Invalid(String),
    /// The first value parsed but is zero or negative.
    NonPositive(i64),
}

impl std::fmt::Display for TimeoutFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => f.write_str("attribute absent"),
            Self::Empty => f.write_str("attribute has no values"),
            Self::Invalid(value) => write!(f, "not an integer: {value:?}"),
            Self::NonPositive(value) => write!(f, "not positive: {value}"),
        }
    }
}

/// A resolved [`Group`] plus the reason its timeout was defaulted, if it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGroup {
    /// The entry's policy.
    pub group: Group,
    /// Set when the timeout came from [`DEFAULT_TIMEOUT_SECS`] because the
    /// entry's value was unusable.
    pub timeout_fallback: Option<TimeoutFallback>,
}

/// Converts directory entries into [`Group`]s.
#[derive(Debug, Clone, Default)]
pub struct GroupResolver {
    role_attribute: Option<String>,
    timeout_attribute: Option<String>,
}

impl GroupResolver {
    /// Creates a resolver. `None` or an empty name disables that attribute.
    #[must_use]
    pub fn new(role_attribute: Option<String>, timeout_attribute: Option<String>) -> Self {
        Self {
            role_attribute: role_attribute.filter(|a| !a.is_empty()),
            timeout_attribute: timeout_attribute.filter(|a| !a.is_empty()),
        }
    }

    /// The role attribute, if enabled.
    #[must_use]
    pub fn role_attribute(&self) -> Option<&str> {
        self.role_attribute.as_deref()
    }

    /// The timeout attribute, if enabled.
    #[must_use]
    pub fn timeout_attribute(&self) -> Option<&str> {
        self.timeout_attribute.as_deref()
    }

    /// Resolves an entry's policy. Never fails.
    #[must_use]
    pub fn resolve(&self, entry: &Entry) -> ResolvedGroup {
        let arns = self
            .role_attribute
            .as_deref()
            .map(|attr| entry.get(attr).as_slice().to_vec())
            .unwrap_or_default();

        let (timeout, timeout_fallback) = match self.timeout_attribute.as_deref() {
            None => (DEFAULT_TIMEOUT_SECS, None),
            Some(attr) => match parse_timeout(entry.get(attr)) {
                Ok(timeout) => (timeout, None),
                Err(reason) => (DEFAULT_TIMEOUT_SECS, Some(reason)),
            },
        };

        ResolvedGroup { group: Group { arns, timeout }, timeout_fallback }
    }
}

/// Parses the first value of a timeout attribute.
///
/// # Errors
///
/// Returns the [`TimeoutFallback`] reason when the value is missing, not a
/// base-10 integer, or not positive.
pub fn parse_timeout(values: AttributeValues<'_>) -> Result<i64, TimeoutFallback> {
    let raw = match values {
        AttributeValues::Absent => return Err(TimeoutFallback::Absent),
        AttributeValues::Empty => return Err(TimeoutFallback::Empty),
        AttributeValues::Values(values) => match values.first() {
            Some(raw) => raw,
            None => return Err(TimeoutFallback::Empty),
        },
    };
    match raw.trim().parse::<i64>() {
        Ok(timeout) if timeout > 0 => Ok(timeout),
        Ok(timeout) => Err(TimeoutFallback::NonPositive(timeout)),
        Err(_) => Err(TimeoutFallback::Invalid(raw.clone())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn resolver() -> GroupResolver {
        GroupResolver::new(Some("roleAttribute".into()), Some("timeoutAttribute".into()))
    }

    fn entry() -> Entry {
        Entry::new("cn=alice,ou=people,dc=testdn,dc=com").with_attribute("cn", ["alice"])
    }

    #[test]
    fn test_roles_in_directory_order() {
        let entry = entry()
            .with_attribute("roleAttribute", ["arn:aws:iam::1:role/b", "arn:aws:iam::1:role/a"])
            .with_attribute("timeoutAttribute", ["7200"]);

        let resolved = resolver().resolve(&entry);

        assert_eq!(resolved.group.arns, ["arn:aws:iam::1:role/b", "arn:aws:iam::1:role/a"]);
        assert_eq!(resolved.group.timeout, 7200);
        assert_eq!(resolved.timeout_fallback, None);
    }

    #[test]
    fn test_missing_roles_is_legal() {
        let resolved = resolver().resolve(&entry());

        assert!(resolved.group.arns.is_empty());
        assert_eq!(resolved.group.timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(resolved.timeout_fallback, Some(TimeoutFallback::Absent));
    }

    #[rstest]
    #[case::not_an_integer(&["not_an_integer"], DEFAULT_TIMEOUT_SECS, Some(TimeoutFallback::Invalid("not_an_integer".into())))]
    #[case::zero(&["0"], DEFAULT_TIMEOUT_SECS, Some(TimeoutFallback::NonPositive(0)))]
    #[case::negative(&["-30"], DEFAULT_TIMEOUT_SECS, Some(TimeoutFallback::NonPositive(-30)))]
    #[case::float(&["1.5"], DEFAULT_TIMEOUT_SECS, Some(TimeoutFallback::Invalid("1.5".into())))]
    #[case::padded(&[" 900 "], 900, None)]
    #[case::first_value_wins(&["60", "7200"], 60, None)]
    #[case::empty(&[], DEFAULT_TIMEOUT_SECS, Some(TimeoutFallback::Empty))]
    fn test_timeout_values(
        #[case] values: &[&str],
        #[case] expected: i64,
        #[case] fallback: Option<TimeoutFallback>,
    ) {
        let entry = entry().with_attribute("timeoutAttribute", values.iter().copied());

        let resolved = resolver().resolve(&entry);

        assert_eq!(resolved.group.timeout, expected);
        assert_eq!(resolved.timeout_fallback, fallback);
    }

    #[test]
    fn test_disabled_attributes() {
        let entry = entry()
            .with_attribute("roleAttribute", ["arn:aws:iam::1:role/a"])
            .with_attribute("timeoutAttribute", ["not_an_integer"]);

        let resolved = GroupResolver::new(Some(String::new()), None).resolve(&entry);

        assert!(resolved.group.arns.is_empty());
        assert_eq!(resolved.group.timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(resolved.timeout_fallback, None);
    }

    #[test]
    fn test_duplicate_roles_kept() {
        let entry = entry().with_attribute("roleAttribute", ["r", "r"]);
        assert_eq!(resolver().resolve(&entry).group.arns, ["r", "r"]);
    }
}
