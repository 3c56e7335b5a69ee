//! Directory entries and their multi-valued attributes.
//!
//! Directory data is free-form: any entry may carry any attribute, with zero
//! or more string values each. [`Attributes`] keeps that shape but makes the
//! "attribute missing" and "attribute present without values" cases explicit
//! through [`AttributeValues`], so callers never get an implicit default.
//!
//! Attribute names compare ASCII case-insensitively, as they do on the wire.

use std::fmt;

/// The outcome of looking up an attribute on an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeValues<'a> {
    /// The entry does not carry the attribute at all.
    Absent,
    /// The attribute is present but has no values.
    Empty,
    /// The attribute's values, in the order the directory returned them.
    Values(&'a [String]),
}

impl<'a> AttributeValues<'a> {
    /// Returns the values, treating absent and empty alike.
    #[must_use]
    pub fn as_slice(&self) -> &'a [String] {
        match self {
            Self::Values(values) => values,
            Self::Absent | Self::Empty => &[],
        }
    }

    /// Returns the first value, if any.
    #[must_use]
    pub fn first(&self) -> Option<&'a str> {
        self.as_slice().first().map(String::as_str)
    }

    /// Returns `true` if the attribute is absent from the entry.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// One named, multi-valued attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name as returned by the directory.
    pub name: String,
    /// Values in directory order.
    pub values: Vec<String>,
}

/// The attribute set of an entry.
///
/// Preserves the order attributes were added in. Adding values under a name
/// that already exists (in any letter case) appends to that attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    inner: Vec<Attribute>,
}

impl Attributes {
    /// Creates an empty attribute set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn get(&self, name: &str) -> AttributeValues<'_> {
        match self.position(name) {
            None => AttributeValues::Absent,
            Some(idx) if self.inner[idx].values.is_empty() => AttributeValues::Empty,
            Some(idx) => AttributeValues::Values(&self.inner[idx].values),
        }
    }

    /// Appends values to the named attribute, creating it if needed.
    pub fn add<I, V>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let values = values.into_iter().map(Into::into);
        match self.position(name) {
            Some(idx) => self.inner[idx].values.extend(values),
            None => self.inner.push(Attribute { name: name.to_owned(), values: values.collect() }),
        }
    }

    /// Replaces all values of the named attribute, creating it if needed.
    pub fn replace<I, V>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        match self.position(name) {
            Some(idx) => self.inner[idx].values = values,
            None => self.inner.push(Attribute { name: name.to_owned(), values }),
        }
    }

    /// Removes specific values from the named attribute.
    ///
    /// The attribute itself is dropped once its last value is removed.
    /// Returns `false` if the attribute was not present.
    pub fn remove_values(&mut self, name: &str, values: &[String]) -> bool {
        let Some(idx) = self.position(name) else {
            return false;
        };
        self.inner[idx].values.retain(|v| !values.contains(v));
        if self.inner[idx].values.is_empty() {
            self.inner.remove(idx);
        }
        true
    }

    /// Removes the named attribute entirely. Returns `false` if it was absent.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(idx) => {
                self.inner.remove(idx);
                true
            },
            None => false,
        }
    }

    /// Keeps only the listed attributes. An empty list keeps everything.
    pub fn retain_only(&mut self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        self.inner.retain(|attr| names.iter().any(|n| n.eq_ignore_ascii_case(&attr.name)));
    }

    /// Iterates over the attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.inner.iter()
    }

    /// Number of distinct attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.inner.iter().position(|attr| attr.name.eq_ignore_ascii_case(name))
    }
}

/// One directory record: a distinguished name and its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Distinguished name identifying the entry.
    pub dn: String,
    /// The entry's attributes.
    pub attributes: Attributes,
}

impl Entry {
    /// Creates an entry with no attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self { dn: dn.into(), attributes: Attributes::new() }
    }

    /// Builder-style helper adding values to an attribute.
    #[must_use]
    pub fn with_attribute<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes.add(name, values);
        self
    }

    /// Shorthand for `self.attributes.get(name)`.
    #[must_use]
    pub fn get(&self, name: &str) -> AttributeValues<'_> {
        self.attributes.get(name)
    }

    /// Returns `true` if this entry is named by `dn`.
    ///
    /// Uses the same normalization as [`Entry::is_within`].
    #[must_use]
    pub fn has_dn(&self, dn: &str) -> bool {
        normalize_dn(&self.dn) == normalize_dn(dn)
    }

    /// Returns `true` if this entry lies at or below `base_dn`.
    ///
    /// Comparison ignores ASCII case and whitespace around RDN separators.
    /// An empty base matches every entry.
    #[must_use]
    pub fn is_within(&self, base_dn: &str) -> bool {
        let base = normalize_dn(base_dn);
        if base.is_empty() {
            return true;
        }
        let dn = normalize_dn(&self.dn);
        dn == base || dn.ends_with(&format!(",{base}"))
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dn)
    }
}

fn normalize_dn(dn: &str) -> String {
    dn.split(',').map(|rdn| rdn.trim().to_ascii_lowercase()).collect::<Vec<_>>().join(",")
}
