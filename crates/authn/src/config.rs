//! User cache configuration.
//!
//! [`UserCacheConfig`] is built either through its validating builder or by
//! deserializing a config file section:
//!
//! ```
//! use std::time::Duration;
//! use credbroker_authn::UserCacheConfig;
//!
//! let config = UserCacheConfig::builder()
//!     .base_dn("dc=example,dc=com")
//!     .role_attribute("roleAttribute")
//!     .timeout_attribute("timeoutAttribute")
//!     .refresh_interval(Duration::from_secs(300))
//!     .build()?;
//!
//! assert_eq!(config.username_attribute(), "cn");
//! assert_eq!(config.key_attribute(), "sshPublicKey");
//! # Ok::<(), credbroker_authn::AuthError>(())
//! ```
//!
//! The connection options (`use_tls`, `bind_dn`, `bind_password`) are not
//! used by the cache itself; they are handed to the directory connector via
//! [`UserCacheConfig::credentials`].

use std::{fmt, time::Duration};

use serde::Deserialize;
use zeroize::Zeroizing;

use crate::error::{AuthError, Result};

/// Default username attribute.
pub const DEFAULT_USERNAME_ATTRIBUTE: &str = "cn";

/// Default object class of entries carrying users and policy.
pub const DEFAULT_GROUP_OBJECT_CLASS: &str = "groupOfNames";

/// Default public key attribute.
pub const DEFAULT_KEY_ATTRIBUTE: &str = "sshPublicKey";

/// Default background refresh interval (10 minutes).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(600);

/// Configuration for [`UserCache`](crate::UserCache).
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserCacheConfig {
    /// Attribute holding the username.
    #[serde(default = "default_username_attribute")]
    pub(crate) username_attribute: String,

    /// Search base.
    pub(crate) base_dn: String,

    /// Whether the connector should use TLS.
    #[serde(default)]
    pub(crate) use_tls: bool,

    /// Attribute listing role identifiers. Empty disables it.
    #[serde(default)]
    pub(crate) role_attribute: Option<String>,

    /// DN to bind as.
    #[serde(default)]
    pub(crate) bind_dn: Option<String>,

    /// Bind password.
    #[serde(default)]
    pub(crate) bind_password: Option<Zeroizing<String>>,

    /// Object class selecting the entries to load.
    #[serde(default = "default_group_object_class")]
    pub(crate) group_object_class: String,

    /// Primary public key attribute.
    #[serde(default = "default_key_attribute")]
    pub(crate) key_attribute: String,

    /// Alternate public key attribute.
    #[serde(default)]
    pub(crate) alternate_key_attribute: Option<String>,

    /// Read keys from `alternate_key_attribute` instead of `key_attribute`.
    #[serde(default)]
    pub(crate) use_alternate_key_attribute: bool,

    /// Attribute holding the credential lifetime in seconds. Empty disables it.
    #[serde(default)]
    pub(crate) timeout_attribute: Option<String>,

    /// Background refresh interval.
    #[serde(with = "humantime_serde", default = "default_refresh_interval")]
    pub(crate) refresh_interval: Duration,
}

fn default_username_attribute() -> String {
    DEFAULT_USERNAME_ATTRIBUTE.to_owned()
}

fn default_group_object_class() -> String {
    DEFAULT_GROUP_OBJECT_CLASS.to_owned()
}

fn default_key_attribute() -> String {
    DEFAULT_KEY_ATTRIBUTE.to_owned()
}

fn default_refresh_interval() -> Duration {
    DEFAULT_REFRESH_INTERVAL
}

#[bon::bon]
impl UserCacheConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if:
    /// - `base_dn`, `username_attribute`, `group_object_class` or `key_attribute` is empty
    /// - `use_alternate_key_attribute` is set without a non-empty `alternate_key_attribute`
    /// - `refresh_interval` is zero
    #[builder]
    pub fn new(
        #[builder(into)] base_dn: String,
        #[builder(into, default = default_username_attribute())] username_attribute: String,
        #[builder(default)] use_tls: bool,
        #[builder(into)] role_attribute: Option<String>,
        #[builder(into)] bind_dn: Option<String>,
        #[builder(into)] bind_password: Option<Zeroizing<String>>,
        #[builder(into, default = default_group_object_class())] group_object_class: String,
        #[builder(into, default = default_key_attribute())] key_attribute: String,
        #[builder(into)] alternate_key_attribute: Option<String>,
        #[builder(default)] use_alternate_key_attribute: bool,
        #[builder(into)] timeout_attribute: Option<String>,
        #[builder(default = DEFAULT_REFRESH_INTERVAL)] refresh_interval: Duration,
    ) -> Result<Self> {
        let config = Self {
            username_attribute,
            base_dn,
            use_tls,
            role_attribute,
            bind_dn,
            bind_password,
            group_object_class,
            key_attribute,
            alternate_key_attribute,
            use_alternate_key_attribute,
            timeout_attribute,
            refresh_interval,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the builder enforces. Deserialized configs
    /// are validated when the cache is created.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("base_dn", &self.base_dn),
            ("username_attribute", &self.username_attribute),
            ("group_object_class", &self.group_object_class),
            ("key_attribute", &self.key_attribute),
        ] {
            if value.trim().is_empty() {
                return Err(AuthError::config(format!("{field} cannot be empty")));
            }
        }

        if self.use_alternate_key_attribute
            && self.alternate_key_attribute.as_deref().is_none_or(|a| a.trim().is_empty())
        {
            return Err(AuthError::config(
                "use_alternate_key_attribute requires a non-empty alternate_key_attribute",
            ));
        }

        if self.refresh_interval.is_zero() {
            return Err(AuthError::config("refresh_interval must be greater than zero"));
        }

        Ok(())
    }

    /// Search base.
    #[must_use]
    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    /// Attribute holding the username.
    #[must_use]
    pub fn username_attribute(&self) -> &str {
        &self.username_attribute
    }

    /// Object class selecting the entries to load.
    #[must_use]
    pub fn group_object_class(&self) -> &str {
        &self.group_object_class
    }

    /// The key attribute that is authoritative for this cache: the alternate
    /// attribute when selected, otherwise the primary one.
    #[must_use]
    pub fn key_attribute(&self) -> &str {
        match (&self.alternate_key_attribute, self.use_alternate_key_attribute) {
            (Some(alternate), true) => alternate,
            _ => &self.key_attribute,
        }
    }

    /// Role attribute, or `None` when unset or empty.
    #[must_use]
    pub fn role_attribute(&self) -> Option<&str> {
        self.role_attribute.as_deref().filter(|a| !a.is_empty())
    }

    /// Timeout attribute, or `None` when unset or empty.
    #[must_use]
    pub fn timeout_attribute(&self) -> Option<&str> {
        self.timeout_attribute.as_deref().filter(|a| !a.is_empty())
    }

    /// Background refresh interval.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// The options a directory connector needs to establish its session.
    #[must_use]
    pub fn credentials(&self) -> DirectoryCredentials {
        DirectoryCredentials {
            use_tls: self.use_tls,
            bind_dn: self.bind_dn.clone(),
            bind_password: self.bind_password.clone(),
        }
    }
}

impl fmt::Debug for UserCacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCacheConfig")
            .field("username_attribute", &self.username_attribute)
            .field("base_dn", &self.base_dn)
            .field("use_tls", &self.use_tls)
            .field("role_attribute", &self.role_attribute)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &self.bind_password.as_ref().map(|_| "[REDACTED]"))
            .field("group_object_class", &self.group_object_class)
            .field("key_attribute", &self.key_attribute)
            .field("alternate_key_attribute", &self.alternate_key_attribute)
            .field("use_alternate_key_attribute", &self.use_alternate_key_attribute)
            .field("timeout_attribute", &self.timeout_attribute)
            .field("refresh_interval", &self.refresh_interval)
            .finish()
    }
}

/// Session options passed through to a directory connector.
#[derive(Clone, Default)]
pub struct DirectoryCredentials {
    /// Whether to use TLS.
    pub use_tls: bool,
    /// DN to bind as; anonymous when `None`.
    pub bind_dn: Option<String>,
    /// Bind password, zeroed on drop.
    pub bind_password: Option<Zeroizing<String>>,
}

impl fmt::Debug for DirectoryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryCredentials")
            .field("use_tls", &self.use_tls)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &self.bind_password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
