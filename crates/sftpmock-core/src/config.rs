//! Configuration for mock scopes.
//!
//! Controls how unregistered hosts are treated, whether mock filesystems
//! accept writes, and the network and timing parameters of the mock
//! servers.
//!
//! # Examples
//!
//! ```
//! use sftpmock_core::{MockConfig, UnregisteredHostPolicy};
//! use std::time::Duration;
//!
//! // Use default configuration
//! let config = MockConfig::default();
//! assert_eq!(config.unregistered_hosts, UnregisteredHostPolicy::PassThrough);
//! assert!(config.writable);
//!
//! // Strict, read-only configuration
//! let strict = MockConfig {
//!     unregistered_hosts: UnregisteredHostPolicy::Reject,
//!     writable: false,
//!     ..Default::default()
//! };
//! assert!(strict.validate().is_ok());
//! ```

use crate::error::{Error, Result};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Environment variable that switches every scope to strict mode.
pub const ENV_STRICT: &str = "SFTPMOCK_STRICT";

/// Environment variable that makes every mock filesystem read-only.
pub const ENV_READ_ONLY: &str = "SFTPMOCK_READ_ONLY";

/// What the interceptor does with a connection to a host that has no mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnregisteredHostPolicy {
    /// Let the connection proceed to the real network unmodified.
    #[default]
    PassThrough,
    /// Fail fast with `Error::UnregisteredHost`.
    Reject,
}

/// Configuration for one mock scope.
///
/// # Examples
///
/// ```
/// use sftpmock_core::MockConfig;
/// use std::time::Duration;
///
/// let config = MockConfig {
///     inactivity_timeout: Some(Duration::from_secs(5)),
///     ..Default::default()
/// };
///
/// assert_eq!(config.inactivity_timeout, Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockConfig {
    /// Policy for connections to hosts that are not declared.
    ///
    /// Default: `PassThrough`
    pub unregistered_hosts: UnregisteredHostPolicy,

    /// Whether SFTP clients may create, modify, rename and delete entries.
    ///
    /// When disabled, every mutating request is answered with
    /// `SSH_FX_PERMISSION_DENIED`.
    /// Default: true
    pub writable: bool,

    /// Address the mock servers bind to. Must be a loopback address.
    ///
    /// Default: 127.0.0.1
    pub bind_address: IpAddr,

    /// SSH inactivity timeout for mock sessions.
    ///
    /// Default: 60 seconds
    pub inactivity_timeout: Option<Duration>,

    /// How long scope exit waits for each server worker to stop before
    /// logging a warning and detaching it.
    ///
    /// Default: 5 seconds
    pub shutdown_timeout: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            unregistered_hosts: UnregisteredHostPolicy::PassThrough,
            writable: true,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            inactivity_timeout: Some(Duration::from_secs(60)),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl MockConfig {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use sftpmock_core::{MockConfig, UnregisteredHostPolicy};
    ///
    /// let config = MockConfig::builder()
    ///     .strict(true)
    ///     .writable(false)
    ///     .build();
    ///
    /// assert_eq!(config.unregistered_hosts, UnregisteredHostPolicy::Reject);
    /// assert!(!config.writable);
    /// ```
    #[must_use]
    pub fn builder() -> MockConfigBuilder {
        MockConfigBuilder::new()
    }

    /// Returns the default configuration overlaid with environment flags.
    ///
    /// `SFTPMOCK_STRICT` and `SFTPMOCK_READ_ONLY` accept `1`, `true`, `yes`
    /// or `on` (case-insensitive); any other value leaves the default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`MockConfig::from_env`], reading variables through `lookup`.
    ///
    /// # Examples
    ///
    /// ```
    /// use sftpmock_core::{MockConfig, UnregisteredHostPolicy};
    ///
    /// let config = MockConfig::from_lookup(|name| {
    ///     (name == "SFTPMOCK_STRICT").then(|| "true".to_string())
    /// });
    /// assert_eq!(config.unregistered_hosts, UnregisteredHostPolicy::Reject);
    /// assert!(config.writable);
    /// ```
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| lookup(name).is_some_and(|value| is_truthy(&value));

        let mut config = Self::default();
        if flag(ENV_STRICT) {
            config.unregistered_hosts = UnregisteredHostPolicy::Reject;
        }
        if flag(ENV_READ_ONLY) {
            config.writable = false;
        }
        tracing::debug!(
            strict = config.unregistered_hosts == UnregisteredHostPolicy::Reject,
            writable = config.writable,
            "loaded mock configuration from environment"
        );
        config
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if:
    /// - The bind address is not a loopback address
    /// - The shutdown timeout is zero
    /// - The inactivity timeout is set to zero
    ///
    /// # Examples
    ///
    /// ```
    /// use sftpmock_core::MockConfig;
    ///
    /// let config = MockConfig::default();
    /// assert!(config.validate().is_ok());
    ///
    /// let mut invalid = MockConfig::default();
    /// invalid.bind_address = "0.0.0.0".parse().unwrap();
    /// assert!(invalid.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if !self.bind_address.is_loopback() {
            return Err(Error::ConfigError {
                message: format!(
                    "Mock servers must bind to a loopback address, got {}",
                    self.bind_address
                ),
            });
        }

        if self.shutdown_timeout.is_zero() {
            return Err(Error::ConfigError {
                message: "Shutdown timeout must be greater than zero".to_string(),
            });
        }

        if self.inactivity_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::ConfigError {
                message: "Inactivity timeout must be greater than zero when set".to_string(),
            });
        }

        Ok(())
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Builder for `MockConfig`.
///
/// # Examples
///
/// ```
/// use sftpmock_core::MockConfig;
/// use std::time::Duration;
///
/// let config = MockConfig::builder()
///     .shutdown_timeout(Duration::from_secs(1))
///     .inactivity_timeout(None)
///     .build();
///
/// assert_eq!(config.shutdown_timeout.as_secs(), 1);
/// assert!(config.inactivity_timeout.is_none());
/// ```
#[derive(Debug)]
pub struct MockConfigBuilder {
    config: MockConfig,
}

impl MockConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: MockConfig::default(),
        }
    }

    /// Sets the unregistered host policy.
    #[must_use]
    pub const fn unregistered_hosts(mut self, policy: UnregisteredHostPolicy) -> Self {
        self.config.unregistered_hosts = policy;
        self
    }

    /// Shorthand for `Reject` (`true`) or `PassThrough` (`false`).
    #[must_use]
    pub const fn strict(self, strict: bool) -> Self {
        self.unregistered_hosts(if strict {
            UnregisteredHostPolicy::Reject
        } else {
            UnregisteredHostPolicy::PassThrough
        })
    }

    /// Enables or disables writes through the mock servers.
    #[must_use]
    pub const fn writable(mut self, writable: bool) -> Self {
        self.config.writable = writable;
        self
    }

    /// Sets the bind address.
    #[must_use]
    pub const fn bind_address(mut self, address: IpAddr) -> Self {
        self.config.bind_address = address;
        self
    }

    /// Sets the SSH inactivity timeout.
    #[must_use]
    pub const fn inactivity_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.inactivity_timeout = timeout;
        self
    }

    /// Sets the shutdown timeout.
    #[must_use]
    pub const fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> MockConfig {
        self.config
    }
}

impl Default for MockConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
