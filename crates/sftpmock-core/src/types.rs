//! Strong domain types for sftpmock.
//!
//! A declared hostname becomes a [`HostKey`]; a running server for it is
//! described by a [`ServerBinding`].
//!
//! # Examples
//!
//! ```
//! use sftpmock_core::HostKey;
//!
//! let any_port = HostKey::parse("test.com").unwrap();
//! assert_eq!(any_port.host(), "test.com");
//! assert_eq!(any_port.port(), None);
//!
//! let pinned = HostKey::parse("test.com:2222").unwrap();
//! assert_eq!(pinned.port(), Some(2222));
//! ```

use crate::error::{Error, Result};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// A declared hostname, optionally pinned to a port.
///
/// A key without a port matches every connection to that host; a key with
/// a port matches only connections to that port. Hostnames are compared
/// case-sensitively, exactly as written in the declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostKey {
    host: String,
    port: Option<u16>,
}

impl HostKey {
    /// Creates a key for `host` on any port.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
        }
    }

    /// Creates a key for `host` pinned to `port`.
    #[must_use]
    pub fn with_port(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port: Some(port),
        }
    }

    /// Parses a declared key: `host`, `host:port`, `[v6]` or `[v6]:port`.
    ///
    /// A bare IPv6 literal (more than one `:`) is taken as a host without
    /// a port.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDeclaration` if the key is empty, the port is
    /// not a valid `u16`, or brackets are unbalanced.
    ///
    /// # Examples
    ///
    /// ```
    /// use sftpmock_core::HostKey;
    ///
    /// let key = HostKey::parse("[2001:db8::1]:22").unwrap();
    /// assert_eq!(key.host(), "2001:db8::1");
    /// assert_eq!(key.port(), Some(22));
    ///
    /// assert!(HostKey::parse("test.com:notaport").is_err());
    /// ```
    pub fn parse(key: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidDeclaration {
            path: key.to_string(),
            reason: reason.to_string(),
        };

        if key.is_empty() {
            return Err(invalid("hostname cannot be empty"));
        }

        if let Some(rest) = key.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unterminated '[' in hostname"))?;
            if host.is_empty() {
                return Err(invalid("hostname cannot be empty"));
            }
            return match tail {
                "" => Ok(Self::new(host)),
                _ => {
                    let port = tail
                        .strip_prefix(':')
                        .and_then(|p| p.parse::<u16>().ok())
                        .ok_or_else(|| invalid("port must be a number between 0 and 65535"))?;
                    Ok(Self::with_port(host, port))
                }
            };
        }

        match key.split_once(':') {
            Some((host, port)) if !port.contains(':') => {
                if host.is_empty() {
                    return Err(invalid("hostname cannot be empty"));
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|_| invalid("port must be a number between 0 and 65535"))?;
                Ok(Self::with_port(host, port))
            }
            _ => Ok(Self::new(key)),
        }
    }

    /// Returns the hostname.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the pinned port, if any.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// Returns `true` if this key names a loopback or unspecified address.
    #[must_use]
    pub fn is_loopback(&self) -> bool {
        is_loopback_host(&self.host)
    }

    /// Rejects hostnames that must never be intercepted.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedHost` for `localhost`, `*.localhost`,
    /// loopback and unspecified IP literals.
    pub fn ensure_mockable(&self) -> Result<()> {
        if self.is_loopback() {
            return Err(Error::UnsupportedHost {
                host: self.host.clone(),
                reason: "loopback destinations are never intercepted".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bracket = self.host.contains(':');
        match (self.port, bracket) {
            (None, _) => f.write_str(&self.host),
            (Some(port), true) => write!(f, "[{}]:{port}", self.host),
            (Some(port), false) => write!(f, "{}:{port}", self.host),
        }
    }
}

/// Returns `true` if `host` is `localhost`, a `.localhost` name, or a
/// loopback/unspecified IP literal.
///
/// # Examples
///
/// ```
/// use sftpmock_core::is_loopback_host;
///
/// assert!(is_loopback_host("localhost"));
/// assert!(is_loopback_host("127.0.0.1"));
/// assert!(is_loopback_host("::1"));
/// assert!(!is_loopback_host("test.com"));
/// ```
#[must_use]
pub fn is_loopback_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    // fully qualified form, e.g. `localhost.`
    let name = host.strip_suffix('.').unwrap_or(host);
    if name.eq_ignore_ascii_case("localhost")
        || name.to_ascii_lowercase().ends_with(".localhost")
    {
        return true;
    }
    host.parse::<IpAddr>()
        .map(|ip| ip.to_canonical())
        .is_ok_and(|ip| ip.is_loopback() || ip.is_unspecified())
}

/// The runtime association between a declared host and its mock server.
///
/// Created when a scope starts the server and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerBinding {
    key: HostKey,
    addr: SocketAddr,
}

impl ServerBinding {
    /// Creates a binding for `key` served at `addr`.
    #[must_use]
    pub const fn new(key: HostKey, addr: SocketAddr) -> Self {
        Self { key, addr }
    }

    /// Returns the declared key.
    #[must_use]
    pub const fn key(&self) -> &HostKey {
        &self.key
    }

    /// Returns the declared hostname.
    #[must_use]
    pub fn host(&self) -> &str {
        self.key.host()
    }

    /// Returns the local address the mock server listens on.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the local port the mock server listens on.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.addr.port()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_host() {
        let key = HostKey::parse("test.com.br").unwrap();
        assert_eq!(key.host(), "test.com.br");
        assert_eq!(key.port(), None);
        assert_eq!(key.to_string(), "test.com.br");
    }

    #[test]
    fn test_parse_host_with_port() {
        let key = HostKey::parse("test.com:2222").unwrap();
        assert_eq!(key, HostKey::with_port("test.com", 2222));
        assert_eq!(key.to_string(), "test.com:2222");
    }

    #[test]
    fn test_parse_ipv6() {
        let bare = HostKey::parse("2001:db8::1").unwrap();
        assert_eq!(bare.host(), "2001:db8::1");
        assert_eq!(bare.port(), None);

        let bracketed = HostKey::parse("[2001:db8::1]").unwrap();
        assert_eq!(bracketed, bare);

        let pinned = HostKey::parse("[2001:db8::1]:22").unwrap();
        assert_eq!(pinned.to_string(), "[2001:db8::1]:22");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(HostKey::parse("").unwrap_err().is_invalid_declaration());
        assert!(HostKey::parse(":22").is_err());
        assert!(HostKey::parse("test.com:99999").is_err());
        assert!(HostKey::parse("[::1").is_err());
        assert!(HostKey::parse("[::1]x").is_err());
    }

    #[test]
    fn test_hostnames_are_case_sensitive() {
        assert_ne!(HostKey::new("Test.com"), HostKey::new("test.com"));
    }

    #[test]
    fn test_loopback_detection() {
        for host in ["localhost", "LOCALHOST", "db.localhost", "127.0.0.1", "127.1.2.3", "::1", "[::1]", "0.0.0.0"] {
            assert!(is_loopback_host(host), "{host} should be loopback");
        }
        for host in ["localhost.", "db.localhost.", "::ffff:127.0.0.1", "[::ffff:127.0.0.1]", "::ffff:0.0.0.0"] {
            assert!(is_loopback_host(host), "{host} should be loopback");
        }
        for host in ["test.com", "test.com.", "10.0.0.1", "::ffff:10.0.0.1", "localhost.example.com", "2001:db8::1"] {
            assert!(!is_loopback_host(host), "{host} should not be loopback");
        }
    }

    #[test]
    fn test_ensure_mockable() {
        assert!(HostKey::new("test.com").ensure_mockable().is_ok());
        let err = HostKey::new("localhost").ensure_mockable().unwrap_err();
        assert!(err.is_unsupported_host());
        let err = HostKey::new("localhost.").ensure_mockable().unwrap_err();
        assert!(err.is_unsupported_host());
        let err = HostKey::parse("[::ffff:127.0.0.1]:22").unwrap().ensure_mockable().unwrap_err();
        assert!(err.is_unsupported_host());
    }

    #[test]
    fn test_server_binding_accessors() {
        let addr: SocketAddr = "127.0.0.1:40022".parse().unwrap();
        let binding = ServerBinding::new(HostKey::new("test.com"), addr);
        assert_eq!(binding.host(), "test.com");
        assert_eq!(binding.port(), 40022);
        assert_eq!(binding.local_addr(), addr);
    }
}
