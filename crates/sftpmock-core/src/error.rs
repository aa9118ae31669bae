//! Error types for sftpmock.
//!
//! This module provides the error hierarchy shared by every crate in the
//! workspace. Infrastructure errors (declaration, startup, scope) are raised
//! at scope entry; connection-time errors come from the interceptor and the
//! intercepted client.
//!
//! # Examples
//!
//! ```
//! use sftpmock_core::{Error, Result};
//!
//! fn check_host(host: &str) -> Result<()> {
//!     if host.is_empty() {
//!         return Err(Error::UnsupportedHost {
//!             host: host.to_string(),
//!             reason: "hostname cannot be empty".to_string(),
//!         });
//!     }
//!     Ok(())
//! }
//!
//! let err = check_host("").unwrap_err();
//! assert!(err.is_unsupported_host());
//! ```

use std::fmt;
use thiserror::Error;

/// Classification of an error status returned by an SFTP server.
///
/// Lets callers branch on the failure shape without depending on the
/// SFTP wire types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// The path does not exist (`SSH_FX_NO_SUCH_FILE`).
    NotFound,
    /// The server refused the operation (`SSH_FX_PERMISSION_DENIED`).
    PermissionDenied,
    /// Generic failure, e.g. reading a directory as a file (`SSH_FX_FAILURE`).
    Failure,
    /// The server does not implement the request (`SSH_FX_OP_UNSUPPORTED`).
    Unsupported,
    /// Any other status.
    Other,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::PermissionDenied => "permission denied",
            Self::Failure => "failure",
            Self::Unsupported => "unsupported",
            Self::Other => "error",
        };
        f.write_str(name)
    }
}

/// Main error type for sftpmock.
///
/// All fallible operations in the workspace return this type, except the
/// virtual filesystem, whose `FsError` is translated into SFTP status codes
/// on the wire instead of being raised locally.
#[derive(Error, Debug)]
pub enum Error {
    /// The host declaration is structurally malformed.
    ///
    /// Raised at scope entry, before any server is started.
    #[error("Invalid declaration at '{path}': {reason}")]
    InvalidDeclaration {
        /// Location of the offending entry, `host:/dir/file` style
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// A declared hostname cannot be mocked.
    ///
    /// Loopback names are never intercepted because a real local server may
    /// legitimately live there.
    #[error("Unsupported host '{host}': {reason}")]
    UnsupportedHost {
        /// The rejected hostname
        host: String,
        /// Why it cannot be mocked
        reason: String,
    },

    /// A mock server failed to bind or start.
    #[error("Failed to start mock server for '{host}'")]
    ServerStartFailure {
        /// Hostname the server was being started for
        host: String,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// A connection was attempted to a host with no mock while the scope
    /// runs in strict mode.
    #[error("Connection to unregistered host {host}:{port} rejected")]
    UnregisteredHost {
        /// Requested hostname
        host: String,
        /// Requested port
        port: u16,
    },

    /// Another mock scope is already active in this process.
    #[error("A mock scope is already active; nested or concurrent scopes are not supported")]
    ScopeAlreadyActive,

    /// Establishing the TCP/SSH connection failed.
    #[error("Connection to {host}:{port} failed")]
    ConnectionFailed {
        /// Requested hostname
        host: String,
        /// Requested port
        port: u16,
        /// Underlying cause
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The server rejected the supplied credentials.
    #[error("Authentication failed for user '{user}' on {host}")]
    AuthenticationFailed {
        /// User name that was offered
        user: String,
        /// Host the client connected to
        host: String,
    },

    /// The SFTP server answered a request with an error status.
    #[error("SFTP {operation} on '{path}' failed ({kind}): {message}")]
    Remote {
        /// Operation that failed (`read`, `list_dir`, ...)
        operation: String,
        /// Remote path the operation targeted
        path: String,
        /// Classified status
        kind: RemoteErrorKind,
        /// Message sent by the server
        message: String,
    },

    /// SSH or SFTP transport failure outside of a status response.
    #[error("Protocol error during {operation}")]
    Protocol {
        /// What was being done when the transport failed
        operation: String,
        /// Underlying cause
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration problem
        message: String,
    },
}

impl Error {
    /// Returns `true` if this is an invalid declaration error.
    ///
    /// # Examples
    ///
    /// ```
    /// use sftpmock_core::Error;
    ///
    /// let err = Error::InvalidDeclaration {
    ///     path: "test.com:/a".to_string(),
    ///     reason: "expected string or mapping, found number".to_string(),
    /// };
    /// assert!(err.is_invalid_declaration());
    /// ```
    #[must_use]
    pub const fn is_invalid_declaration(&self) -> bool {
        matches!(self, Self::InvalidDeclaration { .. })
    }

    /// Returns `true` if this is an unsupported host error.
    #[must_use]
    pub const fn is_unsupported_host(&self) -> bool {
        matches!(self, Self::UnsupportedHost { .. })
    }

    /// Returns `true` if a mock server failed to start.
    #[must_use]
    pub const fn is_server_start_failure(&self) -> bool {
        matches!(self, Self::ServerStartFailure { .. })
    }

    /// Returns `true` if a strict scope rejected an unregistered host.
    ///
    /// # Examples
    ///
    /// ```
    /// use sftpmock_core::Error;
    ///
    /// let err = Error::UnregisteredHost {
    ///     host: "real.example.com".to_string(),
    ///     port: 22,
    /// };
    /// assert!(err.is_unregistered_host());
    /// assert!(!err.is_connection_error());
    /// ```
    #[must_use]
    pub const fn is_unregistered_host(&self) -> bool {
        matches!(self, Self::UnregisteredHost { .. })
    }

    /// Returns `true` if entering a scope failed because one is active.
    #[must_use]
    pub const fn is_scope_already_active(&self) -> bool {
        matches!(self, Self::ScopeAlreadyActive)
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. })
    }

    /// Returns `true` if the server reported that a path does not exist.
    ///
    /// # Examples
    ///
    /// ```
    /// use sftpmock_core::{Error, RemoteErrorKind};
    ///
    /// let err = Error::Remote {
    ///     operation: "read".to_string(),
    ///     path: "/a_folder/missing.txt".to_string(),
    ///     kind: RemoteErrorKind::NotFound,
    ///     message: "No such file".to_string(),
    /// };
    /// assert!(err.is_not_found());
    /// ```
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Remote {
                kind: RemoteErrorKind::NotFound,
                ..
            }
        )
    }

    /// Returns `true` if the server denied the operation.
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            Self::Remote {
                kind: RemoteErrorKind::PermissionDenied,
                ..
            }
        )
    }

    /// Returns the remote status classification, if this is a remote error.
    #[must_use]
    pub const fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            Self::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns `true` if this is a configuration error.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigError { .. })
    }
}

/// Result type alias for sftpmock operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_declaration_detection() {
        let err = Error::InvalidDeclaration {
            path: "test.com:/a_folder/x".to_string(),
            reason: "expected string or mapping, found array".to_string(),
        };
        assert!(err.is_invalid_declaration());
        assert!(!err.is_unsupported_host());
        assert!(err.to_string().contains("test.com:/a_folder/x"));
    }

    #[test]
    fn test_server_start_failure_keeps_source() {
        let err = Error::ServerStartFailure {
            host: "test.com".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy"),
        };
        assert!(err.is_server_start_failure());
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "busy");
    }

    #[test]
    fn test_remote_kind_classification() {
        let err = Error::Remote {
            operation: "write".to_string(),
            path: "/x".to_string(),
            kind: RemoteErrorKind::PermissionDenied,
            message: "read-only".to_string(),
        };
        assert!(err.is_permission_denied());
        assert!(!err.is_not_found());
        assert_eq!(err.remote_kind(), Some(RemoteErrorKind::PermissionDenied));

        let other = Error::ScopeAlreadyActive;
        assert_eq!(other.remote_kind(), None);
        assert!(other.is_scope_already_active());
    }

    #[test]
    fn test_error_display() {
        let err = Error::UnregisteredHost {
            host: "real.example.com".to_string(),
            port: 2222,
        };
        assert_eq!(
            err.to_string(),
            "Connection to unregistered host real.example.com:2222 rejected"
        );

        let err = Error::Remote {
            operation: "read".to_string(),
            path: "/missing".to_string(),
            kind: RemoteErrorKind::NotFound,
            message: "No such file".to_string(),
        };
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_connection_error_detection() {
        let err = Error::ConnectionFailed {
            host: "test.com".to_string(),
            port: 22,
            source: "connection refused".into(),
        };
        assert!(err.is_connection_error());
        assert!(!err.is_unregistered_host());
    }
}
