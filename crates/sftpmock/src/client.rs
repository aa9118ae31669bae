//! SFTP client whose connections go through the interceptor.
//!
//! [`SftpClient::connect`] is the connection constructor the interceptor
//! hooks: it resolves the requested host, so inside a mock scope a
//! declared hostname lands on its local mock server without the caller
//! knowing the port.

use crate::interceptor::{self, Destination, Resolution};
use russh::client;
use russh_sftp::client::SftpSession;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::protocol::{OpenFlags, StatusCode};
use sftpmock_core::{Error, RemoteErrorKind, Result};
use sftpmock_vfs::{Metadata, NodeKind};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

const DEFAULT_PORT: u16 = 22;
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);

/// Where and as whom to connect.
///
/// # Examples
///
/// ```
/// use sftpmock::ConnectOptions;
///
/// let options = ConnectOptions::new("test.com")
///     .with_port(2222)
///     .with_credentials("alice", "secret");
///
/// assert_eq!(options.port, 2222);
/// assert_eq!(options.username, "alice");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Hostname to connect to
    pub host: String,
    /// Port to connect to (default 22)
    pub port: u16,
    /// User name for password authentication
    pub username: String,
    /// Password for password authentication
    pub password: String,
}

impl ConnectOptions {
    /// Creates options for `host` on port 22 with placeholder credentials.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: "user".to_string(),
            password: "password".to_string(),
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the user name and password.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug)]
struct AcceptAnyHostKey;

impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// An open SFTP session.
pub struct SftpClient {
    sftp: SftpSession,
    session: client::Handle<AcceptAnyHostKey>,
    resolution: Resolution,
    peer: SocketAddr,
}

impl fmt::Debug for SftpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpClient")
            .field("resolution", &self.resolution)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl SftpClient {
    /// Connects, authenticates by password and opens the `sftp` subsystem.
    ///
    /// # Errors
    ///
    /// - Resolver errors, e.g. `Error::UnregisteredHost` in strict mode
    /// - `Error::ConnectionFailed` if TCP or the SSH handshake fails
    /// - `Error::AuthenticationFailed` if the password is refused
    /// - `Error::Protocol` if the subsystem cannot be opened
    pub async fn connect(options: &ConnectOptions) -> Result<Self> {
        let destination = Destination::host(&options.host, options.port);
        let (stream, resolution) = interceptor::connect_tcp(&destination).await?;
        let connection_failed = |source: Box<dyn std::error::Error + Send + Sync>| {
            Error::ConnectionFailed {
                host: options.host.clone(),
                port: options.port,
                source,
            }
        };
        let peer = stream
            .peer_addr()
            .map_err(|e| connection_failed(Box::new(e)))?;

        let config = Arc::new(client::Config {
            inactivity_timeout: Some(INACTIVITY_TIMEOUT),
            ..Default::default()
        });
        let mut session = client::connect_stream(config, stream, AcceptAnyHostKey)
            .await
            .map_err(|e| connection_failed(Box::new(e)))?;

        let auth = session
            .authenticate_password(&options.username, &options.password)
            .await
            .map_err(|e| protocol("authenticate", e))?;
        if !auth.success() {
            return Err(Error::AuthenticationFailed {
                user: options.username.clone(),
                host: options.host.clone(),
            });
        }

        let channel = session
            .channel_open_session()
            .await
            .map_err(|e| protocol("open channel", e))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| protocol("request sftp subsystem", e))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| protocol("sftp init", e))?;

        debug!(
            destination = %destination,
            peer = %peer,
            redirected = resolution.is_redirected(),
            "sftp session opened"
        );
        Ok(Self {
            sftp,
            session,
            resolution,
            peer,
        })
    }

    /// Returns the address actually connected to. After a redirect this is
    /// the mock server, not the requested host.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Returns `true` if the connection went to a mock server.
    #[must_use]
    pub const fn redirected(&self) -> bool {
        self.resolution.is_redirected()
    }

    /// Returns how the requested destination was resolved.
    #[must_use]
    pub const fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// Lists the entry names of a directory, sorted.
    ///
    /// # Errors
    ///
    /// Returns `Error::Remote` if the server refuses the listing.
    pub async fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let entries = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| remote("list_dir", path, e))?;
        let mut names: Vec<String> = entries
            .map(|entry| entry.file_name())
            .filter(|name| name != "." && name != "..")
            .collect();
        names.sort();
        Ok(names)
    }

    /// Reads a whole file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Remote` with `RemoteErrorKind::NotFound` for a
    /// missing path.
    pub async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let mut file = self
            .sftp
            .open(path)
            .await
            .map_err(|e| remote("read", path, e))?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .await
            .map_err(|e| io_error("read", e))?;
        Ok(content)
    }

    /// Creates or replaces a file with `data`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Remote` if the server refuses the upload, e.g. with
    /// `RemoteErrorKind::PermissionDenied` on a read-only mock.
    pub async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut file = self
            .sftp
            .open_with_flags(
                path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await
            .map_err(|e| remote("write", path, e))?;
        file.write_all(data)
            .await
            .map_err(|e| io_error("write", e))?;
        file.shutdown().await.map_err(|e| io_error("close", e))?;
        Ok(())
    }

    /// Creates a directory.
    ///
    /// # Errors
    ///
    /// Returns `Error::Remote` if the server refuses.
    pub async fn create_dir(&self, path: &str) -> Result<()> {
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| remote("create_dir", path, e))
    }

    /// Removes a file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Remote` if the server refuses.
    pub async fn remove_file(&self, path: &str) -> Result<()> {
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| remote("remove_file", path, e))
    }

    /// Removes an empty directory.
    ///
    /// # Errors
    ///
    /// Returns `Error::Remote` if the server refuses.
    pub async fn remove_dir(&self, path: &str) -> Result<()> {
        self.sftp
            .remove_dir(path)
            .await
            .map_err(|e| remote("remove_dir", path, e))
    }

    /// Renames or moves an entry.
    ///
    /// # Errors
    ///
    /// Returns `Error::Remote` if the server refuses.
    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.sftp
            .rename(from, to)
            .await
            .map_err(|e| remote("rename", from, e))
    }

    /// Returns the kind and size of an entry.
    ///
    /// # Errors
    ///
    /// Returns `Error::Remote` if the path does not exist.
    pub async fn metadata(&self, path: &str) -> Result<Metadata> {
        let attrs = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| remote("metadata", path, e))?;
        Ok(Metadata {
            kind: if attrs.is_dir() {
                NodeKind::Directory
            } else {
                NodeKind::File
            },
            size: attrs.size.unwrap_or(0),
        })
    }

    /// Returns `true` if an entry exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns errors other than "not found".
    pub async fn exists(&self, path: &str) -> Result<bool> {
        match self.metadata(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Asks the server for the absolute form of `path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Remote` if the server refuses.
    pub async fn canonicalize(&self, path: &str) -> Result<String> {
        self.sftp
            .canonicalize(path)
            .await
            .map_err(|e| remote("canonicalize", path, e))
    }

    /// Closes the SFTP session and disconnects.
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` if the session cannot be closed cleanly.
    pub async fn close(self) -> Result<()> {
        self.sftp.close().await.map_err(|e| protocol("close", e))?;
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| protocol("disconnect", e))
    }
}

fn remote_kind(code: StatusCode) -> RemoteErrorKind {
    match code {
        StatusCode::NoSuchFile => RemoteErrorKind::NotFound,
        StatusCode::PermissionDenied => RemoteErrorKind::PermissionDenied,
        StatusCode::Failure => RemoteErrorKind::Failure,
        StatusCode::OpUnsupported => RemoteErrorKind::Unsupported,
        _ => RemoteErrorKind::Other,
    }
}

fn remote(operation: &str, path: &str, error: SftpError) -> Error {
    match error {
        SftpError::Status(status) => Error::Remote {
            operation: operation.to_string(),
            path: path.to_string(),
            kind: remote_kind(status.status_code),
            message: status.error_message,
        },
        other => protocol(operation, other),
    }
}

fn protocol(operation: &str, error: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::Protocol {
        operation: operation.to_string(),
        source: Box::new(error),
    }
}

fn io_error(operation: &str, error: std::io::Error) -> Error {
    protocol(operation, error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(remote_kind(StatusCode::NoSuchFile), RemoteErrorKind::NotFound);
        assert_eq!(
            remote_kind(StatusCode::PermissionDenied),
            RemoteErrorKind::PermissionDenied
        );
        assert_eq!(remote_kind(StatusCode::Eof), RemoteErrorKind::Other);
    }

    #[test]
    fn test_options_debug_redacts_password() {
        let options = ConnectOptions::new("test.com").with_credentials("alice", "hunter2");
        let rendered = format!("{options:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_options_defaults() {
        let options = ConnectOptions::new("test.com");
        assert_eq!(options.port, 22);
        assert_eq!(options.host, "test.com");
    }
}
