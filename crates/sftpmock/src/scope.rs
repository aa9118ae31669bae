//! Scoped activation of mock SFTP hosts.
//!
//! Entering a scope reserves the interceptor, starts one server per
//! declared host and then installs the redirecting resolver. Leaving it,
//! by drop, explicit [`MockScope::exit`], early return or panic, restores
//! the previous resolver first and then stops every server.
//!
//! # Examples
//!
//! ```no_run
//! use sftpmock::{ConnectOptions, Declaration, MockSftpServers, SftpClient, TreeBuilder};
//!
//! # async fn run() -> sftpmock::Result<()> {
//! let declaration = Declaration::new().host(
//!     "test.com",
//!     TreeBuilder::new()
//!         .dir("a_folder", |d| d.file("coisa.txt", "some text"))
//!         .build()?,
//! );
//!
//! let scope = MockSftpServers::new(declaration).enter()?;
//! let client = SftpClient::connect(&ConnectOptions::new("test.com")).await?;
//! assert_eq!(client.read("/a_folder/coisa.txt").await?, b"some text");
//! client.close().await?;
//! scope.exit();
//! # Ok(())
//! # }
//! ```

use crate::interceptor::{Interceptor, InterceptorGuard};
use crate::registry::MockServerRegistry;
use sftpmock_core::{HostKey, MockConfig, Result, ServerBinding};
use sftpmock_server::MockSftpServer;
use sftpmock_vfs::{Declaration, Tree, VirtualFilesystem};
use std::io;
use std::net::SocketAddr;
use tracing::info;

/// A declaration of mock hosts, ready to be entered.
#[derive(Debug, Clone)]
pub struct MockSftpServers {
    declaration: Declaration,
    config: MockConfig,
}

impl MockSftpServers {
    /// Prepares a scope for `declaration`.
    ///
    /// The configuration starts from [`MockConfig::from_env`].
    #[must_use]
    pub fn new(declaration: Declaration) -> Self {
        Self {
            declaration,
            config: MockConfig::from_env(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: MockConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the configuration the scope will use.
    #[must_use]
    pub const fn config(&self) -> &MockConfig {
        &self.config
    }

    /// Starts the servers and installs the interceptor.
    ///
    /// # Errors
    ///
    /// - `Error::ScopeAlreadyActive` if another scope is active
    /// - `Error::InvalidDeclaration` or `Error::UnsupportedHost` for a bad
    ///   hostname
    /// - `Error::ConfigError` for an invalid configuration
    /// - `Error::ServerStartFailure` if a server cannot start
    ///
    /// Nothing stays running or installed when an error is returned.
    pub fn enter(self) -> Result<MockScope> {
        self.enter_with(MockSftpServer::start)
    }

    fn enter_with(
        self,
        start_server: impl FnMut(&HostKey, Tree, &MockConfig) -> io::Result<MockSftpServer>,
    ) -> Result<MockScope> {
        let mut guard = Interceptor::acquire()?;
        // on error the guard drops here and releases the slot
        let registry =
            MockServerRegistry::start_with(&self.declaration, &self.config, start_server)?;
        guard.activate(registry.routing_table(), self.config.unregistered_hosts);

        info!(
            hosts = registry.len(),
            policy = ?self.config.unregistered_hosts,
            writable = self.config.writable,
            "entered sftp mock scope"
        );
        Ok(MockScope {
            guard: Some(guard),
            registry,
        })
    }
}

/// An active mock scope.
///
/// While it lives, connections made through this crate to declared hosts
/// reach their mock servers.
#[derive(Debug)]
pub struct MockScope {
    guard: Option<InterceptorGuard>,
    registry: MockServerRegistry,
}

impl MockScope {
    /// Returns the binding of every mock server.
    #[must_use]
    pub fn bindings(&self) -> &[ServerBinding] {
        self.registry.bindings()
    }

    /// Returns the local port serving a host, as declared.
    #[must_use]
    pub fn port(&self, declared: &str) -> Option<u16> {
        self.registry.binding(declared).map(ServerBinding::port)
    }

    /// Returns the local address serving a host, as declared.
    #[must_use]
    pub fn local_addr(&self, declared: &str) -> Option<SocketAddr> {
        self.registry
            .binding(declared)
            .map(ServerBinding::local_addr)
    }

    /// Returns a copy of a host's filesystem, including uploads so far.
    #[must_use]
    pub fn filesystem(&self, declared: &str) -> Option<VirtualFilesystem> {
        self.registry.filesystem(declared)
    }

    /// Returns `true` while any mock server is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.registry.is_running()
    }

    /// Leaves the scope. Equivalent to dropping it.
    pub fn exit(self) {
        drop(self);
    }
}

impl Drop for MockScope {
    fn drop(&mut self) {
        // interceptor first, then servers
        drop(self.guard.take());
        self.registry.shutdown();
        info!("left sftp mock scope");
    }
}

/// Runs `body` inside a mock scope for `declaration`.
///
/// The scope is left when `body` returns or panics.
///
/// # Errors
///
/// Returns the scope entry error, in which case `body` is not run.
///
/// # Examples
///
/// ```
/// use sftpmock::{Declaration, with_sftpmock};
///
/// let declaration = Declaration::from_json_str(r#"{"test.com": {"B.txt": "b"}}"#).unwrap();
/// let port = with_sftpmock(declaration, |scope| scope.port("test.com")).unwrap();
/// assert!(port.is_some());
/// ```
pub fn with_sftpmock<R>(
    declaration: Declaration,
    body: impl FnOnce(&MockScope) -> R,
) -> Result<R> {
    let scope = MockSftpServers::new(declaration).enter()?;
    Ok(body(&scope))
}

/// Async form of [`with_sftpmock`].
///
/// # Errors
///
/// Returns the scope entry error, in which case `body` is not run.
pub async fn with_sftpmock_async<R>(
    declaration: Declaration,
    body: impl AsyncFnOnce(&MockScope) -> R,
) -> Result<R> {
    let scope = MockSftpServers::new(declaration).enter()?;
    Ok(body(&scope).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::InterceptorState;
    use serial_test::serial;
    use sftpmock_vfs::TreeBuilder;
    use std::net::TcpStream;

    fn declaration() -> Declaration {
        Declaration::new()
            .host("test.com", TreeBuilder::new().file("B.txt", "b").build().unwrap())
            .host("test.com.br", TreeBuilder::new().build().unwrap())
    }

    #[test]
    #[serial]
    fn test_failed_server_start_releases_everything() {
        let mut started = Vec::new();
        let err = MockSftpServers::new(declaration())
            .with_config(MockConfig::default())
            .enter_with(|key, tree, config| {
                if started.is_empty() {
                    let server = MockSftpServer::start(key, tree, config)?;
                    started.push(server.local_addr());
                    Ok(server)
                } else {
                    Err(io::Error::new(io::ErrorKind::AddrInUse, "port taken"))
                }
            })
            .unwrap_err();

        assert!(err.is_server_start_failure());
        assert!(TcpStream::connect(started[0]).is_err());
        assert_eq!(Interceptor::state(), InterceptorState::Uninstalled);

        let scope = MockSftpServers::new(declaration())
            .with_config(MockConfig::default())
            .enter()
            .unwrap();
        assert_eq!(scope.bindings().len(), 2);
    }
}
