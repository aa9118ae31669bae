//! Mock server registry.
//!
//! Starts one [`MockSftpServer`] per declared host and keeps the bindings
//! the interceptor routes by.

use crate::interceptor::RoutingTable;
use sftpmock_core::{Error, HostKey, MockConfig, Result, ServerBinding};
use sftpmock_server::MockSftpServer;
use sftpmock_vfs::{Declaration, Tree, VirtualFilesystem};
use std::io;
use std::net::SocketAddr;
use tracing::{info, warn};

/// The running mock servers of one scope.
#[derive(Debug)]
pub struct MockServerRegistry {
    servers: Vec<MockSftpServer>,
    bindings: Vec<ServerBinding>,
}

impl MockServerRegistry {
    /// Validates `declaration` and starts a server for every host.
    ///
    /// Every hostname is checked before the first server starts. If a
    /// server fails to start, the ones already running are stopped before
    /// the error is returned.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` for an invalid configuration,
    /// `Error::InvalidDeclaration` or `Error::UnsupportedHost` for a bad
    /// hostname, and `Error::ServerStartFailure` if a server cannot start.
    pub fn start(declaration: &Declaration, config: &MockConfig) -> Result<Self> {
        Self::start_with(declaration, config, MockSftpServer::start)
    }

    pub(crate) fn start_with(
        declaration: &Declaration,
        config: &MockConfig,
        mut start_server: impl FnMut(&HostKey, Tree, &MockConfig) -> io::Result<MockSftpServer>,
    ) -> Result<Self> {
        config.validate()?;
        let entries = declaration.entries()?;

        let mut registry = Self {
            servers: Vec::with_capacity(entries.len()),
            bindings: Vec::with_capacity(entries.len()),
        };
        for (key, tree) in entries {
            match start_server(&key, tree.clone(), config) {
                Ok(server) => {
                    registry
                        .bindings
                        .push(ServerBinding::new(key, server.local_addr()));
                    registry.servers.push(server);
                }
                Err(source) => {
                    registry.shutdown();
                    return Err(Error::ServerStartFailure {
                        host: key.to_string(),
                        source,
                    });
                }
            }
        }

        info!(servers = registry.servers.len(), "mock sftp servers started");
        Ok(registry)
    }

    /// Returns the binding of every server, in declaration order.
    #[must_use]
    pub fn bindings(&self) -> &[ServerBinding] {
        &self.bindings
    }

    /// Returns the binding for a host exactly as it was declared, e.g.
    /// `test.com` or `test.com:2222`.
    #[must_use]
    pub fn binding(&self, declared: &str) -> Option<&ServerBinding> {
        self.bindings
            .iter()
            .find(|binding| binding.key().to_string() == declared)
    }

    /// Returns the mock address a connection to `host:port` goes to.
    #[must_use]
    pub fn lookup(&self, host: &str, port: u16) -> Option<SocketAddr> {
        let find = |wanted: Option<u16>| {
            self.bindings
                .iter()
                .find(|binding| binding.key().host() == host && binding.key().port() == wanted)
        };
        find(Some(port))
            .or_else(|| find(None))
            .map(ServerBinding::local_addr)
    }

    /// Returns the routes for every running server.
    #[must_use]
    pub fn routing_table(&self) -> RoutingTable {
        RoutingTable::from_bindings(&self.bindings)
    }

    /// Returns the number of servers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Returns `true` if no server was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Returns a copy of a host's filesystem as it is now.
    #[must_use]
    pub fn filesystem(&self, declared: &str) -> Option<VirtualFilesystem> {
        self.servers
            .iter()
            .find(|server| server.key().to_string() == declared)
            .map(MockSftpServer::snapshot)
    }

    /// Returns `true` while any server is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.servers.iter().any(MockSftpServer::is_running)
    }

    /// Stops every server and empties the registry. Failures are logged
    /// and the remaining servers are still stopped. Calling it again is a
    /// no-op.
    pub fn shutdown(&mut self) {
        self.bindings.clear();
        for mut server in self.servers.drain(..) {
            if let Err(e) = server.shutdown() {
                warn!(host = %server.key(), error = %e, "failed to stop mock sftp server");
            }
        }
    }
}

impl Drop for MockServerRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
