//! Mock SFTP server lifecycle.
//!
//! A [`MockSftpServer`] owns a loopback listener and a worker thread that
//! runs a single-threaded Tokio runtime. The listener is bound before
//! `start` returns, so the port is known and bind errors surface
//! synchronously. Shutdown cancels the accept loop, drops every live
//! session with the runtime and joins the worker.
//!
//! # Examples
//!
//! ```no_run
//! use sftpmock_core::{HostKey, MockConfig};
//! use sftpmock_server::MockSftpServer;
//! use sftpmock_vfs::TreeBuilder;
//!
//! let tree = TreeBuilder::new().file("B.txt", "b").build().unwrap();
//! let mut server = MockSftpServer::start(
//!     &HostKey::new("test.com"),
//!     tree,
//!     &MockConfig::default(),
//! )?;
//!
//! println!("test.com is served on port {}", server.port());
//! server.shutdown()?;
//! # Ok::<(), std::io::Error>(())
//! ```

use crate::handler::SharedFilesystem;
use crate::session::SshSession;
use russh::keys::PrivateKey;
use russh::keys::ssh_key::private::Ed25519Keypair;
use sftpmock_core::{HostKey, MockConfig};
use sftpmock_vfs::{DirNode, VirtualFilesystem};
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct Worker {
    thread: JoinHandle<()>,
    stopped: mpsc::Receiver<()>,
}

/// A running mock SFTP server for one declared host.
#[derive(Debug)]
pub struct MockSftpServer {
    key: HostKey,
    addr: SocketAddr,
    filesystem: SharedFilesystem,
    cancel: CancellationToken,
    shutdown_timeout: Duration,
    worker: Option<Worker>,
}

impl MockSftpServer {
    /// Binds a loopback listener and starts serving `tree`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the listener cannot be bound, the runtime
    /// cannot be built, or the worker thread cannot be spawned.
    pub fn start(key: &HostKey, tree: DirNode, config: &MockConfig) -> io::Result<Self> {
        let listener = TcpListener::bind((config.bind_address, 0))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let filesystem: SharedFilesystem = Arc::new(RwLock::new(
            VirtualFilesystem::new(tree).with_writable(config.writable),
        ));
        let ssh_config = Arc::new(ssh_config(config));
        let cancel = CancellationToken::new();
        let (stopped_tx, stopped) = mpsc::channel();

        let thread = std::thread::Builder::new()
            .name(format!("sftpmock-{key}"))
            .spawn({
                let host = key.to_string();
                let filesystem = filesystem.clone();
                let cancel = cancel.clone();
                move || {
                    runtime.block_on(accept_loop(
                        listener,
                        host,
                        ssh_config,
                        filesystem,
                        cancel,
                    ));
                    drop(runtime);
                    let _ = stopped_tx.send(());
                }
            })?;

        info!(host = %key, addr = %addr, "mock sftp server started");
        Ok(Self {
            key: key.clone(),
            addr,
            filesystem,
            cancel,
            shutdown_timeout: config.shutdown_timeout,
            worker: Some(Worker { thread, stopped }),
        })
    }

    /// Returns the declared key this server answers for.
    #[must_use]
    pub const fn key(&self) -> &HostKey {
        &self.key
    }

    /// Returns the address the server listens on.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the port the server listens on.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Returns `true` until the server has been shut down.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.thread.is_finished())
    }

    /// Returns a copy of the filesystem as it is now, including uploads.
    #[must_use]
    pub fn snapshot(&self) -> VirtualFilesystem {
        self.filesystem
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stops accepting connections, drops live sessions and joins the
    /// worker thread. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::TimedOut` if the worker did not stop within the
    /// configured shutdown timeout (it is then detached), or
    /// `ErrorKind::Other` if the worker panicked.
    pub fn shutdown(&mut self) -> io::Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.cancel.cancel();

        match worker.stopped.recv_timeout(self.shutdown_timeout) {
            Ok(()) => {
                worker
                    .thread
                    .join()
                    .map_err(|_| io::Error::other("mock server worker panicked"))?;
                info!(host = %self.key, addr = %self.addr, "mock sftp server stopped");
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!(
                    "mock server for '{}' did not stop within {:?}",
                    self.key, self.shutdown_timeout
                ),
            )),
            Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.thread.join();
                Err(io::Error::other("mock server worker panicked"))
            }
        }
    }
}

impl Drop for MockSftpServer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(host = %self.key, error = %e, "mock sftp server did not stop cleanly");
        }
    }
}

fn ssh_config(config: &MockConfig) -> russh::server::Config {
    let key = PrivateKey::from(Ed25519Keypair::from_seed(&rand::random()));
    russh::server::Config {
        keys: vec![key],
        auth_rejection_time: Duration::ZERO,
        auth_rejection_time_initial: Some(Duration::ZERO),
        inactivity_timeout: config.inactivity_timeout,
        ..Default::default()
    }
}

async fn accept_loop(
    listener: TcpListener,
    host: String,
    config: Arc<russh::server::Config>,
    filesystem: SharedFilesystem,
    cancel: CancellationToken,
) {
    let listener = match tokio::net::TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => {
            warn!(host = %host, error = %e, "failed to register mock listener");
            return;
        }
    };

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(host = %host, peer = %peer, "accepted connection");
                    let handler = SshSession::new(host.clone(), peer, filesystem.clone());
                    let config = config.clone();
                    let host = host.clone();
                    tokio::spawn(async move {
                        let outcome = match russh::server::run_stream(config, stream, handler).await {
                            Ok(session) => session.await,
                            Err(e) => Err(e),
                        };
                        if let Err(e) = outcome {
                            debug!(host = %host, peer = %peer, error = %e, "session ended with error");
                        }
                    });
                }
                Err(e) => warn!(host = %host, error = %e, "failed to accept connection"),
            },
        }
    }
    debug!(host = %host, "accept loop stopped");
}
