//! Loopback SSH/SFTP servers for sftpmock.
//!
//! Each [`MockSftpServer`] serves one virtual filesystem over the `sftp`
//! subsystem of an SSH server bound to an ephemeral loopback port. Servers
//! accept every authentication attempt and answer file operations from
//! memory; nothing touches the local disk.
//!
//! # Architecture
//!
//! - `server`: listener, worker thread and shutdown
//! - `session`: SSH authentication and channel/subsystem dispatch
//! - `handler`: SFTP requests mapped onto the virtual filesystem

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod handler;
pub mod server;
mod session;

pub use handler::{SftpHandler, SharedFilesystem, status_code};
pub use server::MockSftpServer;
