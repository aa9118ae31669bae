//! Mock SFTP hosts for tests.
//!
//! Declare the directory tree each hostname should serve, enter a scope,
//! and connect by hostname as usual: every declared host is answered by an
//! in-process SSH/SFTP server on an ephemeral loopback port. When the scope
//! ends the servers stop and connections resolve normally again.
//!
//! # Architecture
//!
//! - [`registry`]: starts and stops one mock server per declared host
//! - [`interceptor`]: routes connections to declared hosts onto their mock
//!   servers while a scope is active
//! - [`scope`]: ties both together with guaranteed teardown
//! - [`client`]: SFTP client whose connections go through the interceptor
//!
//! # Examples
//!
//! ```no_run
//! use sftpmock::{ConnectOptions, Declaration, SftpClient, with_sftpmock_async};
//!
//! # async fn run() -> sftpmock::Result<()> {
//! let declaration = Declaration::from_json_str(
//!     r#"{"test.com": {"a_folder": {"coisa.txt": "some text"}}}"#,
//! )?;
//!
//! let content = with_sftpmock_async(declaration, async |_scope| {
//!     let client = SftpClient::connect(&ConnectOptions::new("test.com")).await?;
//!     client.read("/a_folder/coisa.txt").await
//! })
//! .await??;
//!
//! assert_eq!(content, b"some text");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod client;
pub mod interceptor;
pub mod registry;
pub mod scope;

pub use client::{ConnectOptions, SftpClient};
pub use interceptor::{
    ConnectionResolver, Destination, DirectResolver, Interceptor, InterceptorGuard,
    InterceptorState, MockResolver, Resolution, RoutingTable,
};
pub use registry::MockServerRegistry;
pub use scope::{MockScope, MockSftpServers, with_sftpmock, with_sftpmock_async};

pub use sftpmock_core::{
    Error, HostKey, MockConfig, MockConfigBuilder, RemoteErrorKind, Result, ServerBinding,
    UnregisteredHostPolicy,
};
pub use sftpmock_vfs::{Declaration, Metadata, NodeKind, Tree, TreeBuilder, VirtualFilesystem};
