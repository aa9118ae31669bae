//! In-memory virtual filesystems for sftpmock.
//!
//! Each declared host gets a [`VirtualFilesystem`] built from a [`Tree`].
//! Trees come from the fluent [`TreeBuilder`] or from JSON/TOML
//! [`Declaration`]s; the filesystem answers the path lookups, listings,
//! reads and uploads a mock SFTP server forwards to it.
//!
//! # Examples
//!
//! ```
//! use sftpmock_vfs::{Declaration, TreeBuilder, VirtualFilesystem};
//!
//! let declaration = Declaration::new().host(
//!     "test.com",
//!     TreeBuilder::new()
//!         .dir("a_folder", |d| d.file("coisa.txt", "some text"))
//!         .build()
//!         .unwrap(),
//! );
//!
//! let (_, tree) = declaration.entries().unwrap().remove(0);
//! let vfs = VirtualFilesystem::new(tree.clone());
//! assert_eq!(vfs.read_file("a_folder/coisa.txt").unwrap(), b"some text");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod builder;
pub mod declaration;
pub mod node;
pub mod types;
pub mod vfs;

pub use builder::{Tree, TreeBuilder};
pub use declaration::Declaration;
pub use node::{DirNode, FileNode, Node};
pub use types::{DirEntry, FsError, Metadata, NodeKind, Result, VfsPath};
pub use vfs::{MAX_WRITE_GAP, VirtualFilesystem};
