//! Core types for the virtual filesystem.
//!
//! This module defines normalised SFTP paths, filesystem errors, and the
//! metadata returned by listing and stat operations.
//!
//! # Examples
//!
//! ```
//! use sftpmock_vfs::VfsPath;
//!
//! let path = VfsPath::parse("a_folder//./coisa.txt").unwrap();
//! assert_eq!(path.as_str(), "/a_folder/coisa.txt");
//! assert_eq!(path.file_name(), Some("coisa.txt"));
//! ```

use std::fmt;
use thiserror::Error;

/// Errors that can occur during virtual filesystem operations.
///
/// The mock server translates each variant into an SFTP status code, so
/// clients observe the same failure shape a real server would produce.
///
/// # Examples
///
/// ```
/// use sftpmock_vfs::FsError;
///
/// let error = FsError::NotFound {
///     path: "/missing.txt".to_string(),
/// };
///
/// assert!(error.is_not_found());
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    /// No entry exists at the path, or a non-final segment is a file
    #[error("No such file or directory: {path}")]
    NotFound {
        /// The path that was not found
        path: String,
    },

    /// Path exists but is not a directory
    #[error("Not a directory: {path}")]
    NotADirectory {
        /// The path that is not a directory
        path: String,
    },

    /// Path exists but is a directory
    #[error("Is a directory: {path}")]
    IsADirectory {
        /// The path that is a directory
        path: String,
    },

    /// An entry already exists at the path
    #[error("Already exists: {path}")]
    AlreadyExists {
        /// The occupied path
        path: String,
    },

    /// Directory still has children
    #[error("Directory not empty: {path}")]
    DirectoryNotEmpty {
        /// The non-empty directory
        path: String,
    },

    /// The filesystem does not accept modifications
    #[error("Read-only filesystem: {path}")]
    ReadOnly {
        /// The path a write was attempted on
        path: String,
    },

    /// Path is malformed or the operation is impossible for it
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath {
        /// The invalid path
        path: String,
        /// Why it was rejected
        reason: String,
    },
}

impl FsError {
    /// Returns `true` if this is a not-found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a not-a-directory error.
    #[must_use]
    pub const fn is_not_directory(&self) -> bool {
        matches!(self, Self::NotADirectory { .. })
    }

    /// Returns `true` if this is an is-a-directory error.
    #[must_use]
    pub const fn is_directory(&self) -> bool {
        matches!(self, Self::IsADirectory { .. })
    }

    /// Returns `true` if a write was refused because the filesystem is
    /// read-only.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly { .. })
    }

    /// Returns the path the error refers to.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::NotFound { path }
            | Self::NotADirectory { path }
            | Self::IsADirectory { path }
            | Self::AlreadyExists { path }
            | Self::DirectoryNotEmpty { path }
            | Self::ReadOnly { path }
            | Self::InvalidPath { path, .. } => path,
        }
    }
}

/// Type alias for filesystem operation results.
pub type Result<T> = std::result::Result<T, FsError>;

/// A normalised, absolute SFTP path.
///
/// SFTP paths are `/`-separated. Relative input is resolved against the
/// root, which is the working directory of every mock session. Empty and
/// `.` segments are dropped and `..` removes the previous segment, stopping
/// at the root.
///
/// # Examples
///
/// ```
/// use sftpmock_vfs::VfsPath;
///
/// assert_eq!(VfsPath::parse("").unwrap().as_str(), "/");
/// assert_eq!(VfsPath::parse(".").unwrap().as_str(), "/");
/// assert_eq!(VfsPath::parse("/a/../../b").unwrap().as_str(), "/b");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VfsPath {
    segments: Vec<String>,
    rendered: String,
}

impl VfsPath {
    /// Returns the root path `/`.
    #[must_use]
    pub fn root() -> Self {
        Self::from_segments(Vec::new())
    }

    /// Parses and normalises an SFTP path.
    ///
    /// # Errors
    ///
    /// Returns `FsError::InvalidPath` if the path contains a NUL byte.
    pub fn parse(path: &str) -> Result<Self> {
        if path.contains('\0') {
            return Err(FsError::InvalidPath {
                path: path.escape_default().to_string(),
                reason: "path contains a NUL byte".to_string(),
            });
        }

        let mut segments: Vec<String> = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                name => segments.push(name.to_string()),
            }
        }
        Ok(Self::from_segments(segments))
    }

    fn from_segments(segments: Vec<String>) -> Self {
        let rendered = if segments.is_empty() {
            "/".to_string()
        } else {
            segments.iter().fold(String::new(), |mut acc, s| {
                acc.push('/');
                acc.push_str(s);
                acc
            })
        };
        Self { segments, rendered }
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    /// Returns the path segments below the root.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns `true` for `/`.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the last segment, or `None` for the root.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Returns the parent directory, or `None` for the root.
    ///
    /// # Examples
    ///
    /// ```
    /// use sftpmock_vfs::VfsPath;
    ///
    /// let path = VfsPath::parse("/a_folder/coisa.txt").unwrap();
    /// assert_eq!(path.parent().unwrap().as_str(), "/a_folder");
    /// assert!(VfsPath::root().parent().is_none());
    /// ```
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (_, parent) = self.segments.split_last()?;
        Some(Self::from_segments(parent.to_vec()))
    }

    /// Returns a child path.
    #[must_use]
    pub fn join(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self::from_segments(segments)
    }

    /// Returns `true` if `self` is `other` or lies below it.
    #[must_use]
    pub fn starts_with(&self, other: &Self) -> bool {
        self.segments.starts_with(&other.segments)
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// Kind of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A regular file
    File,
    /// A directory
    Directory,
}

impl NodeKind {
    /// Returns `true` for directories.
    #[must_use]
    pub const fn is_dir(self) -> bool {
        matches!(self, Self::Directory)
    }

    /// Returns `true` for regular files.
    #[must_use]
    pub const fn is_file(self) -> bool {
        matches!(self, Self::File)
    }
}

/// Metadata for a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    /// Entry kind
    pub kind: NodeKind,
    /// Content length in bytes; zero for directories
    pub size: u64,
}

/// One child returned by a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Child name within its directory
    pub name: String,
    /// Child metadata
    pub metadata: Metadata,
}

impl DirEntry {
    /// Returns the entry kind.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.metadata.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute() {
        let path = VfsPath::parse("/a_folder/coisa.txt").unwrap();
        assert_eq!(path.as_str(), "/a_folder/coisa.txt");
        assert_eq!(path.segments(), ["a_folder", "coisa.txt"]);
    }

    #[test]
    fn test_parse_relative_is_rooted() {
        let path = VfsPath::parse("a_folder/coisa.txt").unwrap();
        assert_eq!(path.as_str(), "/a_folder/coisa.txt");
    }

    #[test]
    fn test_parse_dot_segments() {
        assert_eq!(VfsPath::parse("/a/./b/").unwrap().as_str(), "/a/b");
        assert_eq!(VfsPath::parse("/a/b/..").unwrap().as_str(), "/a");
        assert_eq!(VfsPath::parse("/..").unwrap().as_str(), "/");
        assert!(VfsPath::parse("..").unwrap().is_root());
    }

    #[test]
    fn test_parse_rejects_nul() {
        let err = VfsPath::parse("/a\0b").unwrap_err();
        assert!(matches!(err, FsError::InvalidPath { .. }));
    }

    #[test]
    fn test_join_and_starts_with() {
        let dir = VfsPath::parse("/a").unwrap();
        let child = dir.join("b");
        assert_eq!(child.as_str(), "/a/b");
        assert!(child.starts_with(&dir));
        assert!(!dir.starts_with(&child));
        assert!(child.starts_with(&VfsPath::root()));
    }

    #[test]
    fn test_fs_error_path() {
        let err = FsError::DirectoryNotEmpty {
            path: "/a".to_string(),
        };
        assert_eq!(err.path(), "/a");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_fs_error_display() {
        let err = FsError::IsADirectory {
            path: "/a_folder".to_string(),
        };
        assert_eq!(err.to_string(), "Is a directory: /a_folder");
        assert!(err.is_directory());
    }
}
