//! Virtual filesystem implementation.
//!
//! Provides the in-memory tree a mock server serves. Read operations
//! (`resolve`, `list`, `read_file`, `stat`) are always available; the
//! mutating operations used by SFTP uploads fail with `FsError::ReadOnly`
//! when the filesystem was built read-only.
//!
//! # Examples
//!
//! ```
//! use sftpmock_vfs::{TreeBuilder, VirtualFilesystem};
//!
//! let tree = TreeBuilder::new()
//!     .dir("a_folder", |d| d.file("coisa.txt", "some text"))
//!     .build()
//!     .unwrap();
//! let vfs = VirtualFilesystem::new(tree);
//!
//! assert_eq!(vfs.read_file("/a_folder/coisa.txt").unwrap(), b"some text");
//! assert!(vfs.read_file("/a_folder/missing.txt").unwrap_err().is_not_found());
//! ```

use crate::node::{DirNode, FileNode, Node};
use crate::types::{DirEntry, FsError, Metadata, Result, VfsPath};

/// Largest zero-filled gap a write may leave past the end of a file.
pub const MAX_WRITE_GAP: u64 = 64 * 1024 * 1024;

/// An in-memory filesystem built from a declared tree.
///
/// # Thread Safety
///
/// This type is `Send` and `Sync`. Servers share it behind an `RwLock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFilesystem {
    // always `Node::Directory`
    root: Node,
    writable: bool,
}

impl VirtualFilesystem {
    /// Creates a writable filesystem rooted at `root`.
    #[must_use]
    pub const fn new(root: DirNode) -> Self {
        Self {
            root: Node::Directory(root),
            writable: true,
        }
    }

    /// Creates a filesystem that rejects every modification.
    #[must_use]
    pub const fn read_only(root: DirNode) -> Self {
        Self::new(root).with_writable(false)
    }

    /// Sets whether modifications are accepted.
    #[must_use]
    pub const fn with_writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    /// Returns `true` if modifications are accepted.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.writable
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &DirNode {
        self.root.as_dir().unwrap_or(&EMPTY_DIR)
    }

    /// Walks the tree to the node at `path`.
    ///
    /// # Errors
    ///
    /// Returns `FsError::NotFound` if any segment is absent or if a
    /// non-final segment is a file.
    pub fn resolve(&self, path: &str) -> Result<&Node> {
        let path = VfsPath::parse(path)?;
        self.resolve_path(&path)
    }

    fn resolve_path(&self, path: &VfsPath) -> Result<&Node> {
        let mut node = &self.root;
        for segment in path.segments() {
            node = match node {
                Node::Directory(dir) => dir.get(segment),
                // a file in a non-final position
                Node::File(_) => None,
            }
            .ok_or_else(|| FsError::NotFound {
                path: path.to_string(),
            })?;
        }
        Ok(node)
    }

    /// Lists the children of the directory at `path`, in name order.
    ///
    /// # Errors
    ///
    /// Returns `FsError::NotFound` if the path does not exist and
    /// `FsError::NotADirectory` if it is a file.
    ///
    /// # Examples
    ///
    /// ```
    /// use sftpmock_vfs::{TreeBuilder, VirtualFilesystem};
    ///
    /// let vfs = VirtualFilesystem::new(
    ///     TreeBuilder::new()
    ///         .dir("a_folder", |d| d.file("file.txt", "some text"))
    ///         .dir("other_folder", |d| d)
    ///         .build()
    ///         .unwrap(),
    /// );
    ///
    /// let names: Vec<_> = vfs.list("/").unwrap().into_iter().map(|e| e.name).collect();
    /// assert_eq!(names, ["a_folder", "other_folder"]);
    /// assert!(vfs.list("/other_folder").unwrap().is_empty());
    /// ```
    pub fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        let path = VfsPath::parse(path)?;
        let dir = self.dir_at(&path)?;
        Ok(dir
            .iter()
            .map(|(name, node)| DirEntry {
                name: name.to_string(),
                metadata: node.metadata(),
            })
            .collect())
    }

    /// Returns the content of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `FsError::NotFound` if the path does not exist and
    /// `FsError::IsADirectory` if it is a directory.
    pub fn read_file(&self, path: &str) -> Result<&[u8]> {
        let path = VfsPath::parse(path)?;
        self.file_at(&path).map(FileNode::content)
    }

    /// Returns metadata for the entry at `path`.
    ///
    /// # Errors
    ///
    /// Returns `FsError::NotFound` if the path does not exist.
    pub fn stat(&self, path: &str) -> Result<Metadata> {
        let path = VfsPath::parse(path)?;
        self.resolve_path(&path).map(Node::metadata)
    }

    /// Returns `true` if an entry exists at `path`.
    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }

    /// Returns the number of files in the tree.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.root().count().0
    }

    /// Returns the number of directories in the tree, excluding the root.
    #[must_use]
    pub fn dir_count(&self) -> usize {
        self.root().count().1
    }

    /// Creates the file at `path`, or truncates it if `truncate` is set.
    ///
    /// An existing file is left untouched when `truncate` is false.
    ///
    /// # Errors
    ///
    /// Returns `FsError::ReadOnly` on a read-only filesystem,
    /// `FsError::NotFound` if the parent is missing, and
    /// `FsError::IsADirectory` if `path` is a directory.
    pub fn create_file(&mut self, path: &str, truncate: bool) -> Result<()> {
        let path = self.writable_path(path)?;
        let name = file_name(&path)?;
        let parent = self.parent_dir_mut(&path)?;
        match parent.get_mut(&name) {
            Some(Node::Directory(_)) => Err(FsError::IsADirectory {
                path: path.to_string(),
            }),
            Some(Node::File(file)) => {
                if truncate {
                    file.truncate();
                }
                Ok(())
            }
            None => {
                parent.insert(name, Node::file(Vec::new()));
                Ok(())
            }
        }
    }

    /// Writes `data` into the existing file at `path`, starting at `offset`.
    ///
    /// Writing past the end zero-fills the gap, which may be at most
    /// [`MAX_WRITE_GAP`] bytes.
    ///
    /// # Errors
    ///
    /// Returns `FsError::ReadOnly` on a read-only filesystem,
    /// `FsError::NotFound` if the file does not exist,
    /// `FsError::IsADirectory` if `path` is a directory, and
    /// `FsError::InvalidPath` if the offset is too far past the end.
    pub fn write_at(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<()> {
        let path = self.writable_path(path)?;
        let invalid = |reason: String| FsError::InvalidPath {
            path: path.to_string(),
            reason,
        };
        let file = self.file_at_mut(&path)?;
        if offset > file.size().saturating_add(MAX_WRITE_GAP) {
            return Err(invalid(format!(
                "offset {offset} is more than {MAX_WRITE_GAP} bytes past the end of the file"
            )));
        }
        let start = usize::try_from(offset)
            .map_err(|_| invalid(format!("offset {offset} is too large")))?;
        if !file.write_at(start, data) {
            return Err(invalid(format!(
                "writing {} bytes at offset {offset} overflows",
                data.len()
            )));
        }
        Ok(())
    }

    /// Creates the directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns `FsError::ReadOnly` on a read-only filesystem,
    /// `FsError::NotFound` if the parent is missing, and
    /// `FsError::AlreadyExists` if the name is taken.
    pub fn create_dir(&mut self, path: &str) -> Result<()> {
        let path = self.writable_path(path)?;
        let name = file_name(&path)?;
        let parent = self.parent_dir_mut(&path)?;
        if parent.insert(name, Node::dir()) {
            Ok(())
        } else {
            Err(FsError::AlreadyExists {
                path: path.to_string(),
            })
        }
    }

    /// Removes the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `FsError::ReadOnly`, `FsError::NotFound`, or
    /// `FsError::IsADirectory`.
    pub fn remove_file(&mut self, path: &str) -> Result<()> {
        let path = self.writable_path(path)?;
        let name = file_name(&path)?;
        let parent = self.parent_dir_mut(&path)?;
        match parent.get(&name) {
            None => Err(FsError::NotFound {
                path: path.to_string(),
            }),
            Some(Node::Directory(_)) => Err(FsError::IsADirectory {
                path: path.to_string(),
            }),
            Some(Node::File(_)) => {
                parent.remove(&name);
                Ok(())
            }
        }
    }

    /// Removes the empty directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns `FsError::ReadOnly`, `FsError::NotFound`,
    /// `FsError::NotADirectory`, `FsError::DirectoryNotEmpty`, or
    /// `FsError::InvalidPath` for the root.
    pub fn remove_dir(&mut self, path: &str) -> Result<()> {
        let path = self.writable_path(path)?;
        let name = file_name(&path)?;
        let parent = self.parent_dir_mut(&path)?;
        match parent.get(&name) {
            None => Err(FsError::NotFound {
                path: path.to_string(),
            }),
            Some(Node::File(_)) => Err(FsError::NotADirectory {
                path: path.to_string(),
            }),
            Some(Node::Directory(dir)) if !dir.is_empty() => Err(FsError::DirectoryNotEmpty {
                path: path.to_string(),
            }),
            Some(Node::Directory(_)) => {
                parent.remove(&name);
                Ok(())
            }
        }
    }

    /// Moves the entry at `from` to `to`.
    ///
    /// The destination must not exist, and a directory cannot be moved
    /// below itself. Renaming an entry to its own path does nothing.
    ///
    /// # Errors
    ///
    /// Returns `FsError::ReadOnly`, `FsError::NotFound` (source or
    /// destination parent), `FsError::AlreadyExists`, or
    /// `FsError::InvalidPath`.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let from = self.writable_path(from)?;
        let to = self.writable_path(to)?;
        let from_name = file_name(&from)?;
        let to_name = file_name(&to)?;

        if from == to {
            self.resolve_path(&from)?;
            return Ok(());
        }
        if to.starts_with(&from) {
            return Err(FsError::InvalidPath {
                path: to.to_string(),
                reason: format!("cannot move '{from}' into itself"),
            });
        }
        self.resolve_path(&from)?;
        if self.resolve_path(&to).is_ok() {
            return Err(FsError::AlreadyExists {
                path: to.to_string(),
            });
        }
        // check the destination parent before detaching the source
        self.parent_dir_mut(&to)?;

        let node = self
            .parent_dir_mut(&from)?
            .remove(&from_name)
            .ok_or_else(|| FsError::NotFound {
                path: from.to_string(),
            })?;
        self.parent_dir_mut(&to)?.insert(to_name, node);
        Ok(())
    }

    fn writable_path(&self, path: &str) -> Result<VfsPath> {
        let path = VfsPath::parse(path)?;
        if !self.writable {
            return Err(FsError::ReadOnly {
                path: path.to_string(),
            });
        }
        Ok(path)
    }

    fn dir_at(&self, path: &VfsPath) -> Result<&DirNode> {
        match self.resolve_path(path)? {
            Node::Directory(dir) => Ok(dir),
            Node::File(_) => Err(FsError::NotADirectory {
                path: path.to_string(),
            }),
        }
    }

    fn file_at(&self, path: &VfsPath) -> Result<&FileNode> {
        match self.resolve_path(path)? {
            Node::File(file) => Ok(file),
            Node::Directory(_) => Err(FsError::IsADirectory {
                path: path.to_string(),
            }),
        }
    }

    fn file_at_mut(&mut self, path: &VfsPath) -> Result<&mut FileNode> {
        let name = file_name(path)?;
        let parent = self.parent_dir_mut(path)?;
        match parent.get_mut(&name) {
            Some(Node::File(file)) => Ok(file),
            Some(Node::Directory(_)) => Err(FsError::IsADirectory {
                path: path.to_string(),
            }),
            None => Err(FsError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    fn parent_dir_mut(&mut self, path: &VfsPath) -> Result<&mut DirNode> {
        let not_found = || FsError::NotFound {
            path: path.to_string(),
        };
        let (_, parents) = path.segments().split_last().ok_or_else(not_found)?;

        let Node::Directory(root) = &mut self.root else {
            return Err(not_found());
        };
        let mut dir = root;
        for segment in parents {
            dir = match dir.get_mut(segment) {
                Some(Node::Directory(child)) => child,
                _ => return Err(not_found()),
            };
        }
        Ok(dir)
    }
}

impl Default for VirtualFilesystem {
    fn default() -> Self {
        Self::new(DirNode::new())
    }
}

static EMPTY_DIR: DirNode = DirNode::new();

fn file_name(path: &VfsPath) -> Result<String> {
    path.file_name()
        .map(str::to_string)
        .ok_or_else(|| FsError::InvalidPath {
            path: path.to_string(),
            reason: "operation is not allowed on the root directory".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VirtualFilesystem {
        let mut a_folder = DirNode::new();
        a_folder.insert("coisa.txt", Node::file("some text"));
        let mut root = DirNode::new();
        root.insert("a_folder", a_folder.into());
        root.insert("other_folder", Node::dir());
        root.insert("top.txt", Node::file("top"));
        VirtualFilesystem::new(root)
    }

    #[test]
    fn test_resolve_root_and_nested() {
        let vfs = sample();
        assert!(vfs.resolve("/").unwrap().as_dir().is_some());
        assert!(vfs.resolve("").unwrap().as_dir().is_some());
        let file = vfs.resolve("a_folder/coisa.txt").unwrap();
        assert_eq!(file.as_file().unwrap().content(), b"some text");
    }

    #[test]
    fn test_resolve_through_file_is_not_found() {
        let vfs = sample();
        let err = vfs.resolve("/top.txt/anything").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_list_is_sorted_and_typed() {
        let vfs = sample();
        let entries = vfs.list("/").unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a_folder", "other_folder", "top.txt"]);
        assert!(entries[0].kind().is_dir());
        assert_eq!(entries[2].metadata.size, 3);

        assert!(vfs.list("/other_folder").unwrap().is_empty());
        assert!(vfs.list("/top.txt").unwrap_err().is_not_directory());
        assert!(vfs.list("/nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_read_file_errors() {
        let vfs = sample();
        assert!(vfs.read_file("/a_folder").unwrap_err().is_directory());
        assert!(vfs.read_file("/a_folder/missing.txt").unwrap_err().is_not_found());
    }

    #[test]
    fn test_counts() {
        let vfs = sample();
        assert_eq!(vfs.file_count(), 2);
        assert_eq!(vfs.dir_count(), 2);
        assert!(vfs.exists("/other_folder"));
        assert!(!vfs.exists("/missing"));
    }

    #[test]
    fn test_create_and_write() {
        let mut vfs = sample();
        vfs.create_file("/other_folder/new.bin", true).unwrap();
        vfs.write_at("/other_folder/new.bin", 0, b"abc").unwrap();
        vfs.write_at("/other_folder/new.bin", 3, b"def").unwrap();
        assert_eq!(vfs.read_file("/other_folder/new.bin").unwrap(), b"abcdef");

        vfs.create_file("/other_folder/new.bin", false).unwrap();
        assert_eq!(vfs.stat("/other_folder/new.bin").unwrap().size, 6);
        vfs.create_file("/other_folder/new.bin", true).unwrap();
        assert_eq!(vfs.stat("/other_folder/new.bin").unwrap().size, 0);
    }

    #[test]
    fn test_create_file_requires_parent() {
        let mut vfs = sample();
        let err = vfs.create_file("/missing/new.txt", true).unwrap_err();
        assert!(err.is_not_found());
        let err = vfs.create_file("/a_folder", true).unwrap_err();
        assert!(err.is_directory());
        let err = vfs.create_file("/", true).unwrap_err();
        assert!(matches!(err, FsError::InvalidPath { .. }));
    }

    #[test]
    fn test_write_missing_file() {
        let mut vfs = sample();
        let err = vfs.write_at("/nope.txt", 0, b"x").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_write_at_huge_offset_is_rejected() {
        let mut vfs = sample();
        vfs.create_file("/f", true).unwrap();

        let err = vfs.write_at("/f", u64::MAX - 1, b"abcdefgh").unwrap_err();
        assert!(matches!(err, FsError::InvalidPath { .. }));
        let err = vfs.write_at("/f", 1 << 40, b"x").unwrap_err();
        assert!(matches!(err, FsError::InvalidPath { .. }));
        assert_eq!(vfs.stat("/f").unwrap().size, 0);
    }

    #[test]
    fn test_write_at_gap_limit() {
        let mut vfs = sample();
        vfs.create_file("/f", true).unwrap();
        vfs.write_at("/f", 0, b"abc").unwrap();

        let err = vfs.write_at("/f", 3 + MAX_WRITE_GAP + 1, b"x").unwrap_err();
        assert!(matches!(err, FsError::InvalidPath { .. }));
        vfs.write_at("/f", 5, b"z").unwrap();
        assert_eq!(vfs.read_file("/f").unwrap(), b"abc\0\0z");
    }

    #[test]
    fn test_directories() {
        let mut vfs = sample();
        vfs.create_dir("/a_folder/sub").unwrap();
        assert!(matches!(
            vfs.create_dir("/a_folder/sub").unwrap_err(),
            FsError::AlreadyExists { .. }
        ));
        assert!(matches!(
            vfs.remove_dir("/a_folder").unwrap_err(),
            FsError::DirectoryNotEmpty { .. }
        ));
        assert!(vfs.remove_dir("/top.txt").unwrap_err().is_not_directory());
        vfs.remove_dir("/a_folder/sub").unwrap();
        assert!(!vfs.exists("/a_folder/sub"));
    }

    #[test]
    fn test_remove_file() {
        let mut vfs = sample();
        assert!(vfs.remove_file("/a_folder").unwrap_err().is_directory());
        vfs.remove_file("/a_folder/coisa.txt").unwrap();
        assert!(vfs.list("/a_folder").unwrap().is_empty());
        assert!(vfs.remove_file("/a_folder/coisa.txt").unwrap_err().is_not_found());
    }

    #[test]
    fn test_rename() {
        let mut vfs = sample();
        vfs.rename("/a_folder", "/other_folder/moved").unwrap();
        assert_eq!(
            vfs.read_file("/other_folder/moved/coisa.txt").unwrap(),
            b"some text"
        );
        assert!(!vfs.exists("/a_folder"));

        assert!(matches!(
            vfs.rename("/top.txt", "/other_folder").unwrap_err(),
            FsError::AlreadyExists { .. }
        ));
        assert!(matches!(
            vfs.rename("/other_folder", "/other_folder/moved/inner").unwrap_err(),
            FsError::InvalidPath { .. }
        ));
        assert!(vfs.rename("/top.txt", "/missing/top.txt").unwrap_err().is_not_found());
        assert!(vfs.exists("/top.txt"));
    }

    #[test]
    fn test_rename_onto_itself_is_noop() {
        let mut vfs = sample();
        vfs.rename("/top.txt", "/top.txt").unwrap();
        vfs.rename("/other_folder", "other_folder/.").unwrap();
        assert!(vfs.exists("/top.txt"));
        assert!(vfs.exists("/other_folder"));
        assert!(vfs.rename("/nope.txt", "/nope.txt").unwrap_err().is_not_found());
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let mut vfs = sample().with_writable(false);
        assert!(!vfs.is_writable());
        assert!(vfs.create_file("/x.txt", true).unwrap_err().is_read_only());
        assert!(vfs.create_dir("/x").unwrap_err().is_read_only());
        assert!(vfs.remove_file("/top.txt").unwrap_err().is_read_only());
        assert!(vfs.rename("/top.txt", "/y.txt").unwrap_err().is_read_only());
        assert_eq!(vfs.read_file("/top.txt").unwrap(), b"top");
    }
}
