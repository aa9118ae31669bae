//! Tree nodes of a virtual filesystem.
//!
//! A tree is a `DirNode` whose children are either files or further
//! directories. Children are kept in a `BTreeMap`, so names are unique
//! within a directory and listings come out in a stable order.

use crate::types::{Metadata, NodeKind};
use std::collections::BTreeMap;
use std::collections::btree_map;

/// A file or directory in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A regular file
    File(FileNode),
    /// A directory
    Directory(DirNode),
}

impl Node {
    /// Creates a file node with the given content.
    ///
    /// # Examples
    ///
    /// ```
    /// use sftpmock_vfs::Node;
    ///
    /// let text = Node::file("some text");
    /// let bytes = Node::file(vec![0u8, 159, 146, 150]);
    /// assert_eq!(text.metadata().size, 9);
    /// assert_eq!(bytes.metadata().size, 4);
    /// ```
    #[must_use]
    pub fn file(content: impl Into<Vec<u8>>) -> Self {
        Self::File(FileNode::new(content))
    }

    /// Creates an empty directory node.
    #[must_use]
    pub fn dir() -> Self {
        Self::Directory(DirNode::new())
    }

    /// Returns the node kind.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::File(_) => NodeKind::File,
            Self::Directory(_) => NodeKind::Directory,
        }
    }

    /// Returns the node metadata.
    #[must_use]
    pub fn metadata(&self) -> Metadata {
        match self {
            Self::File(file) => Metadata {
                kind: NodeKind::File,
                size: file.size(),
            },
            Self::Directory(_) => Metadata {
                kind: NodeKind::Directory,
                size: 0,
            },
        }
    }

    /// Returns the file node, if this is a file.
    #[must_use]
    pub const fn as_file(&self) -> Option<&FileNode> {
        match self {
            Self::File(file) => Some(file),
            Self::Directory(_) => None,
        }
    }

    /// Returns the directory node, if this is a directory.
    #[must_use]
    pub const fn as_dir(&self) -> Option<&DirNode> {
        match self {
            Self::Directory(dir) => Some(dir),
            Self::File(_) => None,
        }
    }
}

impl From<DirNode> for Node {
    fn from(dir: DirNode) -> Self {
        Self::Directory(dir)
    }
}

impl From<FileNode> for Node {
    fn from(file: FileNode) -> Self {
        Self::File(file)
    }
}

/// File content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileNode {
    content: Vec<u8>,
}

impl FileNode {
    /// Creates a file with the given content.
    #[must_use]
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Returns the file content.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Returns the content length in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    /// Discards the content.
    pub fn truncate(&mut self) {
        self.content.clear();
    }

    /// Writes `data` at `offset`, zero-filling any gap past the end.
    ///
    /// Returns `false` and leaves the content untouched if the write would
    /// end beyond `usize::MAX`.
    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> bool {
        let Some(end) = offset.checked_add(data.len()) else {
            return false;
        };
        if self.content.len() < end {
            self.content.resize(end, 0);
        }
        self.content[offset..end].copy_from_slice(data);
        true
    }
}

/// A directory and its children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirNode {
    children: BTreeMap<String, Node>,
}

impl DirNode {
    /// Creates an empty directory.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            children: BTreeMap::new(),
        }
    }

    /// Returns the child named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.children.get(name)
    }

    /// Returns the child named `name` mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children.get_mut(name)
    }

    /// Returns `true` if a child named `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }

    /// Inserts a child, returning `false` if the name is already taken.
    pub fn insert(&mut self, name: impl Into<String>, node: Node) -> bool {
        match self.children.entry(name.into()) {
            btree_map::Entry::Occupied(_) => false,
            btree_map::Entry::Vacant(slot) => {
                slot.insert(node);
                true
            }
        }
    }

    /// Removes and returns the child named `name`.
    pub fn remove(&mut self, name: &str) -> Option<Node> {
        self.children.remove(name)
    }

    /// Iterates over children in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }

    /// Returns the number of direct children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Returns `true` if the directory has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Counts files and directories below this one, recursively.
    #[must_use]
    pub fn count(&self) -> (usize, usize) {
        self.children
            .values()
            .fold((0, 0), |(files, dirs), node| match node {
                Node::File(_) => (files + 1, dirs),
                Node::Directory(dir) => {
                    let (f, d) = dir.count();
                    (files + f, dirs + d + 1)
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut dir = DirNode::new();
        assert!(dir.insert("a", Node::file("one")));
        assert!(!dir.insert("a", Node::file("two")));
        assert_eq!(dir.get("a").unwrap().as_file().unwrap().content(), b"one");
    }

    #[test]
    fn test_iter_is_name_ordered() {
        let mut dir = DirNode::new();
        dir.insert("other_folder", Node::dir());
        dir.insert("a_folder", Node::dir());
        dir.insert("B.txt", Node::file(""));
        let names: Vec<_> = dir.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["B.txt", "a_folder", "other_folder"]);
    }

    #[test]
    fn test_write_at_extends_and_overwrites() {
        let mut file = FileNode::new("hello");
        assert!(file.write_at(5, b" world"));
        assert_eq!(file.content(), b"hello world");
        assert!(file.write_at(0, b"J"));
        assert_eq!(file.content(), b"Jello world");
        assert!(file.write_at(13, b"!"));
        assert_eq!(file.content(), b"Jello world\0\0!");
        assert!(!file.write_at(usize::MAX - 1, b"abcdefgh"));
        assert_eq!(file.content(), b"Jello world\0\0!");
        file.truncate();
        assert_eq!(file.size(), 0);
    }

    #[test]
    fn test_count_is_recursive() {
        let mut inner = DirNode::new();
        inner.insert("x.txt", Node::file("x"));
        inner.insert("empty", Node::dir());
        let mut root = DirNode::new();
        root.insert("inner", inner.into());
        root.insert("y.txt", Node::file("y"));
        assert_eq!(root.count(), (2, 2));
    }

    #[test]
    fn test_metadata() {
        assert_eq!(Node::file("abc").metadata().size, 3);
        assert_eq!(Node::dir().metadata().kind, NodeKind::Directory);
        assert!(Node::dir().as_file().is_none());
    }
}
