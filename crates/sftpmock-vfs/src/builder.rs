//! Building directory trees for mock hosts.
//!
//! Trees can be assembled with the fluent [`TreeBuilder`] or loaded from
//! JSON and TOML documents, where a string is a file and an object (or
//! table) is a directory.
//!
//! # Examples
//!
//! ```
//! use sftpmock_vfs::{Tree, TreeBuilder};
//!
//! let built = TreeBuilder::new()
//!     .dir("a_folder", |d| d.file("coisa.txt", "some text"))
//!     .build()
//!     .unwrap();
//!
//! let loaded = Tree::from_json(&serde_json::json!({
//!     "a_folder": { "coisa.txt": "some text" }
//! }))
//! .unwrap();
//!
//! assert_eq!(built, loaded);
//! ```

use crate::node::{DirNode, Node};
use sftpmock_core::{Error, Result};

/// A declared directory tree; the root directory of one mock host.
pub type Tree = DirNode;

/// Fluent builder for a [`Tree`].
///
/// Invalid or duplicate names are collected while building and the first
/// one is returned from [`TreeBuilder::build`].
///
/// # Examples
///
/// ```
/// use sftpmock_vfs::TreeBuilder;
///
/// let tree = TreeBuilder::new()
///     .file("B.txt", "b")
///     .dir("a_folder", |d| d.file("file.txt", "some text").dir("empty", |d| d))
///     .build()
///     .unwrap();
///
/// assert_eq!(tree.count(), (2, 2));
///
/// let err = TreeBuilder::new().file("x", "1").file("x", "2").build().unwrap_err();
/// assert!(err.is_invalid_declaration());
/// ```
#[derive(Debug, Default)]
pub struct TreeBuilder {
    prefix: String,
    tree: DirNode,
    errors: Vec<Error>,
}

impl TreeBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn nested(prefix: String) -> Self {
        Self {
            prefix,
            ..Self::default()
        }
    }

    /// Adds a file with the given content.
    #[must_use]
    pub fn file(self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.child(name.into(), Node::file(content))
    }

    /// Adds a directory whose children are added by `build`.
    #[must_use]
    pub fn dir(mut self, name: impl Into<String>, build: impl FnOnce(Self) -> Self) -> Self {
        let name = name.into();
        let inner = build(Self::nested(format!("{}/{name}", self.prefix)));
        self.errors.extend(inner.errors);
        self.child(name, Node::Directory(inner.tree))
    }

    fn child(mut self, name: String, node: Node) -> Self {
        let path = format!("{}/{name}", self.prefix);
        if let Err(e) = validate_name(&name, &path) {
            self.errors.push(e);
        } else if !self.tree.insert(name, node) {
            self.errors.push(Error::InvalidDeclaration {
                path,
                reason: "duplicate entry name".to_string(),
            });
        }
        self
    }

    /// Consumes the builder and returns the tree.
    ///
    /// # Errors
    ///
    /// Returns the first `Error::InvalidDeclaration` recorded while
    /// building.
    pub fn build(self) -> Result<Tree> {
        match self.errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(self.tree),
        }
    }
}

impl DirNode {
    /// Builds a tree from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDeclaration` if the value is not an object,
    /// or if any entry is neither a string nor an object.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        json_dir(value, "")
    }

    /// Builds a tree from a TOML table.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDeclaration` if the value is not a table, or
    /// if any entry is neither a string nor a table.
    ///
    /// # Examples
    ///
    /// ```
    /// use sftpmock_vfs::Tree;
    ///
    /// let table: toml::Table = toml::from_str(r#"
    /// [a_folder]
    /// "coisa.txt" = "some text"
    /// "#).unwrap();
    ///
    /// let tree = Tree::from_toml(&toml::Value::Table(table)).unwrap();
    /// assert!(tree.get("a_folder").unwrap().as_dir().unwrap().contains("coisa.txt"));
    /// ```
    pub fn from_toml(value: &toml::Value) -> Result<Self> {
        toml_dir(value, "")
    }
}

pub(crate) fn json_dir(value: &serde_json::Value, path: &str) -> Result<DirNode> {
    let serde_json::Value::Object(map) = value else {
        return Err(unexpected(path, json_type(value), "an object"));
    };
    let mut dir = DirNode::new();
    for (name, child) in map {
        let child_path = format!("{path}/{name}");
        validate_name(name, &child_path)?;
        let node = match child {
            serde_json::Value::String(content) => Node::file(content.as_bytes()),
            serde_json::Value::Object(_) => Node::Directory(json_dir(child, &child_path)?),
            other => {
                return Err(unexpected(&child_path, json_type(other), "a string or an object"));
            }
        };
        dir.insert(name.clone(), node);
    }
    Ok(dir)
}

pub(crate) fn toml_dir(value: &toml::Value, path: &str) -> Result<DirNode> {
    let toml::Value::Table(table) = value else {
        return Err(unexpected(path, value.type_str(), "a table"));
    };
    let mut dir = DirNode::new();
    for (name, child) in table {
        let child_path = format!("{path}/{name}");
        validate_name(name, &child_path)?;
        let node = match child {
            toml::Value::String(content) => Node::file(content.as_bytes()),
            toml::Value::Table(_) => Node::Directory(toml_dir(child, &child_path)?),
            other => {
                return Err(unexpected(&child_path, other.type_str(), "a string or a table"));
            }
        };
        dir.insert(name.clone(), node);
    }
    Ok(dir)
}

fn validate_name(name: &str, path: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "entry name cannot be empty"
    } else if name == "." || name == ".." {
        "entry name cannot be '.' or '..'"
    } else if name.contains('/') {
        "entry name cannot contain '/'"
    } else if name.contains('\0') {
        "entry name cannot contain a NUL byte"
    } else {
        return Ok(());
    };
    Err(Error::InvalidDeclaration {
        path: path.to_string(),
        reason: reason.to_string(),
    })
}

fn unexpected(path: &str, found: &str, expected: &str) -> Error {
    Error::InvalidDeclaration {
        path: if path.is_empty() { "/".to_string() } else { path.to_string() },
        reason: format!("expected {expected}, found {found}"),
    }
}

const fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_nested() {
        let tree = TreeBuilder::new()
            .dir("a", |d| d.dir("b", |d| d.file("c.txt", "deep")))
            .build()
            .unwrap();
        let b = tree.get("a").unwrap().as_dir().unwrap().get("b").unwrap();
        let c = b.as_dir().unwrap().get("c.txt").unwrap();
        assert_eq!(c.as_file().unwrap().content(), b"deep");
    }

    #[test]
    fn test_builder_reports_nested_path() {
        let err = TreeBuilder::new()
            .dir("a", |d| d.file("x/y", "bad"))
            .build()
            .unwrap_err();
        match err {
            Error::InvalidDeclaration { path, .. } => assert_eq!(path, "/a/x/y"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_builder_rejects_dot_names() {
        assert!(TreeBuilder::new().dir("..", |d| d).build().is_err());
        assert!(TreeBuilder::new().file("", "x").build().is_err());
    }

    #[test]
    fn test_from_json() {
        let tree = Tree::from_json(&json!({
            "a_folder": { "file.txt": "some text" },
            "other_folder": {}
        }))
        .unwrap();
        assert_eq!(tree.len(), 2);
        assert!(tree.get("other_folder").unwrap().as_dir().unwrap().is_empty());
    }

    #[test]
    fn test_from_json_rejects_other_values() {
        let err = Tree::from_json(&json!({ "a_folder": { "n": 3 } })).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("/a_folder/n"), "{message}");
        assert!(message.contains("number"), "{message}");

        assert!(Tree::from_json(&json!(["x"])).is_err());
    }

    #[test]
    fn test_from_toml_rejects_other_values() {
        let table: toml::Table = toml::from_str("flag = true").unwrap();
        let err = Tree::from_toml(&toml::Value::Table(table)).unwrap_err();
        assert!(err.is_invalid_declaration());
        assert!(err.to_string().contains("boolean"));
    }
}
