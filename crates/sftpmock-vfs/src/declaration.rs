//! Declarations of mock hosts and their directory trees.
//!
//! A [`Declaration`] maps hostnames to the tree each mock server serves.
//! It can be written in code or loaded from a JSON or TOML document whose
//! top-level keys are hostnames.
//!
//! # Examples
//!
//! ```
//! use sftpmock_vfs::Declaration;
//!
//! let declaration = Declaration::from_toml_str(r#"
//! ["test.com"."a_folder"]
//! "coisa.txt" = "some text"
//!
//! ["test.com.br"]
//! "B.txt" = "b"
//! "#).unwrap();
//!
//! assert_eq!(declaration.hosts().collect::<Vec<_>>(), ["test.com", "test.com.br"]);
//! ```

use crate::builder::{Tree, json_dir, toml_dir};
use sftpmock_core::{Error, HostKey, Result};
use std::collections::HashSet;

/// An ordered set of mock hosts and their trees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declaration {
    hosts: Vec<(String, Tree)>,
}

impl Declaration {
    /// Creates an empty declaration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a host served with `tree`.
    ///
    /// Keys are checked by [`Declaration::entries`], not here.
    ///
    /// # Examples
    ///
    /// ```
    /// use sftpmock_vfs::{Declaration, TreeBuilder};
    ///
    /// let declaration = Declaration::new()
    ///     .host("test.com", TreeBuilder::new().file("B.txt", "b").build().unwrap())
    ///     .host("test.com.br", Default::default());
    ///
    /// assert_eq!(declaration.len(), 2);
    /// ```
    #[must_use]
    pub fn host(mut self, name: impl Into<String>, tree: Tree) -> Self {
        self.hosts.push((name.into(), tree));
        self
    }

    /// Loads a declaration from a JSON object of `{host: tree}`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDeclaration` if the value is not an object
    /// or a tree is malformed.
    pub fn from_json_value(value: &serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(map) = value else {
            return Err(Error::InvalidDeclaration {
                path: "/".to_string(),
                reason: "expected an object of hostnames".to_string(),
            });
        };
        map.iter().try_fold(Self::new(), |declaration, (host, tree)| {
            Ok(declaration.host(host.clone(), json_dir(tree, host)?))
        })
    }

    /// Parses a JSON document and loads it with
    /// [`Declaration::from_json_value`].
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDeclaration` if the document is not valid
    /// JSON or is not a valid declaration.
    ///
    /// # Examples
    ///
    /// ```
    /// use sftpmock_vfs::Declaration;
    ///
    /// let declaration = Declaration::from_json_str(
    ///     r#"{"test.com": {"a_folder": {"coisa.txt": "some text"}}}"#,
    /// ).unwrap();
    /// assert_eq!(declaration.len(), 1);
    ///
    /// assert!(Declaration::from_json_str("{").is_err());
    /// ```
    pub fn from_json_str(source: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(source).map_err(|e| Error::InvalidDeclaration {
                path: "/".to_string(),
                reason: format!("invalid JSON: {e}"),
            })?;
        Self::from_json_value(&value)
    }

    /// Parses a TOML document whose top-level tables are hosts.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDeclaration` if the document is not valid
    /// TOML or is not a valid declaration.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(source).map_err(|e| Error::InvalidDeclaration {
            path: "/".to_string(),
            reason: format!("invalid TOML: {e}"),
        })?;
        table.iter().try_fold(Self::new(), |declaration, (host, tree)| {
            Ok(declaration.host(host.clone(), toml_dir(tree, host)?))
        })
    }

    /// Iterates over the declared hostnames in declaration order.
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(|(host, _)| host.as_str())
    }

    /// Returns the tree declared for `host`, as written.
    #[must_use]
    pub fn tree(&self, host: &str) -> Option<&Tree> {
        self.hosts
            .iter()
            .find(|(name, _)| name == host)
            .map(|(_, tree)| tree)
    }

    /// Returns the number of declared hosts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Returns `true` if no host is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Parses and checks every hostname, returning keys with their trees.
    ///
    /// No server should be started before this succeeds.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDeclaration` for a malformed or duplicate key
    /// and `Error::UnsupportedHost` for loopback names.
    ///
    /// # Examples
    ///
    /// ```
    /// use sftpmock_vfs::Declaration;
    ///
    /// let ok = Declaration::new().host("test.com:2222", Default::default());
    /// assert_eq!(ok.entries().unwrap()[0].0.port(), Some(2222));
    ///
    /// let local = Declaration::new().host("localhost", Default::default());
    /// assert!(local.entries().unwrap_err().is_unsupported_host());
    /// ```
    pub fn entries(&self) -> Result<Vec<(HostKey, &Tree)>> {
        let mut seen = HashSet::new();
        self.hosts
            .iter()
            .map(|(name, tree)| {
                let key = HostKey::parse(name)?;
                key.ensure_mockable()?;
                if !seen.insert(key.clone()) {
                    return Err(Error::InvalidDeclaration {
                        path: name.clone(),
                        reason: format!("host '{key}' is declared more than once"),
                    });
                }
                Ok((key, tree))
            })
            .collect()
    }
}
