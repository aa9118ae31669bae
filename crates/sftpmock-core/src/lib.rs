//! Core types, configuration, and errors for sftpmock.
//!
//! This crate provides the foundational types shared by the virtual
//! filesystem, the mock servers, and the connection interceptor.
//!
//! # Architecture
//!
//! The core consists of:
//! - Error hierarchy with contextual information (`Error`, `RemoteErrorKind`)
//! - Declared host keys and server bindings (`HostKey`, `ServerBinding`)
//! - Scope configuration (`MockConfig`, `UnregisteredHostPolicy`)

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

mod config;
mod error;
mod types;

pub use config::{ENV_READ_ONLY, ENV_STRICT, MockConfig, MockConfigBuilder, UnregisteredHostPolicy};
pub use error::{Error, RemoteErrorKind, Result};
pub use types::{HostKey, ServerBinding, is_loopback_host};
