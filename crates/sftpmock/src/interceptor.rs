//! Connection interception.
//!
//! Every outbound connection made through this crate asks the process-wide
//! [`ConnectionResolver`] where to go. Outside a mock scope that is
//! [`DirectResolver`], which leaves destinations alone. A scope swaps in a
//! [`MockResolver`] that redirects declared hostnames to their local mock
//! servers, then restores whatever was installed before when it ends.
//!
//! The slot moves through `Uninstalled -> Installing -> Installed ->
//! Uninstalled`. Only one scope may hold it at a time.
//!
//! Destinations given as a [`SocketAddr`] were resolved before they reached
//! the interceptor and are never redirected.
//!
//! # Examples
//!
//! ```
//! use sftpmock::interceptor::{self, Destination, Resolution};
//!
//! let destination = Destination::host("sftp.example.org", 22);
//! // not declared by any scope, so nothing is substituted
//! assert!(matches!(
//!     interceptor::resolve(&destination).unwrap(),
//!     Resolution::Direct(_)
//! ));
//! ```

use sftpmock_core::{
    Error, HostKey, Result, ServerBinding, UnregisteredHostPolicy, is_loopback_host,
};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, LazyLock, PoisonError, RwLock, RwLockWriteGuard};
use tokio::net::TcpStream;
use tracing::debug;

/// Where a caller asked to connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    /// A hostname (or IP literal) and port, not yet resolved.
    Host {
        /// Requested hostname
        host: String,
        /// Requested port
        port: u16,
    },
    /// An already resolved socket address.
    Socket(SocketAddr),
}

impl Destination {
    /// Creates a hostname destination.
    #[must_use]
    pub fn host(host: impl Into<String>, port: u16) -> Self {
        Self::Host {
            host: host.into(),
            port,
        }
    }

    /// Returns the requested host as text and the requested port.
    #[must_use]
    pub fn host_and_port(&self) -> (String, u16) {
        match self {
            Self::Host { host, port } => (host.clone(), *port),
            Self::Socket(addr) => (addr.ip().to_string(), addr.port()),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Self::Host { host, port } => write!(f, "{host}:{port}"),
            Self::Socket(addr) => write!(f, "{addr}"),
        }
    }
}

impl From<SocketAddr> for Destination {
    fn from(addr: SocketAddr) -> Self {
        Self::Socket(addr)
    }
}

/// The outcome of resolving a [`Destination`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The destination is served by a local mock server.
    Redirected {
        /// What the caller asked for
        requested: Destination,
        /// The mock server to connect to instead
        addr: SocketAddr,
    },
    /// Connect to the destination as requested.
    Direct(Destination),
}

impl Resolution {
    /// Returns `true` if the connection was substituted.
    #[must_use]
    pub const fn is_redirected(&self) -> bool {
        matches!(self, Self::Redirected { .. })
    }

    /// Returns the destination the caller originally asked for.
    #[must_use]
    pub const fn requested(&self) -> &Destination {
        match self {
            Self::Redirected { requested, .. } | Self::Direct(requested) => requested,
        }
    }
}

/// Decides where outbound connections go.
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionResolver: Send + Sync {
    /// Resolves `destination`.
    ///
    /// # Errors
    ///
    /// Implementations may refuse a destination, e.g. with
    /// `Error::UnregisteredHost`.
    fn resolve(&self, destination: &Destination) -> Result<Resolution>;
}

/// Resolver that never substitutes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectResolver;

impl ConnectionResolver for DirectResolver {
    fn resolve(&self, destination: &Destination) -> Result<Resolution> {
        Ok(Resolution::Direct(destination.clone()))
    }
}

/// Declared hosts and the mock addresses serving them.
///
/// A key pinned to a port wins over a bare hostname key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    routes: HashMap<HostKey, SocketAddr>,
}

impl RoutingTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from server bindings.
    #[must_use]
    pub fn from_bindings<'a>(bindings: impl IntoIterator<Item = &'a ServerBinding>) -> Self {
        Self {
            routes: bindings
                .into_iter()
                .map(|binding| (binding.key().clone(), binding.local_addr()))
                .collect(),
        }
    }

    /// Adds or replaces a route.
    pub fn insert(&mut self, key: HostKey, addr: SocketAddr) {
        self.routes.insert(key, addr);
    }

    /// Finds the mock address for `host` and `port`.
    ///
    /// # Examples
    ///
    /// ```
    /// use sftpmock::interceptor::RoutingTable;
    /// use sftpmock_core::HostKey;
    ///
    /// let mut table = RoutingTable::new();
    /// table.insert(HostKey::new("test.com"), "127.0.0.1:40001".parse().unwrap());
    /// table.insert(HostKey::with_port("test.com", 2222), "127.0.0.1:40002".parse().unwrap());
    ///
    /// assert_eq!(table.lookup("test.com", 22).unwrap().port(), 40001);
    /// assert_eq!(table.lookup("test.com", 2222).unwrap().port(), 40002);
    /// assert!(table.lookup("TEST.com", 22).is_none());
    /// ```
    #[must_use]
    pub fn lookup(&self, host: &str, port: u16) -> Option<SocketAddr> {
        self.routes
            .get(&HostKey::with_port(host, port))
            .or_else(|| self.routes.get(&HostKey::new(host)))
            .copied()
    }

    /// Returns the number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if there are no routes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Resolver installed while a mock scope is active.
///
/// Loopback destinations and pre-resolved sockets go to the resolver that
/// was installed before the scope. Declared hosts are redirected. Anything
/// else follows the [`UnregisteredHostPolicy`].
pub struct MockResolver {
    table: RoutingTable,
    policy: UnregisteredHostPolicy,
    fallback: Arc<dyn ConnectionResolver>,
}

impl MockResolver {
    /// Creates a resolver over `table` that delegates to `fallback`.
    #[must_use]
    pub fn new(
        table: RoutingTable,
        policy: UnregisteredHostPolicy,
        fallback: Arc<dyn ConnectionResolver>,
    ) -> Self {
        Self {
            table,
            policy,
            fallback,
        }
    }
}

impl fmt::Debug for MockResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockResolver")
            .field("table", &self.table)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ConnectionResolver for MockResolver {
    fn resolve(&self, destination: &Destination) -> Result<Resolution> {
        let Destination::Host { host, port } = destination else {
            return self.fallback.resolve(destination);
        };
        if is_loopback_host(host) {
            return self.fallback.resolve(destination);
        }

        if let Some(addr) = self.table.lookup(host, *port) {
            debug!(host = %host, port, addr = %addr, "redirecting connection to mock server");
            return Ok(Resolution::Redirected {
                requested: destination.clone(),
                addr,
            });
        }

        match self.policy {
            UnregisteredHostPolicy::PassThrough => {
                debug!(host = %host, port, "passing through connection to unregistered host");
                self.fallback.resolve(destination)
            }
            UnregisteredHostPolicy::Reject => {
                debug!(host = %host, port, "rejecting connection to unregistered host");
                Err(Error::UnregisteredHost {
                    host: host.clone(),
                    port: *port,
                })
            }
        }
    }
}

/// Lifecycle state of the process-wide interceptor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptorState {
    /// The original resolver is in place.
    Uninstalled,
    /// A scope has reserved the slot and is starting its servers.
    Installing,
    /// A scope's [`MockResolver`] is in place.
    Installed,
}

struct Slot {
    state: InterceptorState,
    current: Arc<dyn ConnectionResolver>,
    // resolver to put back when the holding scope ends
    captured: Option<Arc<dyn ConnectionResolver>>,
}

static SLOT: LazyLock<RwLock<Slot>> = LazyLock::new(|| {
    RwLock::new(Slot {
        state: InterceptorState::Uninstalled,
        current: Arc::new(DirectResolver),
        captured: None,
    })
});

fn slot_mut() -> RwLockWriteGuard<'static, Slot> {
    SLOT.write().unwrap_or_else(PoisonError::into_inner)
}

fn current_resolver() -> Arc<dyn ConnectionResolver> {
    SLOT.read()
        .unwrap_or_else(PoisonError::into_inner)
        .current
        .clone()
}

/// Entry point to the process-wide interceptor slot.
#[derive(Debug, Clone, Copy)]
pub struct Interceptor;

impl Interceptor {
    /// Reserves the slot and captures the resolver currently installed.
    ///
    /// Nothing is redirected until [`InterceptorGuard::activate`] is
    /// called. Dropping the guard releases the slot.
    ///
    /// # Errors
    ///
    /// Returns `Error::ScopeAlreadyActive` if another guard holds the slot.
    pub fn acquire() -> Result<InterceptorGuard> {
        let mut slot = slot_mut();
        if slot.state != InterceptorState::Uninstalled {
            return Err(Error::ScopeAlreadyActive);
        }
        slot.captured = Some(slot.current.clone());
        slot.state = InterceptorState::Installing;
        debug!("interceptor slot reserved");
        Ok(InterceptorGuard { _private: () })
    }

    /// Returns the current slot state.
    #[must_use]
    pub fn state() -> InterceptorState {
        SLOT.read().unwrap_or_else(PoisonError::into_inner).state
    }

    /// Returns `true` while a scope's resolver is installed.
    #[must_use]
    pub fn is_installed() -> bool {
        Self::state() == InterceptorState::Installed
    }
}

/// Holds the interceptor slot for one scope.
///
/// Dropping it, whether on normal return, early `?` exit or panic
/// unwinding, restores the captured resolver.
#[derive(Debug)]
pub struct InterceptorGuard {
    _private: (),
}

impl InterceptorGuard {
    /// Installs a [`MockResolver`] over `table` in front of the captured
    /// resolver.
    pub fn activate(&mut self, table: RoutingTable, policy: UnregisteredHostPolicy) {
        let mut slot = slot_mut();
        let fallback = slot
            .captured
            .clone()
            .unwrap_or_else(|| Arc::new(DirectResolver));
        let routes = table.len();
        slot.current = Arc::new(MockResolver::new(table, policy, fallback));
        slot.state = InterceptorState::Installed;
        debug!(routes, ?policy, "interceptor installed");
    }
}

impl Drop for InterceptorGuard {
    fn drop(&mut self) {
        let mut slot = slot_mut();
        if let Some(original) = slot.captured.take() {
            slot.current = original;
        }
        slot.state = InterceptorState::Uninstalled;
        debug!("interceptor uninstalled");
    }
}

/// Resolves `destination` with the resolver currently installed.
///
/// # Errors
///
/// Returns whatever the installed resolver returns, e.g.
/// `Error::UnregisteredHost` in strict mode.
pub fn resolve(destination: &Destination) -> Result<Resolution> {
    // the lock is released before the resolver runs
    let resolver = current_resolver();
    resolver.resolve(destination)
}

/// Opens a TCP connection to `destination`, or to its mock server when one
/// is registered.
///
/// # Errors
///
/// Returns resolver errors unchanged and `Error::ConnectionFailed` if the
/// TCP connection cannot be established.
pub async fn connect_tcp(destination: &Destination) -> Result<(TcpStream, Resolution)> {
    let resolution = resolve(destination)?;
    let connected = match &resolution {
        Resolution::Redirected { addr, .. } | Resolution::Direct(Destination::Socket(addr)) => {
            TcpStream::connect(*addr).await
        }
        Resolution::Direct(Destination::Host { host, port }) => {
            TcpStream::connect((host.as_str(), *port)).await
        }
    };
    let stream = connected.map_err(|e| {
        let (host, port) = destination.host_and_port();
        Error::ConnectionFailed {
            host,
            port,
            source: Box::new(e),
        }
    })?;
    Ok((stream, resolution))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RoutingTable {
        let mut table = RoutingTable::new();
        table.insert(HostKey::new("test.com"), "127.0.0.1:40001".parse().unwrap());
        table
    }

    #[test]
    fn test_redirects_registered_host() {
        let mut fallback = MockConnectionResolver::new();
        fallback.expect_resolve().never();
        let resolver =
            MockResolver::new(table(), UnregisteredHostPolicy::PassThrough, Arc::new(fallback));

        let resolution = resolver.resolve(&Destination::host("test.com", 22)).unwrap();
        assert_eq!(
            resolution,
            Resolution::Redirected {
                requested: Destination::host("test.com", 22),
                addr: "127.0.0.1:40001".parse().unwrap(),
            }
        );
    }

    #[test]
    fn test_loopback_goes_to_fallback() {
        let mut fallback = MockConnectionResolver::new();
        fallback
            .expect_resolve()
            .times(2)
            .returning(|d| Ok(Resolution::Direct(d.clone())));
        let resolver =
            MockResolver::new(table(), UnregisteredHostPolicy::Reject, Arc::new(fallback));

        assert!(!resolver
            .resolve(&Destination::host("localhost", 22))
            .unwrap()
            .is_redirected());
        assert!(!resolver
            .resolve(&Destination::Socket("127.0.0.1:22".parse().unwrap()))
            .unwrap()
            .is_redirected());
    }

    #[test]
    fn test_pass_through_delegates_unregistered() {
        let mut fallback = MockConnectionResolver::new();
        fallback
            .expect_resolve()
            .withf(|d| d == &Destination::host("other.com", 22))
            .times(1)
            .returning(|d| Ok(Resolution::Direct(d.clone())));
        let resolver =
            MockResolver::new(table(), UnregisteredHostPolicy::PassThrough, Arc::new(fallback));

        let resolution = resolver.resolve(&Destination::host("other.com", 22)).unwrap();
        assert_eq!(resolution, Resolution::Direct(Destination::host("other.com", 22)));
    }

    #[test]
    fn test_reject_policy_fails_fast() {
        let mut fallback = MockConnectionResolver::new();
        fallback.expect_resolve().never();
        let resolver =
            MockResolver::new(table(), UnregisteredHostPolicy::Reject, Arc::new(fallback));

        let err = resolver
            .resolve(&Destination::host("other.com", 2222))
            .unwrap_err();
        assert!(err.is_unregistered_host());
        assert_eq!(err.to_string(), "Connection to unregistered host other.com:2222 rejected");
    }

    #[test]
    fn test_pinned_port_wins() {
        let mut table = table();
        table.insert(
            HostKey::with_port("test.com", 2222),
            "127.0.0.1:40002".parse().unwrap(),
        );
        assert_eq!(table.lookup("test.com", 2222).unwrap().port(), 40002);
        assert_eq!(table.lookup("test.com", 22).unwrap().port(), 40001);
        assert!(table.lookup("test.com.br", 22).is_none());
    }

    #[test]
    fn test_destination_display() {
        assert_eq!(Destination::host("test.com", 22).to_string(), "test.com:22");
        assert_eq!(Destination::host("::1", 22).to_string(), "[::1]:22");
    }

    #[test]
    fn test_direct_resolver() {
        let destination = Destination::host("test.com", 22);
        let resolution = DirectResolver.resolve(&destination).unwrap();
        assert_eq!(resolution.requested(), &destination);
        assert!(!resolution.is_redirected());
    }
}
