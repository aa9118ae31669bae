//! Scope and client types must be shareable across test tasks.

use sftpmock::*;

const fn assert_send_sync<T: Send + Sync>() {}
const fn assert_send<T: Send>() {}

#[test]
fn test_scope_types_are_send() {
    assert_send_sync::<MockSftpServers>();
    // a scope may be entered on one thread and left on another
    assert_send::<MockScope>();
    assert_send::<MockServerRegistry>();
}

#[test]
fn test_interceptor_types_are_send_sync() {
    assert_send_sync::<Destination>();
    assert_send_sync::<Resolution>();
    assert_send_sync::<RoutingTable>();
    assert_send_sync::<MockResolver>();
    assert_send_sync::<InterceptorGuard>();
}

#[test]
fn test_client_is_send() {
    assert_send::<SftpClient>();
    assert_send_sync::<ConnectOptions>();
}
