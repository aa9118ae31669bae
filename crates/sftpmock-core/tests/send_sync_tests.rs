//! Tests to verify that all public types are Send + Sync as required.

use sftpmock_core::*;

const fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn test_domain_types_are_send_sync() {
    assert_send_sync::<HostKey>();
    assert_send_sync::<ServerBinding>();
    assert_send_sync::<RemoteErrorKind>();
}

#[test]
fn test_config_types_are_send_sync() {
    assert_send_sync::<MockConfig>();
    assert_send_sync::<UnregisteredHostPolicy>();
}

#[test]
fn test_error_is_send_sync() {
    // Errors cross the server worker thread boundary
    assert_send_sync::<Error>();
}
