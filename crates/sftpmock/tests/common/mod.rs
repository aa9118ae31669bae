//! Shared fixtures for sftpmock integration tests.

use sftpmock::{Declaration, TreeBuilder};
use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING: Once = Once::new();

/// Prints logs when `RUST_LOG` is set, e.g. `RUST_LOG=sftpmock=debug`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

/// Two hosts: `test.com` with one file in a folder, `test.com.br` with a
/// file and an empty folder.
pub fn two_hosts() -> Declaration {
    Declaration::new()
        .host(
            "test.com",
            TreeBuilder::new()
                .dir("a_folder", |d| d.file("coisa.txt", "some text"))
                .build()
                .unwrap(),
        )
        .host(
            "test.com.br",
            TreeBuilder::new()
                .dir("a_folder", |d| d.file("file.txt", "some text"))
                .dir("other_folder", |d| d)
                .build()
                .unwrap(),
        )
}
