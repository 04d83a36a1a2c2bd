//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

#[allow(dead_code)]
#[path = "../../src/tests/helpers.rs"]
pub mod fixture;

use fixture::{DiagramFixture, FixtureShape};
use netdoc_core::{
    config::NetdocConfig,
    queue::MemoryNotifications,
    service::ParserService,
    storage::MemoryBlobStore,
};
use std::sync::Arc;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Default configuration with millisecond backoff and workers that stop on an empty queue.
#[allow(dead_code)]
pub fn fast_config() -> NetdocConfig {
    let mut config = NetdocConfig::default();
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 4;
    config.worker.poll_interval_ms = 5;
    config.worker.exit_when_idle = true;
    config
}

#[allow(dead_code)]
pub struct Harness {
    pub service: ParserService,
    pub blobs: Arc<MemoryBlobStore>,
    pub notifications: Arc<MemoryNotifications>,
}

#[allow(dead_code)]
pub fn harness() -> Harness {
    init_logging();
    let blobs = Arc::new(MemoryBlobStore::new());
    let notifications = Arc::new(MemoryNotifications::default());
    let service = ParserService::new(blobs.clone(), notifications.clone(), fast_config()).unwrap();
    Harness {
        service,
        blobs,
        notifications,
    }
}

/// A request message for `document_id` stored at `uploads/{document_id}.vsdx`.
#[allow(dead_code)]
pub fn request_json(document_id: &str) -> Vec<u8> {
    format!(
        r#"{{"document_id":"{document_id}","file_path":"uploads/{document_id}.vsdx","project_id":"p1"}}"#
    )
    .into_bytes()
}

/// Core-Router and Edge-Switch linked twice in a chain with Unknown-Box, or with
/// Unknown-Box left unconnected when `connect_unknown` is false.
#[allow(dead_code)]
pub fn three_shape_diagram(connect_unknown: bool) -> Vec<u8> {
    let second = if connect_unknown {
        FixtureShape::connector("5").from("2").to("3")
    } else {
        FixtureShape::connector("5").from("2").to("1")
    };
    DiagramFixture::new()
        .author("Network Team")
        .title("Campus")
        .shape(FixtureShape::device("1", "Core-Router", 0.0, 0.0))
        .shape(FixtureShape::device("2", "Edge-Switch", 5.0, 0.0))
        .shape(FixtureShape::device("3", "Unknown-Box", 10.0, 0.0))
        .shape(FixtureShape::connector("4").from("1").to("2"))
        .shape(second)
        .build()
}
