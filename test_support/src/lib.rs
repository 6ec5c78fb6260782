//! ABOUTME: Shared testing utilities and helper functions
//! ABOUTME: Common test fixtures and document builders for all crates

use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Process-unique suffix for test resources (data dirs, file names)
pub fn unique_suffix() -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", std::process::id(), n)
}

/// Scratch directory path for on-disk test stores; unique per call
pub fn temp_data_dir() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("shipboard-test-{}", unique_suffix()))
}

/// Build a minimal JSON document for store-level tests
pub fn doc(id: &str, name: &str) -> serde_json::Value {
    serde_json::json!({ "id": id, "name": name })
}
