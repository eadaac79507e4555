//! Shared test helpers: temporary store files, small configurations,
//! order-preserving keys and log capture.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::store::Store;

/// A store file inside a temporary directory that is removed on drop.
pub struct TempStorePath {
    _dir: TempDir,
    path: PathBuf,
}

impl TempStorePath {
    /// Reserve a fresh path for a store file.
    pub fn new() -> std::io::Result<Self> {
        init_test_logging();
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("store.b3");
        Ok(Self { _dir: dir, path })
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a store at this path.
    pub fn create(&self, config: StoreConfig) -> Result<Store, StoreError> {
        Store::create(&self.path, config)
    }

    /// Open the store at this path.
    pub fn open(&self, config: StoreConfig) -> Result<Store, StoreError> {
        Store::open(&self.path, config)
    }
}

/// A small-order configuration that splits and merges after a handful of
/// keys. Keys up to 8 bytes, values up to 16.
pub fn small_config(order: usize) -> StoreConfig {
    StoreConfig::new(order, 8, 16).with_cache_capacity(8)
}

/// Encode `n` as an order-preserving key.
pub fn key(n: u32) -> Vec<u8> {
    n.to_be_bytes().to_vec()
}

/// Decode a key made by `key`.
pub fn key_value(bytes: &[u8]) -> Option<u32> {
    bytes.try_into().ok().map(u32::from_be_bytes)
}

/// Route `tracing` output to the test harness. Filtered by `RUST_LOG`,
/// defaulting to warnings. Safe to call from every test.
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "b3store=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
