//! # docbind Testkit
//!
//! Test utilities for docbind.
//!
//! This crate provides:
//! - [`MemoryStore`]: an in-memory [`DocumentStore`] that also records
//!   every write call, for asserting that rejected saves never reach storage
//! - Fixture entities modelled on a small shop (customers, articles, orders)
//! - [`init_tracing`] for readable test logs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docbind_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn saves_a_customer() {
//!     let (store, connection) = memory_connection();
//!     let mut customer = Customer::new();
//!     connection.collection::<Customer>().save(&mut customer).await.unwrap();
//!     assert_eq!(store.write_count(), 1);
//! }
//! ```
//!
//! [`DocumentStore`]: docbind_core::DocumentStore

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod memory;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::memory::*;
    pub use crate::{init_tracing, memory_connection, memory_connection_with, TEST_PASSPHRASE};
}

pub use fixtures::*;
pub use memory::*;

use docbind_core::{Connection, ConnectionConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Passphrase used by [`memory_connection`].
pub const TEST_PASSPHRASE: &str = "123456789";

/// Installs a test-friendly `tracing` subscriber once.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// A fresh store and a connection over it, with encryption enabled.
pub fn memory_connection() -> (MemoryStore, Connection) {
    memory_connection_with(
        ConnectionConfig::new("mongodb://localhost/test").encryption_key(TEST_PASSPHRASE),
    )
}

/// A fresh store and a connection over it, with a custom configuration.
pub fn memory_connection_with(config: ConnectionConfig) -> (MemoryStore, Connection) {
    init_tracing();
    let store = MemoryStore::new();
    let connection = Connection::new(Arc::new(store.clone()), config);
    (store, connection)
}
