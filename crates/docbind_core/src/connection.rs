//! Connection context.
//!
//! A [`Connection`] bundles the store handle, the field cipher, the event
//! bus and the configuration. It is cheap to clone and is handed to every
//! [`Collection`].

use crate::collection::Collection;
use crate::config::ConnectionConfig;
use crate::crypto::FieldCipher;
use crate::entity::Entity;
use crate::error::CoreResult;
use crate::events::{EventBus, EventKind, LifecycleEvent};
use crate::store::{Connector, DocumentStore, StoreError};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A handle to an open document store.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    store: Arc<dyn DocumentStore>,
    cipher: Option<FieldCipher>,
    events: EventBus,
    config: ConnectionConfig,
    is_open: RwLock<bool>,
}

impl Connection {
    /// Connects through `connector` using `config.uri`.
    pub async fn open(connector: &dyn Connector, config: ConnectionConfig) -> CoreResult<Self> {
        debug!(database = ?config.database, "connecting");
        let store = connector.connect(&config.uri).await?;
        let connection = Self::new(store, config);
        info!(
            database = ?connection.config().database,
            encryption = connection.cipher().is_some(),
            "connection opened"
        );
        Ok(connection)
    }

    /// Wraps an already connected store.
    pub fn new(store: Arc<dyn DocumentStore>, config: ConnectionConfig) -> Self {
        let cipher = config.encryption_key.as_deref().map(FieldCipher::new);
        let events = EventBus::with_max_history(config.event_history);
        Self {
            inner: Arc::new(ConnectionInner {
                store,
                cipher,
                events,
                config,
                is_open: RwLock::new(true),
            }),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }

    /// Cipher for encrypted fields, when a passphrase is configured.
    pub fn cipher(&self) -> Option<&FieldCipher> {
        self.inner.cipher.as_ref()
    }

    /// Lifecycle event bus.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Configuration the connection was opened with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Typed collection for `T`.
    pub fn collection<T: Entity>(&self) -> Collection<T> {
        Collection::new(self.clone())
    }

    /// Closes the store. Closing twice is a no-op.
    ///
    /// The connection stays open when the store fails to close, so the call
    /// can be retried.
    pub async fn close(&self) -> CoreResult<()> {
        if !self.is_open() {
            return Ok(());
        }
        if let Err(err) = self.inner.store.close().await {
            warn!(error = %err, "store failed to close");
            return Err(err.into());
        }
        *self.inner.is_open.write() = false;
        info!("connection closed");
        Ok(())
    }

    /// Whether the connection is still open.
    pub fn is_open(&self) -> bool {
        *self.inner.is_open.read()
    }

    /// Logs a finished store round-trip and emits its lifecycle event.
    pub(crate) fn emit(&self, kind: EventKind, collection: &str, runtime: Duration) {
        debug!(
            collection,
            event = kind.as_str(),
            elapsed_ms = runtime.as_millis() as u64,
            "store round-trip"
        );
        self.inner
            .events
            .emit(LifecycleEvent::new(kind, collection, runtime));
    }

    /// Ensures the connection is open.
    pub(crate) fn ensure_open(&self) -> CoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::Closed.into())
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.inner.config)
            .field("events", &self.inner.events)
            .field("is_open", &self.is_open())
            .finish()
    }
}
