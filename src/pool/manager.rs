use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use deadpool::managed::{self, Metrics, RecycleError, RecycleResult};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::DatabaseError;

use super::client::DbConnection;
use super::{Connector, PoolEvent, PoolListener};

/// Listener registry and release signal shared by the pool handle and its
/// manager.
#[derive(Default)]
pub(crate) struct PoolShared {
    listeners: RwLock<Vec<Arc<dyn PoolListener>>>,
    pub(crate) released: Notify,
}

impl PoolShared {
    pub(crate) fn subscribe(&self, listener: Arc<dyn PoolListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub(crate) fn emit(&self, event: &PoolEvent) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener.on_event(event);
        }
    }
}

/// A pooled session plus the instant it last went idle.
pub struct PoolEntry<T> {
    pub(crate) conn: T,
    pub(crate) idle_since: Instant,
}

impl<T> PoolEntry<T> {
    fn new(conn: T) -> Self {
        Self {
            conn,
            idle_since: Instant::now(),
        }
    }

    pub(crate) fn is_expired(&self, idle_timeout: Duration) -> bool {
        self.idle_since.elapsed() >= idle_timeout
    }
}

/// Opens sessions through a [`Connector`] and vets idle ones before reuse.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    idle_timeout: Duration,
    test_before_acquire: bool,
    shared: Arc<PoolShared>,
}

impl<C: Connector> ConnectionManager<C> {
    pub(crate) fn new(
        connector: C,
        idle_timeout: Duration,
        test_before_acquire: bool,
        shared: Arc<PoolShared>,
    ) -> Self {
        Self {
            connector,
            idle_timeout,
            test_before_acquire,
            shared,
        }
    }
}

impl<C: Connector> managed::Manager for ConnectionManager<C> {
    type Type = PoolEntry<C::Connection>;
    type Error = DatabaseError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let conn = self.connector.connect().await?;
        self.shared.emit(&PoolEvent::Connect);
        Ok(PoolEntry::new(conn))
    }

    // A rejected entry is dropped by the pool, which ends its session
    async fn recycle(&self, entry: &mut Self::Type, _: &Metrics) -> RecycleResult<Self::Error> {
        if entry.is_expired(self.idle_timeout) {
            self.shared.emit(&PoolEvent::Remove);
            return Err(RecycleError::Message("idle timeout exceeded".into()));
        }

        if self.test_before_acquire {
            if let Err(e) = entry.conn.ping().await {
                self.shared.emit(&PoolEvent::Error(e.to_string()));
                self.shared.emit(&PoolEvent::Remove);
                return Err(RecycleError::Backend(e));
            }
        }

        Ok(())
    }
}
