//! Bounded connection pool.
//!
//! Built on `deadpool`'s managed pool: callers beyond `max_connections`
//! queue until a connection is returned or the acquire timeout elapses.
//! Idle members are pinged before reuse and reclaimed once they exceed the
//! idle timeout. Every lifecycle transition is published to registered
//! [`PoolListener`]s.

mod client;
mod connection;
mod events;
mod manager;
mod params;

pub use client::{Connector, DbConnection, RowOf};
pub use connection::PooledConnection;
pub use events::{PoolEvent, PoolListener};
pub use params::SqlParam;

use std::sync::{Arc, Weak};
use std::time::Duration;

use deadpool::managed::{self, Object, PoolError, QueueMode};
use deadpool::Runtime;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::DatabaseError;

use manager::{ConnectionManager, PoolEntry, PoolShared};

/// Pool sizing and timeout options
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Maximum number of open connections
    pub max_connections: u32,
    /// How long a caller waits for a free connection before failing
    pub acquire_timeout: Duration,
    /// Idle connections older than this are closed
    pub idle_timeout: Duration,
    /// Ping idle connections before handing them out
    pub test_before_acquire: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 20,
            acquire_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
            test_before_acquire: true,
        }
    }
}

/// Point-in-time view of the pool, taken under a single lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub total: u32,
    pub idle: u32,
    pub waiting: u32,
    pub max: u32,
}

/// Shared handle to a connection pool. Cloning is cheap.
pub struct Pool<C: Connector> {
    inner: managed::Pool<ConnectionManager<C>>,
    shared: Arc<PoolShared>,
    options: Arc<PoolOptions>,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            shared: self.shared.clone(),
            options: self.options.clone(),
        }
    }
}

impl<C: Connector> Pool<C> {
    /// Create a pool. No connection is opened until the first checkout.
    pub fn new(connector: C, options: PoolOptions) -> Result<Self, DatabaseError> {
        let options = PoolOptions {
            max_connections: options.max_connections.max(1),
            ..options
        };
        let shared = Arc::new(PoolShared::default());
        let manager = ConnectionManager::new(
            connector,
            options.idle_timeout,
            options.test_before_acquire,
            shared.clone(),
        );

        let inner = managed::Pool::builder(manager)
            .max_size(options.max_connections as usize)
            .wait_timeout(Some(options.acquire_timeout))
            .queue_mode(QueueMode::Lifo)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| DatabaseError::Config(format!("connection pool: {}", e)))?;

        Ok(Self {
            inner,
            shared,
            options: Arc::new(options),
        })
    }

    /// Register a lifecycle listener.
    pub fn subscribe(&self, listener: Arc<dyn PoolListener>) {
        self.shared.subscribe(listener);
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Check out a connection, waiting in line if the pool is saturated.
    pub async fn acquire(&self) -> Result<PooledConnection<C>, DatabaseError> {
        if self.is_closed() {
            return Err(DatabaseError::PoolClosed);
        }

        let object = self.inner.get().await.map_err(|e| match e {
            PoolError::Timeout(_) => {
                tracing::warn!(
                    timeout_ms = self.options.acquire_timeout.as_millis() as u64,
                    waiting = self.num_waiting(),
                    "Timed out waiting for a database connection"
                );
                DatabaseError::AcquireTimeout(self.options.acquire_timeout)
            }
            PoolError::Closed => DatabaseError::PoolClosed,
            PoolError::Backend(e) => e,
            other => DatabaseError::Config(other.to_string()),
        })?;
        self.shared.emit(&PoolEvent::Acquire);

        Ok(PooledConnection::new(object, self.clone()))
    }

    /// Close a member that has already left the pool.
    async fn discard(&self, conn: C::Connection) {
        self.shared.emit(&PoolEvent::Remove);
        if let Err(e) = conn.close().await {
            self.shared.emit(&PoolEvent::Error(e.to_string()));
        }
        self.shared.released.notify_waiters();
    }

    /// Return a connection taken by [`PooledConnection`]. Broken members and
    /// anything returned after [`Pool::close`] are closed instead of reused.
    pub(crate) fn release(&self, mut object: Object<ConnectionManager<C>>, broken: bool) {
        if broken || self.is_closed() {
            let entry = Object::take(object);
            self.shared.emit(&PoolEvent::Release);
            self.shared.emit(&PoolEvent::Remove);
            spawn_close::<C>(Arc::downgrade(&self.shared), entry.conn);
            self.shared.released.notify_waiters();
            return;
        }

        object.idle_since = Instant::now();
        drop(object);
        self.shared.emit(&PoolEvent::Release);
    }

    /// Close idle members that exceeded the idle timeout. Returns how many.
    pub async fn reap_idle(&self) -> usize {
        let idle_timeout = self.options.idle_timeout;
        let expired = self.inner.retain(|entry, _| !entry.is_expired(idle_timeout)).removed;

        let count = expired.len();
        for entry in expired {
            self.discard(entry.conn).await;
        }
        count
    }

    /// Periodically reap idle members until the pool is closed.
    pub fn spawn_reaper(&self, period: Duration) -> JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if pool.is_closed() {
                    break;
                }
                let reaped = pool.reap_idle().await;
                if reaped > 0 {
                    tracing::debug!(reaped = reaped, "Reclaimed idle database connections");
                }
            }
        })
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let status = self.inner.status();
        PoolSnapshot {
            total: status.size as u32,
            idle: status.available as u32,
            waiting: status.waiting as u32,
            max: self.options.max_connections,
        }
    }

    pub fn size(&self) -> u32 {
        self.inner.status().size as u32
    }

    pub fn num_idle(&self) -> usize {
        self.inner.status().available
    }

    pub fn num_waiting(&self) -> usize {
        self.inner.status().waiting
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Stop handing out connections, close idle members and wait until every
    /// checked-out connection has been returned.
    pub async fn close(&self) {
        let idle: Vec<PoolEntry<C::Connection>> = self.inner.retain(|_, _| false).removed;
        self.inner.close();

        for entry in idle {
            self.discard(entry.conn).await;
        }

        loop {
            let released = self.shared.released.notified();
            if self.size() == 0 {
                break;
            }
            released.await;
        }
    }
}

fn spawn_close<C: Connector>(shared: Weak<PoolShared>, conn: C::Connection) {
    // Without a runtime the session is simply dropped
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            if let Err(e) = conn.close().await {
                if let Some(shared) = shared.upgrade() {
                    shared.emit(&PoolEvent::Error(e.to_string()));
                }
            }
        });
    }
}
