use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

use deadpool::managed::Object;

use super::manager::ConnectionManager;
use super::{Connector, Pool};

/// A connection checked out of the pool.
///
/// Returned to the pool exactly once, when dropped or passed to
/// [`PooledConnection::release`], on every exit path including
/// cancellation of the owning future.
pub struct PooledConnection<C: Connector> {
    // Only taken in `Drop`
    object: ManuallyDrop<Object<ConnectionManager<C>>>,
    pool: Pool<C>,
    broken: bool,
}

impl<C: Connector> PooledConnection<C> {
    pub(crate) fn new(object: Object<ConnectionManager<C>>, pool: Pool<C>) -> Self {
        Self {
            object: ManuallyDrop::new(object),
            pool,
            broken: false,
        }
    }

    /// Close the session on release instead of returning it to the idle
    /// set, e.g. when it may still be inside an aborted transaction.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Return the connection to the pool now.
    pub fn release(self) {
        drop(self);
    }
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        &self.object.conn
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.object.conn
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        // SAFETY: `object` is never touched again after this point.
        let object = unsafe { ManuallyDrop::take(&mut self.object) };
        self.pool.release(object, self.broken);
    }
}

impl<C: Connector> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("broken", &self.broken)
            .finish()
    }
}
