//! Pool lifecycle notifications.

use std::fmt;

/// Lifecycle notification emitted by the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// A new physical connection was opened
    Connect,
    /// A connection was handed to a caller
    Acquire,
    /// A caller returned a connection
    Release,
    /// A connection left the pool (idle expiry, failed ping, shutdown)
    Remove,
    /// An idle member failed; the pool keeps running
    Error(String),
}

impl PoolEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolEvent::Connect => "connect",
            PoolEvent::Acquire => "acquire",
            PoolEvent::Release => "release",
            PoolEvent::Remove => "remove",
            PoolEvent::Error(_) => "error",
        }
    }
}

impl fmt::Display for PoolEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives pool notifications.
///
/// Called synchronously from the pool; implementations must not block.
pub trait PoolListener: Send + Sync {
    fn on_event(&self, event: &PoolEvent);
}
