use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the pool, the query wrapper and the transaction helper.
///
/// Driver errors are carried unchanged; the other variants originate in the
/// pool itself.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error(transparent)]
    Driver(#[from] sqlx::Error),

    #[error("Timed out after {}ms waiting for a database connection", .0.as_millis())]
    AcquireTimeout(Duration),

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Invalid database configuration: {0}")]
    Config(String),
}

impl DatabaseError {
    /// Whether the error was produced by the pool rather than the database.
    pub fn is_pool_error(&self) -> bool {
        matches!(self, DatabaseError::AcquireTimeout(_) | DatabaseError::PoolClosed)
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
