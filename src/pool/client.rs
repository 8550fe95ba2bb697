//! Client abstraction the pool is generic over.
//!
//! A [`Connector`] opens connections; a [`DbConnection`] runs statements with
//! positional parameters. The PostgreSQL implementation lives in
//! `infrastructure::postgres`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;

use super::SqlParam;

/// A single database session.
#[async_trait]
pub trait DbConnection: Send + 'static {
    /// Row type produced by this client
    type Row: Send + 'static;

    /// Run one statement and return the produced rows.
    async fn query(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<Self::Row>, DatabaseError>;

    /// Current server time, used for the startup connectivity report.
    async fn server_time(&mut self) -> Result<DateTime<Utc>, DatabaseError>;

    /// Cheap liveness check run before an idle connection is reused.
    async fn ping(&mut self) -> Result<(), DatabaseError>;

    /// Terminate the session.
    async fn close(self) -> Result<(), DatabaseError>;
}

/// Opens new connections for the pool.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: DbConnection;

    async fn connect(&self) -> Result<Self::Connection, DatabaseError>;
}

/// Row type of a connector's connections.
pub type RowOf<C> = <<C as Connector>::Connection as DbConnection>::Row;
