//! PostgreSQL client.
//!
//! Implements the pool's [`Connector`](crate::pool::Connector) seam over
//! `sqlx::PgConnection`.

mod connector;

pub use connector::{PgConnector, PgDatabase};
