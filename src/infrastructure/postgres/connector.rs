use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgRow, PgSslMode};
use sqlx::query::Query;
use sqlx::{Connection, PgConnection, Postgres, Row};

use crate::config::DatabaseConfig;
use crate::database::Database;
use crate::error::DatabaseError;
use crate::maintenance::CatalogRow;
use crate::pool::{Connector, DbConnection, PoolOptions, SqlParam};

/// Database facade over PostgreSQL.
pub type PgDatabase = Database<PgConnector>;

/// Opens `sqlx` PostgreSQL sessions.
#[derive(Debug, Clone)]
pub struct PgConnector {
    options: PgConnectOptions,
}

impl PgConnector {
    pub fn new(options: PgConnectOptions) -> Self {
        Self { options }
    }

    /// Build from either the connection string or the discrete fields.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let options = match config.url {
            Some(ref url) => PgConnectOptions::from_str(url)
                .map_err(|e| DatabaseError::Config(e.to_string()))?
                .ssl_mode(PgSslMode::Require),
            None => {
                let mut options = PgConnectOptions::new().port(config.port).ssl_mode(if config.ssl {
                    PgSslMode::Require
                } else {
                    PgSslMode::Disable
                });
                if let Some(ref host) = config.host {
                    options = options.host(host);
                }
                if let Some(ref name) = config.name {
                    options = options.database(name);
                }
                if let Some(ref user) = config.user {
                    options = options.username(user);
                }
                if let Some(ref password) = config.password {
                    options = options.password(password);
                }
                options
            }
        };

        Ok(Self::new(options))
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Connection = PgConnection;

    async fn connect(&self) -> Result<PgConnection, DatabaseError> {
        Ok(PgConnection::connect_with(&self.options).await?)
    }
}

#[async_trait]
impl DbConnection for PgConnection {
    type Row = PgRow;

    async fn query(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<PgRow>, DatabaseError> {
        let query = params.iter().fold(sqlx::query(sql), bind_param);
        Ok(query.fetch_all(&mut *self).await?)
    }

    async fn server_time(&mut self) -> Result<DateTime<Utc>, DatabaseError> {
        let now: DateTime<Utc> = sqlx::query_scalar("SELECT NOW()")
            .fetch_one(&mut *self)
            .await?;
        Ok(now)
    }

    async fn ping(&mut self) -> Result<(), DatabaseError> {
        Ok(Connection::ping(self).await?)
    }

    async fn close(self) -> Result<(), DatabaseError> {
        Ok(Connection::close(self).await?)
    }
}

impl CatalogRow for PgRow {
    fn bool_column(&self, index: usize) -> Result<bool, DatabaseError> {
        Ok(self.try_get::<bool, _>(index)?)
    }

    fn text_column(&self, index: usize) -> Result<String, DatabaseError> {
        Ok(self.try_get::<String, _>(index)?)
    }
}

fn bind_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &'q SqlParam,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        SqlParam::Null => query.bind(None::<String>),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.as_str()),
        SqlParam::Json(v) => query.bind(sqlx::types::Json(v)),
        SqlParam::Uuid(v) => query.bind(*v),
        SqlParam::Timestamp(v) => query.bind(*v),
    }
}

impl PgDatabase {
    /// Build the pool described by `config`. Nothing connects until
    /// [`Database::connect`] or the first query.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let connector = PgConnector::from_config(config)?;
        let options = PoolOptions {
            max_connections: config.max_connections,
            acquire_timeout: config.acquire_timeout(),
            idle_timeout: config.idle_timeout(),
            test_before_acquire: true,
        };

        tracing::info!(
            target_db = %config.display_target(),
            max_connections = config.max_connections,
            "PostgreSQL connection pool configured"
        );

        Ok(Database::new(connector, options)?.with_slow_query_threshold(config.slow_query_threshold()))
    }
}
