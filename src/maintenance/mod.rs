//! Migration history maintenance.
//!
//! - `baseline`: record migrations as applied for tables that already exist
//! - `reset`: clear the history, optionally dropping every public schema object
//!
//! The history lives in the `pgmigrations` table used by the migration runner.
//! Both commands run against any [`Database`] whose rows implement
//! [`CatalogRow`].

mod baseline;
mod reset;

pub use baseline::{baseline, kitchen_baseline_entries, BaselineEntry, BaselineSummary};
pub use reset::{reset, ResetOptions, ResetSummary, SchemaObject};

use crate::database::Database;
use crate::error::DatabaseError;
use crate::pool::Connector;

/// Migration history table
pub const MIGRATIONS_TABLE: &str = "pgmigrations";

/// Column access needed to read catalog and history lookups.
pub trait CatalogRow {
    fn bool_column(&self, index: usize) -> Result<bool, DatabaseError>;

    fn text_column(&self, index: usize) -> Result<String, DatabaseError>;
}

/// Create the migration history table if it does not exist yet.
pub async fn ensure_migrations_table<C: Connector>(db: &Database<C>) -> Result<(), DatabaseError> {
    db.execute_query(
        r#"
        CREATE TABLE IF NOT EXISTS pgmigrations (
            id SERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            run_on TIMESTAMP NOT NULL
        )
        "#,
        &[],
        None,
    )
    .await?;
    Ok(())
}

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Read the boolean in the first column of the first row.
fn first_bool<R: CatalogRow>(rows: &[R]) -> Result<bool, DatabaseError> {
    match rows.first() {
        Some(row) => row.bool_column(0),
        None => Ok(false),
    }
}
