use std::fmt;

use serde::Serialize;

use crate::database::Database;
use crate::error::DatabaseError;
use crate::pool::{Connector, RowOf};

use super::{ensure_migrations_table, quote_ident, CatalogRow, MIGRATIONS_TABLE};

#[derive(Debug, Clone, Copy, Default)]
pub struct ResetOptions {
    /// Drop every view, table, sequence and enum in the public schema
    pub drop_objects: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub views: usize,
    pub tables: usize,
    pub sequences: usize,
    pub enums: usize,
    /// Drop statements that failed and were skipped
    pub failed: usize,
}

/// Kinds of public schema objects removed by a full reset, in drop order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaObject {
    View,
    Table,
    Sequence,
    Enum,
}

impl SchemaObject {
    pub const DROP_ORDER: [SchemaObject; 4] = [
        SchemaObject::View,
        SchemaObject::Table,
        SchemaObject::Sequence,
        SchemaObject::Enum,
    ];

    /// Catalog query listing the objects of this kind by name.
    pub fn list_sql(&self) -> &'static str {
        match self {
            SchemaObject::View => {
                "SELECT table_name::text FROM information_schema.views WHERE table_schema = 'public'"
            }
            SchemaObject::Table => {
                "SELECT tablename::text FROM pg_tables WHERE schemaname = 'public' AND tablename <> 'pgmigrations'"
            }
            SchemaObject::Sequence => {
                "SELECT sequence_name::text FROM information_schema.sequences \
                 WHERE sequence_schema = 'public' AND sequence_name NOT LIKE 'pgmigrations%'"
            }
            SchemaObject::Enum => {
                "SELECT t.typname::text FROM pg_type t \
                 JOIN pg_namespace n ON n.oid = t.typnamespace \
                 WHERE n.nspname = 'public' AND t.typtype = 'e'"
            }
        }
    }

    fn keyword(&self) -> &'static str {
        match self {
            SchemaObject::View => "VIEW",
            SchemaObject::Table => "TABLE",
            SchemaObject::Sequence => "SEQUENCE",
            SchemaObject::Enum => "TYPE",
        }
    }

    /// `DROP ... IF EXISTS ... CASCADE` for one object.
    pub fn drop_statement(&self, name: &str) -> String {
        format!("DROP {} IF EXISTS {} CASCADE", self.keyword(), quote_ident(name))
    }
}

impl fmt::Display for SchemaObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchemaObject::View => "view",
            SchemaObject::Table => "table",
            SchemaObject::Sequence => "sequence",
            SchemaObject::Enum => "enum",
        };
        f.write_str(s)
    }
}

/// Drop every object of `kind`. Returns (dropped, failed).
async fn drop_all<C>(db: &Database<C>, kind: SchemaObject) -> Result<(usize, usize), DatabaseError>
where
    C: Connector,
    RowOf<C>: CatalogRow,
{
    let rows = db.execute_query(kind.list_sql(), &[], None).await?;
    let names = rows
        .iter()
        .map(|row| row.text_column(0))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(kind = %kind, count = names.len(), "Dropping schema objects");

    let mut dropped = 0;
    let mut failed = 0;
    for name in names {
        match db.query(&kind.drop_statement(&name), &[]).await {
            Ok(_) => {
                tracing::info!(kind = %kind, name = %name, "Dropped");
                dropped += 1;
            }
            Err(e) => {
                tracing::error!(kind = %kind, name = %name, error = %e, "Failed to drop");
                failed += 1;
            }
        }
    }
    Ok((dropped, failed))
}

/// Clear the migration history, first dropping all schema objects when
/// `drop_objects` is set.
pub async fn reset<C>(db: &Database<C>, options: ResetOptions) -> Result<ResetSummary, DatabaseError>
where
    C: Connector,
    RowOf<C>: CatalogRow,
{
    let mut summary = ResetSummary::default();

    if options.drop_objects {
        tracing::warn!("Dropping all objects in the public schema");

        for kind in SchemaObject::DROP_ORDER {
            let (dropped, failed) = drop_all(db, kind).await?;
            summary.failed += failed;
            match kind {
                SchemaObject::View => summary.views = dropped,
                SchemaObject::Table => summary.tables = dropped,
                SchemaObject::Sequence => summary.sequences = dropped,
                SchemaObject::Enum => summary.enums = dropped,
            }
        }
    }

    ensure_migrations_table(db).await?;
    db.execute_query(&format!("TRUNCATE TABLE {}", quote_ident(MIGRATIONS_TABLE)), &[], None)
        .await?;
    tracing::info!("Migration history cleared");

    tracing::info!(
        views = summary.views,
        tables = summary.tables,
        sequences = summary.sequences,
        enums = summary.enums,
        failed = summary.failed,
        "Reset complete"
    );

    Ok(summary)
}
