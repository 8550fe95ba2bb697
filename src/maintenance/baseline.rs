use serde::Serialize;

use crate::database::Database;
use crate::error::DatabaseError;
use crate::pool::{Connector, RowOf};

use super::{ensure_migrations_table, first_bool, CatalogRow};

/// A migration and the table whose presence proves it already ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineEntry {
    pub migration: String,
    pub table: String,
}

impl BaselineEntry {
    pub fn new(migration: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            migration: migration.into(),
            table: table.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BaselineSummary {
    /// Newly recorded as applied
    pub baselined: usize,
    /// Already present in the history
    pub skipped: usize,
    /// Table missing, migration still has to run
    pub pending: usize,
}

/// The kitchen-domain migrations that predate the migration history.
pub fn kitchen_baseline_entries() -> Vec<BaselineEntry> {
    [
        ("1737000000001_create-kitchens-table", "kitchens"),
        ("1737000000002_create-kitchens-staging-table", "kitchens_staging"),
        ("1737000000003_create-kitchen-users-table", "kitchen_users"),
        ("1737000000004_create-kitchen-roles-table", "kitchen_roles"),
        ("1737000000005_create-kitchen-user-roles-table", "kitchen_user_roles"),
        ("1737000000006_create-kitchen-permissions-table", "kitchen_permissions"),
        ("1737000000007_create-kitchen-role-permissions-table", "kitchen_role_permissions"),
        ("1737000000008_create-kitchen-media-table", "kitchen_media"),
        ("1737000000009_create-days-of-week-table", "days_of_week"),
        ("1737000000010_create-kitchen-availability-slots-table", "kitchen_availability_slots"),
        ("1737000000011_create-kitchen-addresses-table", "kitchen_addresses"),
        ("1737000000012_create-kitchen-addresses-staging-table", "kitchen_addresses_staging"),
        ("1737000000013_create-kitchen-availability-table", "kitchen_availability"),
        ("1737000000014_create-kitchen-availability-staging-table", "kitchen_availability_staging"),
    ]
    .into_iter()
    .map(|(migration, table)| BaselineEntry::new(migration, table))
    .collect()
}

async fn table_exists<C>(db: &Database<C>, table: &str) -> Result<bool, DatabaseError>
where
    C: Connector,
    RowOf<C>: CatalogRow,
{
    let rows = db
        .execute_query(
            r#"
            SELECT EXISTS (
                SELECT FROM information_schema.tables
                WHERE table_schema = 'public'
                AND table_name = $1
            )
            "#,
            &[table.into()],
            None,
        )
        .await?;
    first_bool(&rows)
}

async fn migration_recorded<C>(db: &Database<C>, migration: &str) -> Result<bool, DatabaseError>
where
    C: Connector,
    RowOf<C>: CatalogRow,
{
    let rows = db
        .execute_query(
            "SELECT EXISTS (SELECT FROM pgmigrations WHERE name = $1)",
            &[migration.into()],
            None,
        )
        .await?;
    first_bool(&rows)
}

/// Record every entry whose table already exists as applied.
pub async fn baseline<C>(db: &Database<C>, entries: &[BaselineEntry]) -> Result<BaselineSummary, DatabaseError>
where
    C: Connector,
    RowOf<C>: CatalogRow,
{
    tracing::info!("Starting migration baseline");

    ensure_migrations_table(db).await?;
    tracing::info!("Migration tracking table ready");

    let mut summary = BaselineSummary::default();

    for entry in entries {
        if migration_recorded(db, &entry.migration).await? {
            tracing::debug!(migration = %entry.migration, "Already recorded, skipping");
            summary.skipped += 1;
            continue;
        }

        if table_exists(db, &entry.table).await? {
            db.execute_query(
                "INSERT INTO pgmigrations (name, run_on) VALUES ($1, NOW())",
                &[entry.migration.as_str().into()],
                None,
            )
            .await?;
            tracing::info!(migration = %entry.migration, table = %entry.table, "Baselined");
            summary.baselined += 1;
        } else {
            tracing::warn!(
                migration = %entry.migration,
                table = %entry.table,
                "Table not found, migration still pending"
            );
            summary.pending += 1;
        }
    }

    tracing::info!(
        baselined = summary.baselined,
        skipped = summary.skipped,
        pending_migrations = summary.pending,
        "Baseline complete"
    );

    Ok(summary)
}
