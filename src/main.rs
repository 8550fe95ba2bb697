use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};

use kitchen_database::config::Settings;
use kitchen_database::maintenance::{self, ResetOptions};
use kitchen_database::postgres::PgDatabase;
use kitchen_database::server::{create_app, AppState};
use kitchen_database::shutdown::{shutdown_signal, GracefulShutdown};
use kitchen_database::tasks::StatsReporter;
use kitchen_database::telemetry::init_telemetry;

/// Grace period before a destructive reset starts
const RESET_DROP_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "kitchen-db", version, about = "Kitchen database service and migration tools")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve health, stats and metrics endpoints (default)
    Serve,
    /// Mark migrations whose tables already exist as applied
    Baseline,
    /// Clear the migration history
    Reset {
        /// Also drop every view, table, sequence and enum in the public schema
        #[arg(long = "drop")]
        drop_objects: bool,
        /// Skip the grace period before dropping
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::new()?;
    let _telemetry = init_telemetry(&settings.otel, settings.json_logs())?;
    tracing::info!(run_mode = %settings.run_mode, "Configuration loaded");

    let db = PgDatabase::from_config(&settings.database)?;
    db.connect().await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings, db).await,
        Command::Baseline => {
            let result = maintenance::baseline(&db, &maintenance::kitchen_baseline_entries()).await;
            db.close().await;
            result?;
            Ok(())
        }
        Command::Reset { drop_objects, yes } => {
            if drop_objects && !yes {
                tracing::warn!(
                    delay_secs = RESET_DROP_DELAY.as_secs(),
                    database = %settings.database.display_target(),
                    "All public schema objects will be dropped. Press Ctrl+C to cancel"
                );
                tokio::time::sleep(RESET_DROP_DELAY).await;
            }
            let result = maintenance::reset(&db, ResetOptions { drop_objects }).await;
            db.close().await;
            result?;
            Ok(())
        }
    }
}

async fn serve(settings: Settings, db: PgDatabase) -> Result<()> {
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let reaper_handle = db.pool().spawn_reaper(settings.database.idle_timeout());

    let reporter_handle = if settings.is_development() {
        let reporter = StatsReporter::new(
            db.clone(),
            settings.database.stats_interval(),
            shutdown_tx.subscribe(),
        );
        Some(tokio::spawn(reporter.run()))
    } else {
        None
    };

    let addr = settings.server_addr();
    let app = create_app(AppState::new(settings, db.clone()));

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    let (reason_tx, reason_rx) = oneshot::channel();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let reason = shutdown_signal().await;
            let _ = reason_tx.send(reason);
        })
        .await?;

    let reason = reason_rx.await.unwrap_or("server stopped");
    let result = GracefulShutdown::new(db, shutdown_tx).execute(reason).await;

    reaper_handle.abort();
    if let Some(handle) = reporter_handle {
        let _ = handle.await;
    }

    tracing::info!(
        success = result.success,
        duration_ms = result.duration.as_millis() as u64,
        "Server shutdown complete"
    );
    Ok(())
}
