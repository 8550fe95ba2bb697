//! Query wrapper, transaction helper and health check integration tests

mod common;

use std::time::Duration;

use futures::FutureExt;
use tokio_test::{assert_err, assert_ok};
use tracing::Level;

use kitchen_database::database::{HealthStatus, OperationContext};
use kitchen_database::error::DatabaseError;
use kitchen_database::pool::PoolOptions;

use common::{default_mock_database, mock_database, settle, CapturedLogs, MockRow};

#[derive(Debug, thiserror::Error)]
enum KitchenError {
    #[error("kitchen name already taken")]
    NameTaken,
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

const INSERT_KITCHEN: &str = "INSERT INTO kitchens (name) VALUES ($1)";
const INSERT_ADDRESS: &str = "INSERT INTO kitchen_addresses (kitchen_id, city) VALUES ($1, $2)";

fn context() -> OperationContext {
    OperationContext::new("CreateKitchen", "KitchenService").with_field("name", "Al Bayt")
}

#[tokio::test(start_paused = true)]
async fn test_slow_query_is_counted_once() {
    let (db, backend) = default_mock_database();
    backend.delay_statement("SELECT pg_sleep(1.5)", Duration::from_millis(1500));

    assert_ok!(db.query("SELECT pg_sleep(1.5)", &[]).await);

    assert_eq!(db.monitor().counters().slow_queries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_fast_query_is_not_slow() {
    let (db, backend) = default_mock_database();
    backend.delay_statement("SELECT 1", Duration::from_millis(50));

    assert_ok!(db.query("SELECT 1", &[]).await);

    assert_eq!(db.monitor().counters().slow_queries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_threshold_itself_is_not_slow() {
    let (db, backend) = default_mock_database();
    backend.delay_statement("SELECT 1", Duration::from_millis(1000));

    assert_ok!(db.query("SELECT 1", &[]).await);

    assert_eq!(db.monitor().counters().slow_queries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_custom_slow_query_threshold() {
    let (db, backend) = default_mock_database();
    let db = db.with_slow_query_threshold(Duration::from_millis(100));
    backend.delay_statement("SELECT 1", Duration::from_millis(150));

    assert_ok!(db.query("SELECT 1", &[]).await);

    assert_eq!(db.monitor().counters().slow_queries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_a_connection_counts_toward_slow_query() {
    let (db, _backend) = mock_database(PoolOptions {
        max_connections: 1,
        ..PoolOptions::default()
    });
    let held = assert_ok!(db.pool().acquire().await);

    let (result, _) = tokio::join!(db.query("SELECT 1", &[]), async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        drop(held);
    });

    assert_ok!(result);
    assert_eq!(db.monitor().counters().slow_queries, 1);
}

#[tokio::test]
async fn test_query_error_is_returned_and_connection_released() {
    let (db, backend) = default_mock_database();
    backend.fail_statement("SELECT * FROM missing_table");

    let err = assert_err!(db.execute_query("SELECT * FROM missing_table", &[], None).await);
    assert!(err.to_string().contains("statement failed"));

    let stats = db.stats();
    assert_eq!(stats.stats.acquired, 1);
    assert_eq!(stats.stats.released, 1);
    assert_eq!(stats.idle, 1);
}

#[tokio::test]
async fn test_failed_statement_is_logged_once_per_call() {
    let (logs, _guard) = CapturedLogs::install();
    let (db, backend) = default_mock_database();
    backend.fail_statement("SELECT * FROM missing_table");

    assert_err!(db.query("SELECT * FROM missing_table", &[]).await);
    assert_err!(db.execute_query("SELECT * FROM missing_table", &[], None).await);

    let errors = logs.with_message("Database error");
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|event| event.level == Level::ERROR));
    assert_eq!(errors[0].fields["sql"], "SELECT * FROM missing_table");
}

#[tokio::test]
async fn test_failed_statement_in_transaction_is_logged_with_params() {
    let (logs, _guard) = CapturedLogs::install();
    let (db, backend) = default_mock_database();
    backend.fail_statement(INSERT_ADDRESS);

    let result: Result<(), KitchenError> = db
        .execute_transaction(&context(), |tx| {
            async move {
                tx.query(INSERT_KITCHEN, &["Al Bayt".into()]).await?;
                tx.query(INSERT_ADDRESS, &[1i64.into(), "Riyadh".into()]).await?;
                Ok(())
            }
            .boxed()
        })
        .await;
    assert_err!(result);

    let errors = logs.with_message("Database error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].fields["sql"], INSERT_ADDRESS);
    assert!(errors[0].fields["params"].contains("Riyadh"));
}

#[tokio::test]
async fn test_execute_query_on_supplied_connection_does_not_acquire() {
    let (db, backend) = default_mock_database();

    let mut conn = assert_ok!(db.pool().acquire().await);
    let rows = assert_ok!(db.execute_query("SELECT 1", &[], Some(&mut *conn)).await);
    assert_eq!(rows, vec![MockRow::from("SELECT 1")]);

    let counters = db.monitor().counters();
    assert_eq!(counters.acquired, 1);
    assert_eq!(counters.released, 0);

    conn.release();
    assert_eq!(db.monitor().counters().released, 1);
    assert_eq!(backend.count("SELECT 1"), 1);
}

#[tokio::test]
async fn test_transaction_commits_on_success() {
    let (db, backend) = default_mock_database();

    let result: Result<u32, KitchenError> = db
        .execute_transaction(&context(), |tx| {
            async move {
                tx.query(INSERT_KITCHEN, &["Al Bayt".into()]).await?;
                tx.execute_query(INSERT_ADDRESS, &[1i64.into(), "Riyadh".into()])
                    .await?;
                Ok(1)
            }
            .boxed()
        })
        .await;

    assert_eq!(assert_ok!(result), 1);
    assert_eq!(
        backend.statements(),
        vec!["BEGIN", INSERT_KITCHEN, INSERT_ADDRESS, "COMMIT"]
    );

    let stats = db.stats();
    assert_eq!(stats.stats.committed, 1);
    assert_eq!(stats.stats.rolled_back, 0);
    assert_eq!(stats.stats.acquired, 1);
    assert_eq!(stats.stats.released, 1);
    assert_eq!(stats.idle, 1);
}

#[tokio::test]
async fn test_transaction_rolls_back_on_operation_error() {
    let (db, backend) = default_mock_database();

    let result: Result<(), KitchenError> = db
        .execute_transaction(&context(), |tx| {
            async move {
                tx.query(INSERT_KITCHEN, &["Al Bayt".into()]).await?;
                Err(KitchenError::NameTaken)
            }
            .boxed()
        })
        .await;

    assert!(matches!(result, Err(KitchenError::NameTaken)));
    assert_eq!(backend.count("BEGIN"), 1);
    assert_eq!(backend.count("COMMIT"), 0);
    assert_eq!(backend.count("ROLLBACK"), 1);

    let stats = db.stats();
    assert_eq!(stats.stats.committed, 0);
    assert_eq!(stats.stats.rolled_back, 1);
    assert_eq!(stats.stats.released, 1);
    assert_eq!(stats.idle, 1);
}

#[tokio::test]
async fn test_transaction_rolls_back_on_statement_error() {
    let (db, backend) = default_mock_database();
    backend.fail_statement(INSERT_ADDRESS);

    let result: Result<(), KitchenError> = db
        .execute_transaction(&context(), |tx| {
            async move {
                tx.query(INSERT_KITCHEN, &["Al Bayt".into()]).await?;
                tx.query(INSERT_ADDRESS, &[1i64.into(), "Riyadh".into()]).await?;
                Ok(())
            }
            .boxed()
        })
        .await;

    match result {
        Err(KitchenError::Database(e)) => assert!(e.to_string().contains(INSERT_ADDRESS)),
        other => panic!("expected database error, got {other:?}"),
    }
    assert_eq!(
        backend.statements(),
        vec!["BEGIN", INSERT_KITCHEN, INSERT_ADDRESS, "ROLLBACK"]
    );
}

#[tokio::test]
async fn test_failed_commit_is_rolled_back() {
    let (db, backend) = default_mock_database();
    backend.fail_statement("COMMIT");

    let result: Result<(), DatabaseError> = db
        .execute_transaction(&OperationContext::default(), |tx| {
            async move {
                tx.query(INSERT_KITCHEN, &["Al Bayt".into()]).await?;
                Ok(())
            }
            .boxed()
        })
        .await;

    assert_err!(result);
    assert_eq!(backend.count("COMMIT"), 1);
    assert_eq!(backend.count("ROLLBACK"), 1);
    assert_eq!(db.monitor().counters().committed, 0);
}

#[tokio::test]
async fn test_failed_begin_skips_operation() {
    let (db, backend) = default_mock_database();
    backend.fail_statement("BEGIN");

    let result: Result<(), DatabaseError> = db
        .execute_transaction(&OperationContext::default(), |tx| {
            async move {
                tx.query(INSERT_KITCHEN, &["Al Bayt".into()]).await?;
                Ok(())
            }
            .boxed()
        })
        .await;

    assert_err!(result);
    assert_eq!(backend.count(INSERT_KITCHEN), 0);
    assert_eq!(backend.count("COMMIT"), 0);
}

#[tokio::test]
async fn test_failed_rollback_keeps_original_error() {
    let (db, backend) = default_mock_database();
    backend.fail_statement("ROLLBACK");

    let result: Result<(), KitchenError> = db
        .execute_transaction(&context(), |_tx| async move { Err(KitchenError::NameTaken) }.boxed())
        .await;

    assert!(matches!(result, Err(KitchenError::NameTaken)));
    settle().await;

    let stats = db.stats();
    assert_eq!(stats.stats.released, 1);
    assert_eq!(stats.stats.rolled_back, 0);
    assert_eq!(stats.stats.removed, 1);
    assert_eq!((stats.total, stats.idle), (0, 0));
    assert_eq!(backend.closes(), 1);
}

#[tokio::test]
async fn test_transaction_reports_acquire_failure() {
    let (db, backend) = default_mock_database();
    backend.set_fail_connect(true);

    let result: Result<(), KitchenError> = db
        .execute_transaction(&context(), |_tx| async move { Ok(()) }.boxed())
        .await;

    assert!(matches!(result, Err(KitchenError::Database(_))));
    assert!(backend.statements().is_empty());
}

#[tokio::test]
async fn test_concurrent_transactions_use_separate_connections() {
    let (db, backend) = default_mock_database();

    let runs = (0..5).map(|i| {
        let db = db.clone();
        async move {
            db.execute_transaction(&context(), move |tx| {
                async move {
                    tx.query(INSERT_KITCHEN, &[format!("kitchen-{i}").into()]).await?;
                    tokio::task::yield_now().await;
                    Ok::<_, DatabaseError>(i)
                }
                .boxed()
            })
            .await
        }
    });
    let results = futures::future::join_all(runs).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(backend.count("COMMIT"), 5);
    let stats = db.stats();
    assert_eq!(stats.stats.committed, 5);
    assert_eq!(stats.stats.acquired, stats.stats.released);
    assert_eq!(stats.active, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_transaction_session_is_not_reused() {
    let (db, backend) = default_mock_database();
    backend.delay_statement(INSERT_KITCHEN, Duration::from_secs(60));

    let cancelled = tokio::time::timeout(
        Duration::from_secs(1),
        db.execute_transaction(&context(), |tx| {
            async move {
                tx.query(INSERT_KITCHEN, &["Al Bayt".into()]).await?;
                Ok::<_, DatabaseError>(())
            }
            .boxed()
        }),
    )
    .await;
    assert!(cancelled.is_err());
    settle().await;

    let stats = db.stats();
    assert_eq!((stats.total, stats.idle), (0, 0));
    assert_eq!(stats.stats.removed, 1);
    assert_eq!(backend.closes(), 1);
    assert_eq!(backend.count("COMMIT") + backend.count("ROLLBACK"), 0);

    assert_ok!(db.query("SELECT 1", &[]).await);
    assert_eq!(backend.connects(), 2);
}

#[tokio::test]
async fn test_health_check_reports_healthy() {
    let (db, _backend) = default_mock_database();

    let report = db.health_check().await;

    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.database, "connected");
    assert!(report.connections.is_some());
    assert!(report.error.is_none());
}

#[tokio::test]
async fn test_health_check_reports_unhealthy_without_failing() {
    let (db, backend) = default_mock_database();
    backend.set_fail_connect(true);

    let report = db.health_check().await;

    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.database, "disconnected");
    let error = report.error.expect("unhealthy report carries an error");
    assert!(!error.is_empty());
}

#[tokio::test]
async fn test_connect_reports_failure() {
    let (db, backend) = default_mock_database();
    backend.set_fail_connect(true);
    assert_err!(db.connect().await);

    backend.set_fail_connect(false);
    assert_ok!(db.connect().await);
    assert_eq!(db.stats().idle, 1);
}
