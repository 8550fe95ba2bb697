//! Transaction helper.
//!
//! `execute_transaction` reserves one connection, runs `BEGIN`, hands the
//! caller's operation a [`Transaction`] bound to that connection and then
//! commits or rolls back. The connection is owned by the `Transaction`
//! value, so it goes back to the pool exactly once whatever happens. A
//! transaction dropped before it finished (its future was cancelled) closes
//! the session instead of returning it, so an open `BEGIN` never leaks into
//! the idle set.

use std::collections::BTreeMap;
use std::fmt;

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;

use crate::error::DatabaseError;
use crate::metrics::TransactionMetrics;
use crate::pool::{Connector, PooledConnection, RowOf, SqlParam};

use super::Database;

/// Caller-supplied context attached to every transaction log line.
#[derive(Debug, Clone, Serialize)]
pub struct OperationContext {
    operation: String,
    module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,
    fields: BTreeMap<String, Value>,
}

impl OperationContext {
    pub fn new(operation: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            module: module.into(),
            trace_id: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Attach a structured field. Values that fail to serialize become null.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.fields
            .insert(key.into(), serde_json::to_value(value).unwrap_or_default());
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    fn fields_json(&self) -> String {
        serde_json::to_string(&self.fields).unwrap_or_default()
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new("Transaction", "TransactionHelper")
    }
}

/// Lifecycle of one transaction. `Committed` and `RolledBack` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Started,
    Committed,
    RolledBack,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionState::Started => "started",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

/// A connection reserved for one logical transaction.
///
/// Only the helper creates these; operations receive `&mut Transaction` and
/// cannot keep it past their own lifetime.
pub struct Transaction<C: Connector> {
    conn: PooledConnection<C>,
    db: Database<C>,
    state: TransactionState,
}

impl<C: Connector> Transaction<C> {
    /// Run a statement inside the transaction.
    pub async fn query(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<RowOf<C>>, DatabaseError> {
        self.db.run_timed(&mut *self.conn, sql, params).await
    }

    /// Run a statement inside the transaction with query logging.
    pub async fn execute_query(
        &mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<Vec<RowOf<C>>, DatabaseError> {
        self.db.execute_query(sql, params, Some(&mut *self.conn)).await
    }

    /// The underlying session, for client-specific calls.
    pub fn connection(&mut self) -> &mut C::Connection {
        &mut self.conn
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    async fn run<T, E, F>(&mut self, context: &OperationContext, operation: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut Transaction<C>) -> BoxFuture<'t, Result<T, E>>,
        E: From<DatabaseError> + fmt::Display + fmt::Debug,
    {
        let module = context.module();
        let name = context.operation();
        let fields = context.fields_json();

        tracing::info!(context = %fields, "[{}] {} - START", module, name);

        let begin = self.query("BEGIN", &[]).await;
        let outcome = match begin {
            Ok(_) => {
                let result = operation(&mut *self).await;
                match result {
                    Ok(value) => {
                        let commit = self.query("COMMIT", &[]).await;
                        commit.map(|_| value).map_err(E::from)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(E::from(e)),
        };

        match outcome {
            Ok(value) => {
                self.state = TransactionState::Committed;
                self.db.monitor.record_commit();
                tracing::info!(context = %fields, "[{}] {} - COMPLETE", module, name);
                Ok(value)
            }
            Err(err) => {
                tracing::error!(
                    context = %fields,
                    error = %err,
                    error_details = ?err,
                    "[{}] {} - ERROR",
                    module,
                    name
                );
                self.rollback(context).await;
                Err(err)
            }
        }
    }

    /// Best-effort rollback. A failure is logged on its own and the session
    /// is closed instead of going back to the idle set.
    async fn rollback(&mut self, context: &OperationContext) {
        let module = context.module();
        let name = context.operation();

        let rollback = self.query("ROLLBACK", &[]).await;
        match rollback {
            Ok(_) => {
                self.db.monitor.record_rollback();
                tracing::info!(
                    context = %context.fields_json(),
                    "[{}] {} - ROLLBACK COMPLETE",
                    module,
                    name
                );
            }
            Err(rollback_err) => {
                self.conn.mark_broken();
                TransactionMetrics::record_rollback_failed();
                tracing::error!(error = %rollback_err, "[{}] Rollback failed", module);
            }
        }
        self.state = TransactionState::RolledBack;
    }
}

impl<C: Connector> Drop for Transaction<C> {
    fn drop(&mut self) {
        if self.state == TransactionState::Started {
            self.conn.mark_broken();
            tracing::warn!("Transaction abandoned before completion, closing its connection");
        }
    }
}

impl<C: Connector> Database<C> {
    /// Run `operation` inside `BEGIN`/`COMMIT` on a dedicated connection.
    ///
    /// Any error from the operation, `BEGIN` or `COMMIT` triggers a
    /// `ROLLBACK` attempt and is then returned unchanged. Nothing is retried.
    ///
    /// ```rust,ignore
    /// let ctx = OperationContext::new("CreateKitchen", "KitchenService")
    ///     .with_field("kitchen_ref", "KBR-001");
    /// let id = db
    ///     .execute_transaction(&ctx, |tx| {
    ///         Box::pin(async move {
    ///             tx.query("INSERT INTO kitchens (name) VALUES ($1)", &["Al Bayt".into()]).await?;
    ///             Ok::<_, DatabaseError>(1)
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn execute_transaction<T, E, F>(&self, context: &OperationContext, operation: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut Transaction<C>) -> BoxFuture<'t, Result<T, E>>,
        E: From<DatabaseError> + fmt::Display + fmt::Debug,
    {
        let span = tracing::info_span!(
            "transaction",
            module = %context.module(),
            operation = %context.operation(),
            trace_id = context.trace_id().unwrap_or_default(),
        );

        async move {
            let conn = match self.pool.acquire().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        "[{}] {} - could not reserve a connection",
                        context.module(),
                        context.operation()
                    );
                    return Err(E::from(e));
                }
            };

            let mut tx = Transaction {
                conn,
                db: self.clone(),
                state: TransactionState::Started,
            };
            let result = tx.run(context, operation).await;

            tracing::debug!(state = %tx.state, "Transaction finished");
            drop(tx);
            result
        }
        .instrument(span)
        .await
    }
}
