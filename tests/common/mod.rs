//! In-memory client used to drive the pool without a database server.
//!
//! Every statement is recorded with its parameters. Individual statements can
//! be made to fail, to take a fixed amount of (tokio) time or to return canned
//! rows. [`CapturedLogs`] collects emitted log events for assertions.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use kitchen_database::database::Database;
use kitchen_database::error::DatabaseError;
use kitchen_database::maintenance::CatalogRow;
use kitchen_database::pool::{Connector, DbConnection, PoolOptions, SqlParam};

/// Single-column row returned by [`MockConnection`].
#[derive(Debug, Clone, PartialEq)]
pub struct MockRow(pub String);

impl MockRow {
    pub fn flag(value: bool) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for MockRow {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl CatalogRow for MockRow {
    fn bool_column(&self, _index: usize) -> Result<bool, DatabaseError> {
        self.0
            .parse()
            .map_err(|_| driver_error(format!("not a boolean: {}", self.0)))
    }

    fn text_column(&self, _index: usize) -> Result<String, DatabaseError> {
        Ok(self.0.clone())
    }
}

type Responder = Box<dyn Fn(&str, &[SqlParam]) -> Option<Vec<MockRow>> + Send + Sync>;

/// First text parameter of a statement, if any.
pub fn text_param(params: &[SqlParam]) -> Option<&str> {
    match params.first() {
        Some(SqlParam::Text(value)) => Some(value.as_str()),
        _ => None,
    }
}

#[derive(Default)]
pub struct MockBackend {
    statements: Mutex<Vec<String>>,
    calls: Mutex<Vec<(String, Vec<SqlParam>)>>,
    responder: Mutex<Option<Responder>>,
    failing: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    fail_connect: AtomicBool,
    fail_ping: AtomicBool,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Statements run so far, across all connections.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    /// Statements with their bound parameters.
    pub fn calls(&self) -> Vec<(String, Vec<SqlParam>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Produce rows for matching statements. Returning `None` falls back to
    /// echoing the statement text.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&str, &[SqlParam]) -> Option<Vec<MockRow>> + Send + Sync + 'static,
    {
        *self.responder.lock().unwrap() = Some(Box::new(responder));
    }

    pub fn count(&self, sql: &str) -> usize {
        self.statements().iter().filter(|s| s.as_str() == sql).count()
    }

    pub fn fail_statement(&self, sql: &str) {
        self.failing.lock().unwrap().insert(sql.to_string());
    }

    pub fn delay_statement(&self, sql: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(sql.to_string(), delay);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_ping(&self, fail: bool) {
        self.fail_ping.store(fail, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct MockConnector {
    backend: Arc<MockBackend>,
}

impl MockConnector {
    pub fn new(backend: Arc<MockBackend>) -> Self {
        Self { backend }
    }
}

pub struct MockConnection {
    backend: Arc<MockBackend>,
}

fn driver_error(message: impl Into<String>) -> DatabaseError {
    DatabaseError::Driver(sqlx::Error::Protocol(message.into()))
}

#[async_trait]
impl DbConnection for MockConnection {
    type Row = MockRow;

    async fn query(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<MockRow>, DatabaseError> {
        self.backend.statements.lock().unwrap().push(sql.to_string());
        self.backend
            .calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));

        let delay = self.backend.delays.lock().unwrap().get(sql).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.backend.failing.lock().unwrap().contains(sql) {
            return Err(driver_error(format!("statement failed: {sql}")));
        }

        let canned = self
            .backend
            .responder
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|respond| respond(sql, params));
        Ok(canned.unwrap_or_else(|| vec![MockRow(sql.to_string())]))
    }

    async fn server_time(&mut self) -> Result<DateTime<Utc>, DatabaseError> {
        Ok(Utc::now())
    }

    async fn ping(&mut self) -> Result<(), DatabaseError> {
        if self.backend.fail_ping.load(Ordering::SeqCst) {
            return Err(driver_error("connection reset by peer"));
        }
        Ok(())
    }

    async fn close(self) -> Result<(), DatabaseError> {
        self.backend.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self) -> Result<MockConnection, DatabaseError> {
        if self.backend.fail_connect.load(Ordering::SeqCst) {
            return Err(driver_error("connection refused"));
        }
        self.backend.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            backend: self.backend.clone(),
        })
    }
}

pub type MockDatabase = Database<MockConnector>;

pub fn mock_database(options: PoolOptions) -> (MockDatabase, Arc<MockBackend>) {
    let backend = MockBackend::new();
    let db = Database::new(MockConnector::new(backend.clone()), options).unwrap();
    (db, backend)
}

pub fn default_mock_database() -> (MockDatabase, Arc<MockBackend>) {
    mock_database(PoolOptions::default())
}

/// Let spawned tasks (background closes, queued acquirers) make progress.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// A log event seen by [`CapturedLogs`].
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn message(&self) -> &str {
        self.fields.get("message").map(String::as_str).unwrap_or_default()
    }
}

#[derive(Default)]
struct FieldRecorder(HashMap<String, String>);

impl Visit for FieldRecorder {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

/// Layer that keeps every event emitted while it is the thread default.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    /// Install for the current thread until the guard is dropped.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let logs = Self::default();
        let subscriber = tracing_subscriber::registry().with(logs.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (logs, guard)
    }

    pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.message() == message)
            .cloned()
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut recorder = FieldRecorder::default();
        event.record(&mut recorder);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            fields: recorder.0,
        });
    }
}
