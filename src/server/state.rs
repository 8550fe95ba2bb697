use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::database::Database;
use crate::pool::Connector;

pub struct AppState<C: Connector> {
    pub settings: Arc<Settings>,
    pub db: Database<C>,
    pub start_time: Instant,
}

impl<C: Connector> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            db: self.db.clone(),
            start_time: self.start_time,
        }
    }
}

impl<C: Connector> AppState<C> {
    pub fn new(settings: Settings, db: Database<C>) -> Self {
        Self {
            settings: Arc::new(settings),
            db,
            start_time: Instant::now(),
        }
    }
}
