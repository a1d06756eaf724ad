//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::DbAdapter;
use crate::config::Config;
use chrono::{NaiveDate, Utc};
use library_core::ports::{ActivityLog, LibraryStore, NotificationSink};
use library_core::Circulation;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LibraryStore>,
    pub notifications: Arc<dyn NotificationSink>,
    pub activity: Arc<dyn ActivityLog>,
    pub circulation: Circulation,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires every port to the same database adapter.
    pub fn new(db: Arc<DbAdapter>, config: Arc<Config>) -> Self {
        let store: Arc<dyn LibraryStore> = db.clone();
        let notifications: Arc<dyn NotificationSink> = db.clone();
        let activity: Arc<dyn ActivityLog> = db;
        Self {
            circulation: Circulation::new(store.clone(), notifications.clone(), activity.clone()),
            store,
            notifications,
            activity,
            config,
        }
    }

    /// The circulation day used for due dates, returns and payments.
    pub fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}
