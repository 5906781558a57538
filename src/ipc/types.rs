use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::model::Caller;
use crate::notify::Notifier;
use crate::payroll::WageTable;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub caller: Option<Caller>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub wages: WageTable,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(wages: WageTable, notifier: Arc<dyn Notifier>) -> Self {
        AppState {
            workspace: None,
            db: None,
            wages,
            notifier,
        }
    }

    pub fn conn(&self) -> AppResult<&Connection> {
        self.db.as_ref().ok_or(AppError::NoWorkspace)
    }
}
