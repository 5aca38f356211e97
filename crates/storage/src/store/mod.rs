#![forbid(unsafe_code)]
//! Storage implementation (split-friendly module root).

mod dispatch;
mod error;
mod jobs;
mod providers;
mod reap;
mod support;
mod types;
mod user_work;
mod work_items;
mod workflow_steps;

use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub use error::StoreError;
pub use types::*;
pub use workflow_steps::{rollup_candidate, step_progress_ratios};

use support::*;

#[derive(Debug)]
pub struct SqliteStore {
    storage_dir: PathBuf,
    conn: Connection,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;
        let db_path = storage_dir.join("switchyard.db");
        let conn = Connection::open(db_path)?;
        let store = Self { storage_dir, conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn migrate(&self) -> Result<(), StoreError> {
        migrate_sqlite_schema(&self.conn)
    }
}
