#![forbid(unsafe_code)]
//! Deletes for the background reaper: derived rows of jobs that finished
//! long enough ago. Each call is one short transaction.

use super::*;
use rusqlite::params;

// Only these parent statuses are reaped; complete_with_errors jobs keep
// their rows for the explicit per-job cleanup path.
const REAPABLE_PARENT_PREDICATE: &str =
    "SELECT job_id FROM jobs WHERE status IN ('failed', 'successful', 'canceled') AND updated_at_ms < ?1";

impl SqliteStore {
    /// Delete work items whose parent job is terminal and idle since before
    /// `threshold_ms`. Returns the number of rows removed.
    pub fn reap_work_items(&mut self, threshold_ms: i64) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute(
            &format!("DELETE FROM work_items WHERE job_id IN ({REAPABLE_PARENT_PREDICATE})"),
            params![threshold_ms],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    /// Same predicate as `reap_work_items`, applied to workflow steps.
    pub fn reap_workflow_steps(&mut self, threshold_ms: i64) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute(
            &format!("DELETE FROM workflow_steps WHERE job_id IN ({REAPABLE_PARENT_PREDICATE})"),
            params![threshold_ms],
        )?;
        tx.commit()?;
        Ok(deleted)
    }
}
