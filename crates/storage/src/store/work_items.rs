#![forbid(unsafe_code)]

use super::jobs::{job_by_id_tx, job_save_tx};
use super::user_work::{
    decrement_running_count_tx, increment_ready_and_decrement_running_tx,
    increment_ready_count_tx, delete_user_work_for_job_tx, set_ready_count_to_zero_tx,
};
use super::workflow_steps::{
    increment_completed_count_tx, update_job_progress_tx, workflow_steps_for_job_tx,
};
use super::*;
use rusqlite::{OptionalExtension, Transaction, TransactionBehavior, params};
use sy_core::ids::{JobId, ServiceId};
use sy_core::status::JobStatus;

const MAX_ITEMS_PER_BATCH: usize = 10_000;
const DEFAULT_FAILURE_MESSAGE: &str = "work item failed";

fn read_work_item_row(row: &rusqlite::Row<'_>) -> Result<(i64, String, String, String, i64, i64), rusqlite::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn to_work_item_row(
    raw: (i64, String, String, String, i64, i64),
) -> Result<WorkItemRow, StoreError> {
    let (id, job_id, service_id, status, created_at_ms, updated_at_ms) = raw;
    let status = WorkItemStatus::parse(&status)
        .ok_or(StoreError::CorruptRow("stored work item status is unknown"))?;
    Ok(WorkItemRow {
        id,
        job_id,
        service_id,
        status,
        created_at_ms,
        updated_at_ms,
    })
}

pub(in crate::store) fn work_item_by_id_tx(
    tx: &Transaction<'_>,
    item_id: i64,
) -> Result<Option<WorkItemRow>, StoreError> {
    let raw = tx
        .query_row(
            r#"
            SELECT id, job_id, service_id, status, created_at_ms, updated_at_ms
            FROM work_items
            WHERE id=?1
            "#,
            params![item_id],
            read_work_item_row,
        )
        .optional()?;
    raw.map(to_work_item_row).transpose()
}

pub(in crate::store) fn claim_oldest_ready_item_tx(
    tx: &Transaction<'_>,
    job_id: &str,
    service_id: &str,
    now_ms: i64,
) -> Result<Option<WorkItemRow>, StoreError> {
    let raw = tx
        .query_row(
            r#"
            SELECT id, job_id, service_id, status, created_at_ms, updated_at_ms
            FROM work_items
            WHERE job_id=?1 AND service_id=?2 AND status='ready'
            ORDER BY id ASC
            LIMIT 1
            "#,
            params![job_id, service_id],
            read_work_item_row,
        )
        .optional()?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let mut item = to_work_item_row(raw)?;
    tx.execute(
        "UPDATE work_items SET status='running', updated_at_ms=?2 WHERE id=?1",
        params![item.id, now_ms],
    )?;
    item.status = WorkItemStatus::Running;
    item.updated_at_ms = now_ms;
    Ok(Some(item))
}

fn insert_job_error_tx(
    tx: &Transaction<'_>,
    job_id: &str,
    message: &str,
    now_ms: i64,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO job_errors(job_id, url, message, created_at_ms) VALUES (?1, NULL, ?2, ?3)",
        params![job_id, message, now_ms],
    )?;
    Ok(())
}

impl SqliteStore {
    /// Materialize `n` ready items for the pair and account for them in the
    /// fairness queue.
    pub fn work_items_create(
        &mut self,
        job_id: &JobId,
        service_id: &ServiceId,
        n: usize,
    ) -> Result<Vec<i64>, StoreError> {
        if n == 0 {
            return Err(StoreError::InvalidInput("item count must be > 0"));
        }
        if n > MAX_ITEMS_PER_BATCH {
            return Err(StoreError::InvalidInput("item count exceeds batch cap"));
        }
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        let job_id_str = job_id.to_string();

        let mut ids = Vec::with_capacity(n);
        for _ in 0..n {
            tx.execute(
                r#"
                INSERT INTO work_items(job_id, service_id, status, created_at_ms, updated_at_ms)
                VALUES (?1, ?2, 'ready', ?3, ?3)
                "#,
                params![job_id_str, service_id.as_str(), now_ms],
            )?;
            ids.push(tx.last_insert_rowid());
        }
        increment_ready_count_tx(&tx, &job_id_str, service_id.as_str(), n as i64, now_ms)?;

        tx.commit()?;
        Ok(ids)
    }

    pub fn work_item_by_id(&mut self, item_id: i64) -> Result<Option<WorkItemRow>, StoreError> {
        let tx = self.conn.transaction()?;
        let item = work_item_by_id_tx(&tx, item_id)?;
        tx.commit()?;
        Ok(item)
    }

    pub fn work_items_for_job(&mut self, job_id: &JobId) -> Result<Vec<WorkItemRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, job_id, service_id, status, created_at_ms, updated_at_ms
            FROM work_items
            WHERE job_id=?1
            ORDER BY id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![job_id.to_string()], read_work_item_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(to_work_item_row(row?)?);
        }
        Ok(items)
    }

    /// Hand a running item back to the queue (worker gave up the claim).
    pub fn work_item_retry(&mut self, item_id: i64) -> Result<WorkItemRow, StoreError> {
        let now_ms = now_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(mut item) = work_item_by_id_tx(&tx, item_id)? else {
            return Err(StoreError::UnknownWorkItem { id: item_id });
        };
        if item.status != WorkItemStatus::Running {
            return Err(StoreError::InvalidInput("work item is not running"));
        }
        tx.execute(
            "UPDATE work_items SET status='ready', updated_at_ms=?2 WHERE id=?1",
            params![item_id, now_ms],
        )?;
        increment_ready_and_decrement_running_tx(&tx, &item.job_id, &item.service_id, now_ms)?;
        tx.commit()?;
        item.status = WorkItemStatus::Ready;
        item.updated_at_ms = now_ms;
        Ok(item)
    }

    /// Terminal completion of a dispatched item. Redelivered completions
    /// (item already terminal) are a no-op so at-least-once delivery stays
    /// safe. On the last completion of the last step the job itself is
    /// transitioned.
    pub fn work_item_complete(
        &mut self,
        item_id: i64,
        disposition: WorkItemDisposition,
        message: Option<&str>,
    ) -> Result<WorkItemCompleteResult, StoreError> {
        let now_ms = now_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(item) = work_item_by_id_tx(&tx, item_id)? else {
            return Err(StoreError::UnknownWorkItem { id: item_id });
        };

        let job_id = JobId::try_new(&item.job_id)
            .map_err(|_| StoreError::CorruptRow("stored job_id is not a UUID"))?;

        if item.status.is_terminal() {
            let Some(job) = job_by_id_tx(&tx, &job_id, false, false)? else {
                return Err(StoreError::UnknownJob { job_id: item.job_id });
            };
            tx.commit()?;
            return Ok(WorkItemCompleteResult {
                applied: false,
                job_status: job.status,
                job_progress: job.progress,
            });
        }
        if item.status != WorkItemStatus::Running {
            return Err(StoreError::InvalidInput("work item has not been dispatched"));
        }

        tx.execute(
            "UPDATE work_items SET status=?2, updated_at_ms=?3 WHERE id=?1",
            params![item_id, disposition.status().as_str(), now_ms],
        )?;
        decrement_running_count_tx(&tx, &item.job_id, &item.service_id, now_ms)?;
        increment_completed_count_tx(&tx, &item.job_id, &item.service_id, now_ms)?;

        let Some(mut job) = job_by_id_tx(&tx, &job_id, false, false)? else {
            return Err(StoreError::UnknownJob { job_id: item.job_id });
        };

        // The job row is written back only when this completion moved it; a
        // straggler finishing after the job went terminal must still land
        // its counter updates.
        let mut job_dirty = false;

        if disposition == WorkItemDisposition::Failed {
            let failure = message.unwrap_or(DEFAULT_FAILURE_MESSAGE);
            insert_job_error_tx(&tx, &item.job_id, failure, now_ms)?;
            if job.ignore_errors {
                if job.status == JobStatus::Running {
                    job.update_status(JobStatus::RunningWithErrors, None);
                    job_dirty = true;
                }
            } else if !job.has_terminal_status() {
                job.fail(Some(failure)).map_err(StoreError::Conflict)?;
                set_ready_count_to_zero_tx(&tx, &item.job_id, now_ms)?;
                job_dirty = true;
            }
        }

        if job.status.is_active() {
            job.progress = update_job_progress_tx(&tx, &item.job_id, now_ms)?;
        }

        if matches!(
            job.status,
            JobStatus::Running | JobStatus::RunningWithErrors
        ) {
            let steps = workflow_steps_for_job_tx(&tx, &item.job_id)?;
            let all_complete = !steps.is_empty() && steps.iter().all(WorkflowStepRow::is_complete);
            if all_complete {
                if job.status == JobStatus::Running {
                    job.succeed(None).map_err(StoreError::Conflict)?;
                } else {
                    job.complete_with_errors(None).map_err(StoreError::Conflict)?;
                }
                delete_user_work_for_job_tx(&tx, &item.job_id)?;
                job_dirty = true;
            }
        }

        if job_dirty {
            job_save_tx(&tx, &mut job, now_ms)?;
        }
        tx.commit()?;
        Ok(WorkItemCompleteResult {
            applied: true,
            job_status: job.status,
            job_progress: job.progress,
        })
    }
}
