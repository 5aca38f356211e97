#![forbid(unsafe_code)]

use super::*;
use rusqlite::{OptionalExtension, Transaction, params};
use sy_core::ids::JobId;

const MAX_STEPS_PER_JOB: usize = 64;

fn read_step_row(row: &rusqlite::Row<'_>) -> Result<WorkflowStepRow, rusqlite::Error> {
    Ok(WorkflowStepRow {
        id: row.get(0)?,
        job_id: row.get(1)?,
        service_id: row.get(2)?,
        step_index: row.get(3)?,
        work_item_count: row.get(4)?,
        completed_work_item_count: row.get(5)?,
        progress_weight: row.get(6)?,
        created_at_ms: row.get(7)?,
        updated_at_ms: row.get(8)?,
    })
}

const STEP_COLUMNS: &str = "id, job_id, service_id, step_index, work_item_count, completed_work_item_count, progress_weight, created_at_ms, updated_at_ms";

/// Per-step completion ratios in chain order. A step's ratio is its
/// completed fraction, capped by the step before it: a downstream step's
/// items are materialized from the upstream step's output, so it cannot
/// truthfully be further along.
pub fn step_progress_ratios(steps: &[WorkflowStepRow]) -> Vec<f64> {
    let mut prev: Option<f64> = None;
    steps
        .iter()
        .map(|step| {
            let denominator = step.work_item_count.max(1) as f64;
            let mut ratio = (step.completed_work_item_count as f64 / denominator).clamp(0.0, 1.0);
            if let Some(prev_ratio) = prev {
                ratio = ratio.min(prev_ratio);
            }
            prev = Some(ratio);
            ratio
        })
        .collect()
}

/// Weighted rollup candidate for the job-level progress column, clamped to
/// [0, 99]: only the terminal completion path may write 100.
pub fn rollup_candidate(steps: &[WorkflowStepRow]) -> i64 {
    let ratios = step_progress_ratios(steps);
    let weighted: f64 = steps
        .iter()
        .zip(ratios.iter())
        .map(|(step, ratio)| step.progress_weight * ratio)
        .sum();
    let total: f64 = steps
        .iter()
        .map(|step| step.progress_weight)
        .sum::<f64>()
        .max(1.0);
    ((weighted / total).floor() as i64).clamp(0, 99)
}

pub(in crate::store) fn workflow_steps_for_job_tx(
    tx: &Transaction<'_>,
    job_id: &str,
) -> Result<Vec<WorkflowStepRow>, StoreError> {
    let mut stmt = tx.prepare(&format!(
        "SELECT {STEP_COLUMNS} FROM workflow_steps WHERE job_id=?1 ORDER BY step_index ASC"
    ))?;
    let rows = stmt.query_map(params![job_id], read_step_row)?;
    let mut steps = Vec::new();
    for row in rows {
        steps.push(row?);
    }
    Ok(steps)
}

// Completion lands on the earliest step of the pair that still has room;
// a chain may route through the same service more than once.
pub(in crate::store) fn increment_completed_count_tx(
    tx: &Transaction<'_>,
    job_id: &str,
    service_id: &str,
    now_ms: i64,
) -> Result<(), StoreError> {
    tx.execute(
        r#"
        UPDATE workflow_steps
        SET completed_work_item_count = completed_work_item_count + 1, updated_at_ms=?3
        WHERE id = (
          SELECT id FROM workflow_steps
          WHERE job_id=?1 AND service_id=?2
            AND completed_work_item_count < work_item_count
          ORDER BY step_index ASC
          LIMIT 1
        )
        "#,
        params![job_id, service_id, now_ms],
    )?;
    Ok(())
}

/// Monotone rollup: the jobs row is only touched when the candidate beats
/// the stored progress. Returns the progress after the call.
pub(in crate::store) fn update_job_progress_tx(
    tx: &Transaction<'_>,
    job_id: &str,
    now_ms: i64,
) -> Result<i64, StoreError> {
    let steps = workflow_steps_for_job_tx(tx, job_id)?;
    let candidate = rollup_candidate(&steps);
    tx.execute(
        "UPDATE jobs SET progress=?2, updated_at_ms=?3 WHERE job_id=?1 AND progress < ?2",
        params![job_id, candidate, now_ms],
    )?;
    let progress: Option<i64> = tx
        .query_row(
            "SELECT progress FROM jobs WHERE job_id=?1",
            params![job_id],
            |row| row.get(0),
        )
        .optional()?;
    progress.ok_or_else(|| StoreError::UnknownJob {
        job_id: job_id.to_string(),
    })
}

impl SqliteStore {
    pub fn workflow_steps_create(
        &mut self,
        job_id: &JobId,
        steps: Vec<NewWorkflowStep>,
    ) -> Result<Vec<WorkflowStepRow>, StoreError> {
        if steps.is_empty() {
            return Err(StoreError::InvalidInput("at least one step is required"));
        }
        if steps.len() > MAX_STEPS_PER_JOB {
            return Err(StoreError::InvalidInput("too many workflow steps"));
        }
        for step in &steps {
            if step.work_item_count < 0 {
                return Err(StoreError::InvalidInput(
                    "work_item_count must not be negative",
                ));
            }
            if !(step.progress_weight.is_finite() && step.progress_weight > 0.0) {
                return Err(StoreError::InvalidInput("progress_weight must be positive"));
            }
        }

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        let job_id_str = job_id.to_string();
        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM jobs WHERE job_id=?1",
                params![job_id_str],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::UnknownJob { job_id: job_id_str });
        }

        let mut rows = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let step_index = (index + 1) as i64;
            tx.execute(
                r#"
                INSERT INTO workflow_steps(
                  job_id, service_id, step_index, work_item_count,
                  completed_work_item_count, progress_weight, created_at_ms, updated_at_ms
                )
                VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?6)
                "#,
                params![
                    job_id_str,
                    step.service_id.as_str(),
                    step_index,
                    step.work_item_count,
                    step.progress_weight,
                    now_ms
                ],
            )?;
            rows.push(WorkflowStepRow {
                id: tx.last_insert_rowid(),
                job_id: job_id_str.clone(),
                service_id: step.service_id.as_str().to_string(),
                step_index,
                work_item_count: step.work_item_count,
                completed_work_item_count: 0,
                progress_weight: step.progress_weight,
                created_at_ms: now_ms,
                updated_at_ms: now_ms,
            });
        }

        tx.commit()?;
        Ok(rows)
    }

    pub fn workflow_steps_for_job(
        &mut self,
        job_id: &JobId,
    ) -> Result<Vec<WorkflowStepRow>, StoreError> {
        let tx = self.conn.transaction()?;
        let steps = workflow_steps_for_job_tx(&tx, &job_id.to_string())?;
        tx.commit()?;
        Ok(steps)
    }

    pub fn job_update_progress(&mut self, job_id: &JobId) -> Result<i64, StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        let progress = update_job_progress_tx(&tx, &job_id.to_string(), now_ms)?;
        tx.commit()?;
        Ok(progress)
    }
}
