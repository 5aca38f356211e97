#![forbid(unsafe_code)]

use super::*;
use rusqlite::{OptionalExtension, Transaction, params};
use sy_core::ids::{JobId, ServiceId};

fn read_user_work_row(row: &rusqlite::Row<'_>) -> Result<UserWorkRow, rusqlite::Error> {
    Ok(UserWorkRow {
        id: row.get(0)?,
        job_id: row.get(1)?,
        service_id: row.get(2)?,
        username: row.get(3)?,
        ready_count: row.get(4)?,
        running_count: row.get(5)?,
        last_worked_ms: row.get(6)?,
        created_at_ms: row.get(7)?,
        updated_at_ms: row.get(8)?,
    })
}

const USER_WORK_COLUMNS: &str = "id, job_id, service_id, username, ready_count, running_count, last_worked_ms, created_at_ms, updated_at_ms";

fn job_username_tx(tx: &Transaction<'_>, job_id: &str) -> Result<String, StoreError> {
    tx.query_row(
        "SELECT username FROM jobs WHERE job_id=?1",
        params![job_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| StoreError::UnknownJob {
        job_id: job_id.to_string(),
    })
}

pub(in crate::store) fn ensure_user_work_row_tx(
    tx: &Transaction<'_>,
    job_id: &str,
    service_id: &str,
    now_ms: i64,
) -> Result<(), StoreError> {
    let username = job_username_tx(tx, job_id)?;
    tx.execute(
        r#"
        INSERT OR IGNORE INTO user_work(
          job_id, service_id, username, ready_count, running_count,
          last_worked_ms, created_at_ms, updated_at_ms
        )
        VALUES (?1, ?2, ?3, 0, 0, ?4, ?4, ?4)
        "#,
        params![job_id, service_id, username, now_ms],
    )?;
    Ok(())
}

pub(in crate::store) fn increment_ready_count_tx(
    tx: &Transaction<'_>,
    job_id: &str,
    service_id: &str,
    n: i64,
    now_ms: i64,
) -> Result<(), StoreError> {
    ensure_user_work_row_tx(tx, job_id, service_id, now_ms)?;
    tx.execute(
        r#"
        UPDATE user_work
        SET ready_count = ready_count + ?3, updated_at_ms=?4
        WHERE job_id=?1 AND service_id=?2
        "#,
        params![job_id, service_id, n, now_ms],
    )?;
    Ok(())
}

// Dispatch is the touch point the fairness ordering keys on, so the claim
// also advances last_worked_ms.
pub(in crate::store) fn increment_running_and_decrement_ready_tx(
    tx: &Transaction<'_>,
    job_id: &str,
    service_id: &str,
    now_ms: i64,
) -> Result<(), StoreError> {
    tx.execute(
        r#"
        UPDATE user_work
        SET running_count = running_count + 1,
            ready_count = ready_count - 1,
            last_worked_ms = ?3,
            updated_at_ms = ?3
        WHERE job_id=?1 AND service_id=?2
        "#,
        params![job_id, service_id, now_ms],
    )?;
    Ok(())
}

pub(in crate::store) fn increment_ready_and_decrement_running_tx(
    tx: &Transaction<'_>,
    job_id: &str,
    service_id: &str,
    now_ms: i64,
) -> Result<(), StoreError> {
    tx.execute(
        r#"
        UPDATE user_work
        SET ready_count = ready_count + 1,
            running_count = running_count - 1,
            updated_at_ms = ?3
        WHERE job_id=?1 AND service_id=?2
        "#,
        params![job_id, service_id, now_ms],
    )?;
    Ok(())
}

pub(in crate::store) fn decrement_running_count_tx(
    tx: &Transaction<'_>,
    job_id: &str,
    service_id: &str,
    now_ms: i64,
) -> Result<(), StoreError> {
    tx.execute(
        r#"
        UPDATE user_work
        SET running_count = running_count - 1, updated_at_ms=?3
        WHERE job_id=?1 AND service_id=?2
        "#,
        params![job_id, service_id, now_ms],
    )?;
    Ok(())
}

pub(in crate::store) fn set_ready_count_to_zero_tx(
    tx: &Transaction<'_>,
    job_id: &str,
    now_ms: i64,
) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE user_work SET ready_count = 0, updated_at_ms=?2 WHERE job_id=?1",
        params![job_id, now_ms],
    )?;
    Ok(())
}

pub(in crate::store) fn delete_user_work_for_job_tx(
    tx: &Transaction<'_>,
    job_id: &str,
) -> Result<usize, StoreError> {
    Ok(tx.execute("DELETE FROM user_work WHERE job_id=?1", params![job_id])?)
}

pub(in crate::store) fn next_username_for_work_tx(
    tx: &Transaction<'_>,
    service_id: &str,
) -> Result<Option<String>, StoreError> {
    // Least-loaded user first; the longest-starved user breaks ties.
    Ok(tx
        .query_row(
            r#"
            SELECT username
            FROM user_work
            WHERE service_id=?1 AND ready_count > 0
            GROUP BY username
            ORDER BY SUM(running_count) ASC, MAX(last_worked_ms) ASC
            LIMIT 1
            "#,
            params![service_id],
            |row| row.get(0),
        )
        .optional()?)
}

pub(in crate::store) fn next_job_id_for_username_and_service_tx(
    tx: &Transaction<'_>,
    service_id: &str,
    username: &str,
) -> Result<Option<String>, StoreError> {
    Ok(tx
        .query_row(
            r#"
            SELECT job_id
            FROM user_work
            WHERE service_id=?1 AND username=?2 AND ready_count > 0
            ORDER BY last_worked_ms ASC
            LIMIT 1
            "#,
            params![service_id, username],
            |row| row.get(0),
        )
        .optional()?)
}

impl SqliteStore {
    pub fn increment_ready_count(
        &mut self,
        job_id: &JobId,
        service_id: &ServiceId,
        n: i64,
    ) -> Result<(), StoreError> {
        if n < 0 {
            return Err(StoreError::InvalidInput("ready increment must be >= 0"));
        }
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        increment_ready_count_tx(&tx, &job_id.to_string(), service_id.as_str(), n, now_ms)?;
        tx.commit()?;
        Ok(())
    }

    pub fn increment_running_and_decrement_ready(
        &mut self,
        job_id: &JobId,
        service_id: &ServiceId,
    ) -> Result<(), StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        increment_running_and_decrement_ready_tx(
            &tx,
            &job_id.to_string(),
            service_id.as_str(),
            now_ms,
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn increment_ready_and_decrement_running(
        &mut self,
        job_id: &JobId,
        service_id: &ServiceId,
    ) -> Result<(), StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        increment_ready_and_decrement_running_tx(
            &tx,
            &job_id.to_string(),
            service_id.as_str(),
            now_ms,
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn decrement_running_count(
        &mut self,
        job_id: &JobId,
        service_id: &ServiceId,
    ) -> Result<(), StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        decrement_running_count_tx(&tx, &job_id.to_string(), service_id.as_str(), now_ms)?;
        tx.commit()?;
        Ok(())
    }

    /// Bulk-zero the ready counts across every service of the job; invoked
    /// on pause so nothing further is dispatched.
    pub fn set_ready_count_to_zero(&mut self, job_id: &JobId) -> Result<(), StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        set_ready_count_to_zero_tx(&tx, &job_id.to_string(), now_ms)?;
        tx.commit()?;
        Ok(())
    }

    pub fn delete_user_work_for_job(&mut self, job_id: &JobId) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let deleted = delete_user_work_for_job_tx(&tx, &job_id.to_string())?;
        tx.commit()?;
        Ok(deleted)
    }

    pub fn delete_user_work_for_job_and_service(
        &mut self,
        job_id: &JobId,
        service_id: &ServiceId,
    ) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM user_work WHERE job_id=?1 AND service_id=?2",
            params![job_id.to_string(), service_id.as_str()],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    /// Rows with both counters at zero carry no dispatch state; drop them.
    pub fn delete_orphaned_rows(&mut self) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM user_work WHERE ready_count = 0 AND running_count = 0",
            params![],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    pub fn queued_and_running_count_for_service(
        &self,
        service_id: &ServiceId,
    ) -> Result<i64, StoreError> {
        Ok(self.conn.query_row(
            r#"
            SELECT COALESCE(SUM(ready_count), 0) + COALESCE(SUM(running_count), 0)
            FROM user_work
            WHERE service_id=?1
            "#,
            params![service_id.as_str()],
            |row| row.get(0),
        )?)
    }

    /// Re-derive ready counts from the work-item table after a partial
    /// failure left the counters out of step.
    pub fn recalculate_ready_count(&mut self, job_id: &JobId) -> Result<(), StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        tx.execute(
            r#"
            UPDATE user_work
            SET ready_count = (
              SELECT COUNT(*)
              FROM work_items w
              WHERE w.job_id = user_work.job_id
                AND w.service_id = user_work.service_id
                AND w.status = 'ready'
            ),
            updated_at_ms = ?2
            WHERE job_id=?1
            "#,
            params![job_id.to_string(), now_ms],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Rebuild the whole table from work items. Jobs that are paused or
    /// previewing contribute nothing: their work must not be dispatched.
    pub fn populate_from_work_items(&mut self) -> Result<usize, StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM user_work", params![])?;
        let inserted = tx.execute(
            r#"
            INSERT INTO user_work(
              job_id, service_id, username, ready_count, running_count,
              last_worked_ms, created_at_ms, updated_at_ms
            )
            SELECT
              w.job_id,
              w.service_id,
              j.username,
              SUM(CASE WHEN w.status = 'ready' THEN 1 ELSE 0 END),
              SUM(CASE WHEN w.status = 'running' THEN 1 ELSE 0 END),
              j.updated_at_ms,
              ?1,
              ?1
            FROM work_items w
            JOIN jobs j ON j.job_id = w.job_id
            WHERE j.status NOT IN ('paused', 'previewing')
            GROUP BY w.job_id, w.service_id
            "#,
            params![now_ms],
        )?;
        tx.commit()?;
        Ok(inserted)
    }

    pub fn next_username_for_work(
        &mut self,
        service_id: &ServiceId,
    ) -> Result<Option<String>, StoreError> {
        let tx = self.conn.transaction()?;
        let username = next_username_for_work_tx(&tx, service_id.as_str())?;
        tx.commit()?;
        Ok(username)
    }

    pub fn next_job_id_for_username_and_service(
        &mut self,
        service_id: &ServiceId,
        username: &str,
    ) -> Result<Option<JobId>, StoreError> {
        let tx = self.conn.transaction()?;
        let job_id = next_job_id_for_username_and_service_tx(&tx, service_id.as_str(), username)?;
        tx.commit()?;
        match job_id {
            None => Ok(None),
            Some(raw) => JobId::try_new(&raw)
                .map(Some)
                .map_err(|_| StoreError::CorruptRow("stored job_id is not a UUID")),
        }
    }

    pub fn user_work_for_job(&mut self, job_id: &JobId) -> Result<Vec<UserWorkRow>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {USER_WORK_COLUMNS} FROM user_work WHERE job_id=?1 ORDER BY service_id ASC"
        ))?;
        let rows = stmt.query_map(params![job_id.to_string()], read_user_work_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
