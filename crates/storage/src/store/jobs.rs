#![forbid(unsafe_code)]

use super::*;
use rusqlite::{OptionalExtension, Transaction, TransactionBehavior, params};
use sy_core::fsm::ConflictError;
use sy_core::ids::JobId;
use sy_core::job::{Job, StatusMessages};
use sy_core::link::JobLink;
use sy_core::status::JobStatus;
use std::collections::BTreeSet;

mod query;

const MAX_USERNAME_LEN: usize = 128;
const MAX_LABEL_LEN: usize = 256;
const MAX_ERROR_MESSAGE_LEN: usize = 4_096;
const MAX_ERROR_LIST_LIMIT: usize = 200;

pub(in crate::store) fn normalize_username(raw: &str) -> Result<String, StoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoreError::InvalidInput("username must not be empty"));
    }
    if raw.len() > MAX_USERNAME_LEN {
        return Err(StoreError::InvalidInput("username is too long"));
    }
    Ok(raw.to_string())
}

// Labels are a set: trimmed, empties dropped, duplicates suppressed,
// deterministic order.
fn normalize_labels(labels: &[String]) -> Result<Vec<String>, StoreError> {
    let mut seen = BTreeSet::<String>::new();
    for label in labels {
        let trimmed = label.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.len() > MAX_LABEL_LEN {
            return Err(StoreError::InvalidInput("label is too long"));
        }
        seen.insert(trimmed.to_string());
    }
    Ok(seen.into_iter().collect())
}

pub(in crate::store) struct RawJobRow {
    id: i64,
    job_id: String,
    request_id: String,
    username: String,
    status: String,
    message: Option<String>,
    progress: i64,
    batches_completed: i64,
    request: String,
    is_async: i64,
    ignore_errors: i64,
    num_input_granules: i64,
    collection_ids: Option<String>,
    provider_id: Option<String>,
    service_name: Option<String>,
    destination_url: Option<String>,
    created_at_ms: i64,
    updated_at_ms: i64,
}

pub(in crate::store) const JOB_COLUMNS: &str = "id, job_id, request_id, username, status, message, progress, batches_completed, request, is_async, ignore_errors, num_input_granules, collection_ids, provider_id, service_name, destination_url, created_at_ms, updated_at_ms";

fn read_raw_job_row(row: &rusqlite::Row<'_>) -> Result<RawJobRow, rusqlite::Error> {
    Ok(RawJobRow {
        id: row.get(0)?,
        job_id: row.get(1)?,
        request_id: row.get(2)?,
        username: row.get(3)?,
        status: row.get(4)?,
        message: row.get(5)?,
        progress: row.get(6)?,
        batches_completed: row.get(7)?,
        request: row.get(8)?,
        is_async: row.get(9)?,
        ignore_errors: row.get(10)?,
        num_input_granules: row.get(11)?,
        collection_ids: row.get(12)?,
        provider_id: row.get(13)?,
        service_name: row.get(14)?,
        destination_url: row.get(15)?,
        created_at_ms: row.get(16)?,
        updated_at_ms: row.get(17)?,
    })
}

pub(in crate::store) fn raw_to_job(raw: RawJobRow) -> Result<Job, StoreError> {
    let status = JobStatus::parse(&raw.status)
        .ok_or(StoreError::CorruptRow("stored job status is unknown"))?;
    let job_id = JobId::try_new(&raw.job_id)
        .map_err(|_| StoreError::CorruptRow("stored job_id is not a UUID"))?;
    let request_id = JobId::try_new(&raw.request_id)
        .map_err(|_| StoreError::CorruptRow("stored request_id is not a UUID"))?;
    let messages = StatusMessages::decode(raw.message.as_deref(), status)?;
    let collection_ids = decode_json_string_list(raw.collection_ids)?;

    Ok(Job {
        id: Some(raw.id),
        job_id,
        request_id,
        username: raw.username,
        status,
        messages,
        progress: raw.progress,
        batches_completed: raw.batches_completed,
        request: raw.request,
        is_async: raw.is_async != 0,
        ignore_errors: raw.ignore_errors != 0,
        num_input_granules: raw.num_input_granules,
        collection_ids,
        provider_id: raw.provider_id,
        service_name: raw.service_name,
        destination_url: raw.destination_url,
        labels: Vec::new(),
        links: Vec::new(),
        created_at_ms: raw.created_at_ms,
        updated_at_ms: raw.updated_at_ms,
        original_status: Some(status),
    })
}

fn read_link_row(row: &rusqlite::Row<'_>) -> Result<(JobLink, Option<String>), rusqlite::Error> {
    let bbox_raw: Option<String> = row.get(5)?;
    Ok((
        JobLink {
            id: Some(row.get(0)?),
            href: row.get(1)?,
            title: row.get(2)?,
            link_type: row.get(3)?,
            rel: row.get(4)?,
            bbox: None,
            temporal_start_ms: row.get(6)?,
            temporal_end_ms: row.get(7)?,
        },
        bbox_raw,
    ))
}

pub(in crate::store) fn job_links_tx(
    tx: &Transaction<'_>,
    job_id: &str,
) -> Result<Vec<JobLink>, StoreError> {
    let mut stmt = tx.prepare(
        r#"
        SELECT id, href, title, type, rel, bbox, temporal_start_ms, temporal_end_ms
        FROM job_links
        WHERE job_id=?1
        ORDER BY id ASC
        "#,
    )?;
    let rows = stmt.query_map(params![job_id], read_link_row)?;
    let mut links = Vec::new();
    for row in rows {
        let (mut link, bbox_raw) = row?;
        link.bbox = decode_bbox(bbox_raw)?;
        links.push(link);
    }
    Ok(links)
}

pub(in crate::store) fn job_labels_tx(
    tx: &Transaction<'_>,
    job_id: &str,
) -> Result<Vec<String>, StoreError> {
    let mut stmt = tx.prepare(
        r#"
        SELECT l.value
        FROM jobs_labels jl
        JOIN labels l ON l.id = jl.label_id
        WHERE jl.job_id=?1
        ORDER BY l.value ASC
        "#,
    )?;
    let rows = stmt.query_map(params![job_id], |row| row.get::<_, String>(0))?;
    let mut labels = Vec::new();
    for row in rows {
        labels.push(row?);
    }
    Ok(labels)
}

pub(in crate::store) fn job_by_id_tx(
    tx: &Transaction<'_>,
    job_id: &JobId,
    include_links: bool,
    include_labels: bool,
) -> Result<Option<Job>, StoreError> {
    let job_id_str = job_id.to_string();
    let raw = tx
        .query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id=?1"),
            params![job_id_str],
            read_raw_job_row,
        )
        .optional()?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let mut job = raw_to_job(raw)?;
    if include_links {
        job.links = job_links_tx(tx, &job_id_str)?;
    }
    if include_labels {
        job.labels = job_labels_tx(tx, &job_id_str)?;
    }
    Ok(Some(job))
}

fn insert_link_tx(
    tx: &Transaction<'_>,
    job_id: &str,
    link: &mut JobLink,
    now_ms: i64,
) -> Result<(), StoreError> {
    tx.execute(
        r#"
        INSERT INTO job_links(job_id, href, title, type, rel, bbox, temporal_start_ms, temporal_end_ms, created_at_ms, updated_at_ms)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            job_id,
            link.href,
            link.title,
            link.link_type,
            link.rel,
            encode_bbox(link.bbox),
            link.temporal_start_ms,
            link.temporal_end_ms,
            now_ms,
            now_ms
        ],
    )?;
    link.id = Some(tx.last_insert_rowid());
    Ok(())
}

// Links already holding a row id are left untouched: the link table is
// append-only.
fn save_links_tx(
    tx: &Transaction<'_>,
    job_id: &str,
    links: &mut [JobLink],
    now_ms: i64,
) -> Result<(), StoreError> {
    for link in links.iter_mut() {
        if link.id.is_none() {
            insert_link_tx(tx, job_id, link, now_ms)?;
        }
    }
    Ok(())
}

// Insert-only reconciliation: missing labels are created and joined,
// existing joins are kept.
fn reconcile_labels_tx(
    tx: &Transaction<'_>,
    job_id: &str,
    labels: &[String],
    now_ms: i64,
) -> Result<(), StoreError> {
    for label in labels {
        tx.execute(
            "INSERT OR IGNORE INTO labels(value, created_at_ms) VALUES (?1, ?2)",
            params![label, now_ms],
        )?;
        let label_id: i64 = tx.query_row(
            "SELECT id FROM labels WHERE value=?1",
            params![label],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO jobs_labels(job_id, label_id, created_at_ms) VALUES (?1, ?2, ?3)",
            params![job_id, label_id, now_ms],
        )?;
    }
    Ok(())
}

pub(in crate::store) fn job_save_tx(
    tx: &Transaction<'_>,
    job: &mut Job,
    now_ms: i64,
) -> Result<(), StoreError> {
    job.validate_status().map_err(StoreError::Conflict)?;

    // The entity barrier only knows the status at load time; a copy loaded
    // before another writer finalized the job would slip past it. Recheck
    // the stored status inside this transaction.
    let stored: Option<String> = tx
        .query_row(
            "SELECT status FROM jobs WHERE job_id=?1",
            params![job.job_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    let Some(stored) = stored else {
        return Err(StoreError::UnknownJob {
            job_id: job.job_id.to_string(),
        });
    };
    let stored = JobStatus::parse(&stored)
        .ok_or(StoreError::CorruptRow("stored job status is unknown"))?;
    if stored.is_terminal() && !(stored == JobStatus::Failed && job.status == JobStatus::Failed) {
        return Err(StoreError::Conflict(ConflictError {
            current: stored,
            desired: job.status,
        }));
    }

    let problems = job.validate();
    if !problems.is_empty() {
        return Err(StoreError::Validation(problems));
    }

    job.request = sy_core::job::truncate_request(&job.request);
    job.username = normalize_username(&job.username)?;
    job.labels = normalize_labels(&job.labels)?;

    let job_id = job.job_id.to_string();
    let message_blob = if job.messages.is_empty() {
        None
    } else {
        Some(job.messages.encode())
    };

    let changed = tx.execute(
        r#"
        UPDATE jobs
        SET request_id=?2, username=?3, status=?4, message=?5, progress=?6,
            batches_completed=?7, request=?8, is_async=?9, ignore_errors=?10,
            provider_id=?11, service_name=?12, destination_url=?13, updated_at_ms=?14
        WHERE job_id=?1
        "#,
        params![
            job_id,
            job.request_id.to_string(),
            job.username,
            job.status.as_str(),
            message_blob,
            job.progress,
            job.batches_completed,
            job.request,
            job.is_async as i64,
            job.ignore_errors as i64,
            job.provider_id,
            job.service_name,
            job.destination_url,
            now_ms
        ],
    )?;
    if changed != 1 {
        return Err(StoreError::UnknownJob { job_id });
    }

    save_links_tx(tx, &job_id, &mut job.links, now_ms)?;
    reconcile_labels_tx(tx, &job_id, &job.labels, now_ms)?;

    job.updated_at_ms = now_ms;
    job.original_status = Some(job.status);
    Ok(())
}

impl SqliteStore {
    pub fn job_create(&mut self, job: &mut Job) -> Result<(), StoreError> {
        let problems = job.validate();
        if !problems.is_empty() {
            return Err(StoreError::Validation(problems));
        }
        if job.num_input_granules < 0 {
            return Err(StoreError::InvalidInput(
                "num_input_granules must not be negative",
            ));
        }

        let now_ms = now_ms();
        job.request = sy_core::job::truncate_request(&job.request);
        job.username = normalize_username(&job.username)?;
        job.labels = normalize_labels(&job.labels)?;

        let tx = self.conn.transaction()?;
        let job_id = job.job_id.to_string();
        let message_blob = if job.messages.is_empty() {
            None
        } else {
            Some(job.messages.encode())
        };

        tx.execute(
            r#"
            INSERT INTO jobs(
              job_id, request_id, username, status, message, progress, batches_completed,
              request, is_async, ignore_errors, num_input_granules, collection_ids,
              provider_id, service_name, destination_url, created_at_ms, updated_at_ms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
            params![
                job_id,
                job.request_id.to_string(),
                job.username,
                job.status.as_str(),
                message_blob,
                job.progress,
                job.batches_completed,
                job.request,
                job.is_async as i64,
                job.ignore_errors as i64,
                job.num_input_granules,
                encode_json_string_list(&job.collection_ids),
                job.provider_id,
                job.service_name,
                job.destination_url,
                now_ms,
                now_ms
            ],
        )?;
        job.id = Some(tx.last_insert_rowid());

        save_links_tx(&tx, &job_id, &mut job.links, now_ms)?;
        reconcile_labels_tx(&tx, &job_id, &job.labels, now_ms)?;

        tx.commit()?;
        job.created_at_ms = now_ms;
        job.updated_at_ms = now_ms;
        job.original_status = Some(job.status);
        Ok(())
    }

    pub fn job_by_id(
        &mut self,
        job_id: &JobId,
        opts: JobLoadOpts,
    ) -> Result<Option<Job>, StoreError> {
        let tx = if opts.lock {
            self.conn
                .transaction_with_behavior(TransactionBehavior::Immediate)?
        } else {
            self.conn.transaction()?
        };
        let job = job_by_id_tx(&tx, job_id, opts.include_links, opts.include_labels)?;
        tx.commit()?;
        Ok(job)
    }

    pub fn job_by_username_and_id(
        &mut self,
        username: &str,
        job_id: &JobId,
        opts: JobLoadOpts,
    ) -> Result<Option<Job>, StoreError> {
        let username = normalize_username(username)?;
        let job = self.job_by_id(job_id, opts)?;
        Ok(job.filter(|j| j.username == username))
    }

    pub fn job_save(&mut self, job: &mut Job) -> Result<(), StoreError> {
        let now_ms = now_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        job_save_tx(&tx, job, now_ms)?;
        tx.commit()?;
        Ok(())
    }

    fn job_mutate(
        &mut self,
        job_id: &JobId,
        mutate: impl FnOnce(&mut Job) -> Result<(), ConflictError>,
        zero_ready: bool,
    ) -> Result<Job, StoreError> {
        let now_ms = now_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(mut job) = job_by_id_tx(&tx, job_id, true, true)? else {
            return Err(StoreError::UnknownJob {
                job_id: job_id.to_string(),
            });
        };
        mutate(&mut job).map_err(StoreError::Conflict)?;
        job_save_tx(&tx, &mut job, now_ms)?;
        if zero_ready {
            super::user_work::set_ready_count_to_zero_tx(&tx, &job_id.to_string(), now_ms)?;
        }
        tx.commit()?;
        Ok(job)
    }

    pub fn job_pause_and_save(&mut self, job_id: &JobId) -> Result<Job, StoreError> {
        self.job_mutate(job_id, |job| job.pause(), true)
    }

    pub fn job_resume_and_save(&mut self, job_id: &JobId) -> Result<Job, StoreError> {
        self.job_mutate(job_id, |job| job.resume(), false)
    }

    pub fn job_skip_preview_and_save(&mut self, job_id: &JobId) -> Result<Job, StoreError> {
        self.job_mutate(job_id, |job| job.skip_preview(), false)
    }

    pub fn job_fail_and_save(
        &mut self,
        job_id: &JobId,
        message: Option<&str>,
    ) -> Result<Job, StoreError> {
        self.job_mutate(job_id, |job| job.fail(message), true)
    }

    pub fn job_cancel_and_save(
        &mut self,
        job_id: &JobId,
        message: Option<&str>,
    ) -> Result<Job, StoreError> {
        self.job_mutate(job_id, |job| job.cancel(message), true)
    }

    pub fn job_succeed_and_save(
        &mut self,
        job_id: &JobId,
        message: Option<&str>,
    ) -> Result<Job, StoreError> {
        self.job_mutate(job_id, |job| job.succeed(message), false)
    }

    pub fn job_complete_with_errors_and_save(
        &mut self,
        job_id: &JobId,
        message: Option<&str>,
    ) -> Result<Job, StoreError> {
        self.job_mutate(job_id, |job| job.complete_with_errors(message), false)
    }

    pub fn job_error_add(
        &mut self,
        job_id: &JobId,
        message: &str,
        url: Option<&str>,
    ) -> Result<JobErrorRow, StoreError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(StoreError::InvalidInput("error message must not be empty"));
        }
        let message: String = message.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
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
        tx.execute(
            "INSERT INTO job_errors(job_id, url, message, created_at_ms) VALUES (?1, ?2, ?3, ?4)",
            params![job_id_str, url, message, now_ms],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(JobErrorRow {
            id,
            job_id: job_id_str,
            url: url.map(|u| u.to_string()),
            message,
            created_at_ms: now_ms,
        })
    }

    pub fn job_errors_for_job(
        &mut self,
        job_id: &JobId,
        limit: usize,
    ) -> Result<Vec<JobErrorRow>, StoreError> {
        let limit = limit.clamp(1, MAX_ERROR_LIST_LIMIT);
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, job_id, url, message, created_at_ms
            FROM job_errors
            WHERE job_id=?1
            ORDER BY id ASC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![job_id.to_string(), limit as i64], |row| {
            Ok(JobErrorRow {
                id: row.get(0)?,
                job_id: row.get(1)?,
                url: row.get(2)?,
                message: row.get(3)?,
                created_at_ms: row.get(4)?,
            })
        })?;
        let mut errors = Vec::new();
        for row in rows {
            errors.push(row?);
        }
        Ok(errors)
    }

    /// Whether the job carries links, optionally restricted to a rel and to
    /// links with spatial or temporal extents.
    pub fn job_has_links(
        &mut self,
        job_id: &JobId,
        rel: Option<&str>,
        spatio_temporal: bool,
    ) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM job_links
            WHERE job_id=?1
              AND (?2 IS NULL OR rel=?2)
              AND (?3 = 0 OR bbox IS NOT NULL OR temporal_start_ms IS NOT NULL OR temporal_end_ms IS NOT NULL)
            "#,
            params![job_id.to_string(), rel, spatio_temporal as i64],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// `None` when the job does not exist; callers decide whether that is an
    /// error.
    pub fn job_num_input_granules(&mut self, job_id: &JobId) -> Result<Option<i64>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT num_input_granules FROM jobs WHERE job_id=?1",
                params![job_id.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Remove every derived row of a terminal job (the job row itself stays).
    pub fn job_cleanup(&mut self, job_id: &JobId) -> Result<(), StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let job_id_str = job_id.to_string();
        let status: Option<String> = tx
            .query_row(
                "SELECT status FROM jobs WHERE job_id=?1",
                params![job_id_str],
                |row| row.get(0),
            )
            .optional()?;
        let Some(status) = status else {
            return Err(StoreError::UnknownJob { job_id: job_id_str });
        };
        let status =
            JobStatus::parse(&status).ok_or(StoreError::CorruptRow("stored job status is unknown"))?;
        if !status.is_terminal() {
            return Err(StoreError::InvalidInput(
                "job must be terminal before cleanup",
            ));
        }

        tx.execute("DELETE FROM work_items WHERE job_id=?1", params![job_id_str])?;
        tx.execute(
            "DELETE FROM workflow_steps WHERE job_id=?1",
            params![job_id_str],
        )?;
        tx.execute("DELETE FROM user_work WHERE job_id=?1", params![job_id_str])?;
        tx.execute("DELETE FROM job_errors WHERE job_id=?1", params![job_id_str])?;
        tx.execute("DELETE FROM job_links WHERE job_id=?1", params![job_id_str])?;
        tx.execute(
            "DELETE FROM jobs_labels WHERE job_id=?1",
            params![job_id_str],
        )?;
        tx.commit()?;
        Ok(())
    }
}
