#![forbid(unsafe_code)]

use super::super::*;
use super::{JOB_COLUMNS, normalize_username, raw_to_job, read_raw_job_row};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter};
use std::collections::HashMap;

const MAX_PER_PAGE: i64 = 2_000;

fn push_in_clause(
    sql: &mut String,
    params: &mut Vec<SqlValue>,
    column: &'static str,
    values: &[String],
    negated: bool,
) {
    if values.is_empty() {
        return;
    }
    let op = if negated { "NOT IN" } else { "IN" };
    sql.push_str(&format!(" AND {column} {op} ("));
    for (index, value) in values.iter().enumerate() {
        if index > 0 {
            sql.push(',');
        }
        sql.push('?');
        params.push(SqlValue::Text(value.clone()));
    }
    sql.push(')');
}

fn push_exact_clause(
    sql: &mut String,
    params: &mut Vec<SqlValue>,
    column: &'static str,
    value: Option<&str>,
) {
    if let Some(value) = value {
        sql.push_str(&format!(" AND {column} = ?"));
        params.push(SqlValue::Text(value.to_string()));
    }
}

fn push_membership(
    sql: &mut String,
    params: &mut Vec<SqlValue>,
    values: &JobFieldValues,
    negated: bool,
) {
    let statuses: Vec<String> = values.status.iter().map(|s| s.as_str().to_string()).collect();
    let job_ids: Vec<String> = values.job_id.iter().map(|id| id.to_string()).collect();
    push_in_clause(sql, params, "status", &statuses, negated);
    push_in_clause(sql, params, "service_name", &values.service_name, negated);
    push_in_clause(sql, params, "provider_id", &values.provider_id, negated);
    push_in_clause(sql, params, "username", &values.username, negated);
    push_in_clause(sql, params, "job_id", &job_ids, negated);
}

fn where_clause(query: &JobQuery) -> (String, Vec<SqlValue>) {
    let mut sql = String::from(" WHERE 1=1");
    let mut params = Vec::<SqlValue>::new();

    push_exact_clause(&mut sql, &mut params, "username", query.username.as_deref());
    push_exact_clause(
        &mut sql,
        &mut params,
        "status",
        query.status.map(|s| s.as_str()),
    );
    push_exact_clause(
        &mut sql,
        &mut params,
        "provider_id",
        query.provider_id.as_deref(),
    );
    push_exact_clause(
        &mut sql,
        &mut params,
        "service_name",
        query.service_name.as_deref(),
    );

    push_membership(&mut sql, &mut params, &query.where_in, false);
    push_membership(&mut sql, &mut params, &query.where_not_in, true);

    if let Some(range) = &query.date_range {
        if let Some(from_ms) = range.from_ms {
            sql.push_str(&format!(" AND {} >= ?", range.field.column()));
            params.push(SqlValue::Integer(from_ms));
        }
        if let Some(to_ms) = range.to_ms {
            sql.push_str(&format!(" AND {} <= ?", range.field.column()));
            params.push(SqlValue::Integer(to_ms));
        }
    }

    (sql, params)
}

impl SqliteStore {
    pub fn jobs_query(
        &mut self,
        query: &JobQuery,
        current_page: i64,
        per_page: i64,
        include_labels: bool,
    ) -> Result<JobPage, StoreError> {
        let current_page = current_page.max(1);
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        let (where_sql, where_params) = where_clause(query);

        let (order_field, order_dir) = query
            .order_by
            .unwrap_or((JobSortField::CreatedAt, SortDirection::Desc));

        let tx = self.conn.transaction()?;

        let total: i64 = {
            let sql = format!("SELECT COUNT(*) FROM jobs{where_sql}");
            let mut stmt = tx.prepare(&sql)?;
            stmt.query_row(params_from_iter(where_params.iter().cloned()), |row| {
                row.get(0)
            })?
        };

        let mut jobs = Vec::new();
        {
            let sql = format!(
                "SELECT {JOB_COLUMNS} FROM jobs{where_sql} ORDER BY {} {}, id ASC LIMIT ? OFFSET ?",
                order_field.column(),
                order_dir.keyword()
            );
            let mut page_params = where_params.clone();
            page_params.push(SqlValue::Integer(per_page));
            page_params.push(SqlValue::Integer((current_page - 1) * per_page));

            let mut stmt = tx.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(page_params))?;
            while let Some(row) = rows.next()? {
                let raw = read_raw_job_row(row)?;
                jobs.push(raw_to_job(raw)?);
            }
        }

        if include_labels && !jobs.is_empty() {
            // Single batched lookup instead of one query per job.
            let placeholders: String = jobs
                .iter()
                .enumerate()
                .map(|(index, _)| if index == 0 { "?" } else { ",?" })
                .collect();
            let sql = format!(
                r#"
                SELECT jl.job_id, l.value
                FROM jobs_labels jl
                JOIN labels l ON l.id = jl.label_id
                WHERE jl.job_id IN ({placeholders})
                ORDER BY jl.job_id, l.value
                "#
            );
            let label_params: Vec<SqlValue> = jobs
                .iter()
                .map(|job| SqlValue::Text(job.job_id.to_string()))
                .collect();
            let mut by_job = HashMap::<String, Vec<String>>::new();
            let mut stmt = tx.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(label_params))?;
            while let Some(row) = rows.next()? {
                let job_id: String = row.get(0)?;
                let value: String = row.get(1)?;
                by_job.entry(job_id).or_default().push(value);
            }
            for job in &mut jobs {
                if let Some(labels) = by_job.remove(&job.job_id.to_string()) {
                    job.labels = labels;
                }
            }
        }

        tx.commit()?;
        Ok(JobPage {
            jobs,
            total,
            current_page,
            per_page,
        })
    }

    pub fn jobs_for_user(
        &mut self,
        username: &str,
        current_page: i64,
        per_page: i64,
    ) -> Result<JobPage, StoreError> {
        let username = normalize_username(username)?;
        let query = JobQuery {
            username: Some(username),
            ..JobQuery::default()
        };
        self.jobs_query(&query, current_page, per_page, true)
    }

    pub fn jobs_status_counts(&self) -> Result<(i64, i64), StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
              COALESCE(SUM(CASE WHEN status IN ('running','running_with_errors') THEN 1 ELSE 0 END), 0) AS running,
              COALESCE(SUM(CASE WHEN status = 'accepted' THEN 1 ELSE 0 END), 0) AS accepted
            FROM jobs
            "#,
        )?;
        let counts = stmt.query_row(params![], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        Ok(counts)
    }
}
