#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        CREATE INDEX IF NOT EXISTS idx_jobs_username_created ON jobs(username, created_at_ms);
        CREATE INDEX IF NOT EXISTS idx_jobs_status_updated ON jobs(status, updated_at_ms);
        CREATE INDEX IF NOT EXISTS idx_job_links_job ON job_links(job_id);
        CREATE INDEX IF NOT EXISTS idx_job_errors_job ON job_errors(job_id);
        CREATE INDEX IF NOT EXISTS idx_user_work_service_ready ON user_work(service_id, ready_count);
        CREATE INDEX IF NOT EXISTS idx_work_items_lookup ON work_items(job_id, service_id, status);
        CREATE INDEX IF NOT EXISTS idx_workflow_steps_job ON workflow_steps(job_id, step_index);
        CREATE INDEX IF NOT EXISTS idx_jobs_labels_job ON jobs_labels(job_id);
"#;
