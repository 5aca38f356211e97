#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        CREATE TABLE IF NOT EXISTS workflow_steps (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          job_id TEXT NOT NULL,
          service_id TEXT NOT NULL,
          step_index INTEGER NOT NULL,
          work_item_count INTEGER NOT NULL DEFAULT 0,
          completed_work_item_count INTEGER NOT NULL DEFAULT 0,
          progress_weight REAL NOT NULL DEFAULT 1.0,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          UNIQUE (job_id, step_index)
        );
"#;
