#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        CREATE TABLE IF NOT EXISTS user_work (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          job_id TEXT NOT NULL,
          service_id TEXT NOT NULL,
          username TEXT NOT NULL,
          ready_count INTEGER NOT NULL DEFAULT 0,
          running_count INTEGER NOT NULL DEFAULT 0,
          last_worked_ms INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          UNIQUE (job_id, service_id)
        );
"#;
