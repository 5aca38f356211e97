#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        CREATE TABLE IF NOT EXISTS jobs (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          job_id TEXT NOT NULL UNIQUE,
          request_id TEXT NOT NULL,
          username TEXT NOT NULL,
          status TEXT NOT NULL,
          message TEXT,
          progress INTEGER NOT NULL DEFAULT 0,
          batches_completed INTEGER NOT NULL DEFAULT 0,
          request TEXT NOT NULL,
          is_async INTEGER NOT NULL DEFAULT 0,
          ignore_errors INTEGER NOT NULL DEFAULT 0,
          num_input_granules INTEGER NOT NULL DEFAULT 0,
          collection_ids TEXT NOT NULL DEFAULT '[]',
          provider_id TEXT,
          service_name TEXT,
          destination_url TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS job_links (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          job_id TEXT NOT NULL,
          href TEXT NOT NULL,
          title TEXT,
          type TEXT,
          rel TEXT,
          bbox TEXT,
          temporal_start_ms INTEGER,
          temporal_end_ms INTEGER,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS job_errors (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          job_id TEXT NOT NULL,
          url TEXT,
          message TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL
        );
"#;
