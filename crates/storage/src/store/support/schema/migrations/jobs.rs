#![forbid(unsafe_code)]

use super::util::add_column_if_missing;
use super::super::super::super::StoreError;
use rusqlite::Connection;

pub(super) fn apply(conn: &Connection) -> Result<(), StoreError> {
    // Destination/service routing columns arrived after the first schema cut.
    add_column_if_missing(conn, "jobs", "destination_url", "TEXT")?;
    add_column_if_missing(conn, "jobs", "service_name", "TEXT")?;
    add_column_if_missing(conn, "jobs", "provider_id", "TEXT")?;
    Ok(())
}
