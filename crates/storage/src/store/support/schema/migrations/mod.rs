#![forbid(unsafe_code)]

mod jobs;
mod util;

use super::super::super::StoreError;
use rusqlite::Connection;

pub(super) fn apply(conn: &Connection) -> Result<(), StoreError> {
    jobs::apply(conn)?;
    Ok(())
}
