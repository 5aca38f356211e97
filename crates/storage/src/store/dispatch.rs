#![forbid(unsafe_code)]
//! Fair selection of the next work item for a service: least-loaded user
//! first, then that user's longest-untouched job.

use super::user_work::{
    increment_running_and_decrement_ready_tx, next_job_id_for_username_and_service_tx,
    next_username_for_work_tx,
};
use super::work_items::claim_oldest_ready_item_tx;
use super::*;
use rusqlite::TransactionBehavior;
use sy_core::ids::ServiceId;

impl SqliteStore {
    /// Select and claim the next work item for `service_id`, or `None` when
    /// no user has ready work. Selection and claim share one immediate
    /// transaction so concurrent dispatchers cannot double-claim an item.
    pub fn next_work_item(
        &mut self,
        service_id: &ServiceId,
    ) -> Result<Option<WorkItemRow>, StoreError> {
        let now_ms = now_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(username) = next_username_for_work_tx(&tx, service_id.as_str())? else {
            tx.commit()?;
            return Ok(None);
        };
        let Some(job_id) =
            next_job_id_for_username_and_service_tx(&tx, service_id.as_str(), &username)?
        else {
            tx.commit()?;
            return Ok(None);
        };

        // The counters can run ahead of the items briefly (ready work raced
        // a pause recalculation); an empty claim is not an error.
        let Some(item) = claim_oldest_ready_item_tx(&tx, &job_id, service_id.as_str(), now_ms)?
        else {
            tx.commit()?;
            return Ok(None);
        };

        increment_running_and_decrement_ready_tx(&tx, &job_id, service_id.as_str(), now_ms)?;
        tx.commit()?;
        Ok(Some(item))
    }
}
