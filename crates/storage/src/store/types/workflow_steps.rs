#![forbid(unsafe_code)]

use sy_core::ids::ServiceId;

#[derive(Clone, Debug)]
pub struct WorkflowStepRow {
    pub id: i64,
    pub job_id: String,
    pub service_id: String,
    pub step_index: i64,
    pub work_item_count: i64,
    pub completed_work_item_count: i64,
    pub progress_weight: f64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl WorkflowStepRow {
    pub fn is_complete(&self) -> bool {
        self.completed_work_item_count >= self.work_item_count
    }
}

#[derive(Clone, Debug)]
pub struct NewWorkflowStep {
    pub service_id: ServiceId,
    pub work_item_count: i64,
    pub progress_weight: f64,
}
