#![forbid(unsafe_code)]

/// Per-(job, service) fairness counters. `ready_count + running_count`
/// mirrors the number of work items in {ready, running} for the pair.
#[derive(Clone, Debug)]
pub struct UserWorkRow {
    pub id: i64,
    pub job_id: String,
    pub service_id: String,
    pub username: String,
    pub ready_count: i64,
    pub running_count: i64,
    pub last_worked_ms: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}
