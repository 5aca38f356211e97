#![forbid(unsafe_code)]

mod core;
mod indexes;
mod jobs;
mod labels;
mod pragmas;
mod user_work;
mod work_items;
mod workflow_steps;

pub(super) fn full_schema_sql() -> String {
    let mut sql = String::new();
    sql.push_str(pragmas::SQL);
    sql.push_str(core::SQL);
    sql.push_str(jobs::SQL);
    sql.push_str(labels::SQL);
    sql.push_str(user_work::SQL);
    sql.push_str(work_items::SQL);
    sql.push_str(workflow_steps::SQL);
    sql.push_str(indexes::SQL);
    sql
}
