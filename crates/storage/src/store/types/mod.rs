#![forbid(unsafe_code)]

mod jobs;
mod user_work;
mod work_items;
mod workflow_steps;

pub use jobs::*;
pub use user_work::*;
pub use work_items::*;
pub use workflow_steps::*;
