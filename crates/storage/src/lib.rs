#![forbid(unsafe_code)]
//! Record store for the orchestrator: jobs, user work counters, workflow
//! steps, and work items over SQLite, exposed as short transactions.

mod store;

pub use store::*;
