#![forbid(unsafe_code)]
//! Background cleanup loop: drops work items and workflow steps that belong
//! to jobs which finished long enough ago, plus drained fairness rows.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use sy_storage::{SqliteStore, StoreError};

#[derive(Clone, Copy, Debug)]
pub struct ReaperConfig {
    /// Jobs idle in a terminal status for longer than this are reapable.
    pub reapable_work_age_minutes: i64,
    /// Pause between reap passes.
    pub work_reaper_period_sec: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            reapable_work_age_minutes: 24 * 60,
            work_reaper_period_sec: 360,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReapCounts {
    pub work_items: usize,
    pub workflow_steps: usize,
    pub orphaned_user_work: usize,
}

/// Clears the running flag from another thread; the loop finishes its
/// current iteration and exits.
#[derive(Clone, Debug)]
pub struct ReaperHandle(Arc<AtomicBool>);

impl ReaperHandle {
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Reaper {
    store: SqliteStore,
    config: ReaperConfig,
    running: Arc<AtomicBool>,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis()
        .min(i64::MAX as u128) as i64
}

impl Reaper {
    pub fn new(store: SqliteStore, config: ReaperConfig) -> Self {
        Self {
            store,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn handle(&self) -> ReaperHandle {
        ReaperHandle(Arc::clone(&self.running))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// One reap pass. Every delete is its own short transaction so the pass
    /// never holds the store for long.
    pub fn tick(&mut self) -> Result<ReapCounts, StoreError> {
        let threshold_ms = now_ms() - self.config.reapable_work_age_minutes * 60_000;
        let work_items = self.store.reap_work_items(threshold_ms)?;
        let workflow_steps = self.store.reap_workflow_steps(threshold_ms)?;
        let orphaned_user_work = self.store.delete_orphaned_rows()?;
        Ok(ReapCounts {
            work_items,
            workflow_steps,
            orphaned_user_work,
        })
    }

    /// Loop until the running flag clears. Errors are logged and the loop
    /// keeps going; a broken pass must not kill cleanup forever.
    pub fn start(&mut self) {
        self.running.store(true, Ordering::SeqCst);
        while self.running.load(Ordering::SeqCst) {
            match self.tick() {
                Ok(counts) => {
                    tracing::info!(
                        work_items = counts.work_items,
                        workflow_steps = counts.workflow_steps,
                        orphaned_user_work = counts.orphaned_user_work,
                        "reap pass finished"
                    );
                }
                Err(err) => {
                    tracing::error!("reap pass failed: {err}");
                }
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            sleep(Duration::from_secs(self.config.work_reaper_period_sec));
        }
    }
}
