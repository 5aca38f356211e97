#![forbid(unsafe_code)]

use sy_core::ids::ServiceId;
use sy_core::job::Job;
use sy_reaper::{ReapCounts, Reaper, ReaperConfig};
use sy_storage::{NewWorkflowStep, SqliteStore};
use std::path::PathBuf;
use std::thread::sleep;
use std::time::Duration;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("sy_reaper_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn service(tag: &str) -> ServiceId {
    ServiceId::try_new(tag).expect("service id")
}

fn seed_job_with_work(store: &mut SqliteStore, username: &str) -> Job {
    let mut job = Job::new(username, "https://example.com/ogc", 2, vec![]);
    store.job_create(&mut job).expect("create");
    let svc = service("subsetter:v1");
    let mut loaded = store
        .job_by_id(&job.job_id, Default::default())
        .expect("load")
        .expect("job exists");
    loaded.start().expect("start");
    store.job_save(&mut loaded).expect("save");
    store
        .workflow_steps_create(
            &job.job_id,
            vec![NewWorkflowStep {
                service_id: svc.clone(),
                work_item_count: 2,
                progress_weight: 1.0,
            }],
        )
        .expect("steps");
    store.work_items_create(&job.job_id, &svc, 2).expect("items");
    job
}

// A zero-minute age makes any terminal job reapable as soon as the clock
// ticks past its last update.
fn immediate_config() -> ReaperConfig {
    ReaperConfig {
        reapable_work_age_minutes: 0,
        work_reaper_period_sec: 0,
    }
}

#[test]
fn reaps_terminal_jobs_and_leaves_running_ones() {
    let dir = temp_dir("terminal_vs_running");
    let mut store = SqliteStore::open(&dir).expect("open store");

    let done = seed_job_with_work(&mut store, "alice");
    store.job_cancel_and_save(&done.job_id, None).expect("cancel");

    let running = seed_job_with_work(&mut store, "bob");

    sleep(Duration::from_millis(5));

    let mut reaper = Reaper::new(store, immediate_config());
    let counts = reaper.tick().expect("tick");
    assert_eq!(counts.work_items, 2, "the canceled job's items go");
    assert_eq!(counts.workflow_steps, 1, "and its step row");

    // Verify through a second connection: the running job kept everything.
    let mut store = SqliteStore::open(&dir).expect("reopen store");
    assert!(store.work_items_for_job(&done.job_id).expect("items").is_empty());
    assert!(store.workflow_steps_for_job(&done.job_id).expect("steps").is_empty());
    assert_eq!(store.work_items_for_job(&running.job_id).expect("items").len(), 2);
    assert_eq!(
        store.workflow_steps_for_job(&running.job_id).expect("steps").len(),
        1
    );
}

#[test]
fn young_terminal_jobs_are_left_alone() {
    let dir = temp_dir("young_terminal");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let done = seed_job_with_work(&mut store, "alice");
    store.job_cancel_and_save(&done.job_id, None).expect("cancel");

    let config = ReaperConfig {
        reapable_work_age_minutes: 60,
        work_reaper_period_sec: 0,
    };
    let mut reaper = Reaper::new(store, config);
    let counts = reaper.tick().expect("tick");
    assert_eq!(counts, ReapCounts::default());

    let mut store = SqliteStore::open(&dir).expect("reopen store");
    assert_eq!(store.work_items_for_job(&done.job_id).expect("items").len(), 2);
}

#[test]
fn tick_also_drops_drained_fairness_rows() {
    let dir = temp_dir("drained_rows");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let job = seed_job_with_work(&mut store, "alice");
    let svc = service("subsetter:v1");

    // Drain the counters without finishing the job.
    store.next_work_item(&svc).expect("claim");
    store.next_work_item(&svc).expect("claim");
    store.decrement_running_count(&job.job_id, &svc).expect("done");
    store.decrement_running_count(&job.job_id, &svc).expect("done");

    let mut reaper = Reaper::new(store, immediate_config());
    let counts = reaper.tick().expect("tick");
    assert_eq!(counts.orphaned_user_work, 1);
}

#[test]
fn stop_ends_the_loop_after_the_current_iteration() {
    let dir = temp_dir("stop_semantics");
    let store = SqliteStore::open(&dir).expect("open store");

    let mut reaper = Reaper::new(
        store,
        ReaperConfig {
            reapable_work_age_minutes: 1,
            work_reaper_period_sec: 0,
        },
    );
    assert!(!reaper.is_running());

    let handle = reaper.handle();
    let worker = std::thread::spawn(move || {
        reaper.start();
        reaper
    });

    sleep(Duration::from_millis(50));
    handle.stop();

    let reaper = worker.join().expect("loop exits after stop");
    assert!(!reaper.is_running());
}
