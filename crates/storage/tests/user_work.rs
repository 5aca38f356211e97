#![forbid(unsafe_code)]

use sy_core::ids::ServiceId;
use sy_core::job::Job;
use sy_storage::SqliteStore;
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
    let dir = base.join(format!("sy_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn setup(test_name: &str) -> SqliteStore {
    SqliteStore::open(temp_dir(test_name)).expect("open store")
}

fn service(tag: &str) -> ServiceId {
    ServiceId::try_new(tag).expect("service id")
}

fn seed_job(store: &mut SqliteStore, username: &str) -> Job {
    let mut job = Job::new(username, "https://example.com/ogc", 4, vec![]);
    store.job_create(&mut job).expect("create");
    job
}

#[test]
fn counters_follow_the_item_lifecycle() {
    let mut store = setup("counter_lifecycle");
    let job = seed_job(&mut store, "alice");
    let svc = service("subsetter:v1");

    store.increment_ready_count(&job.job_id, &svc, 3).expect("ready +3");
    store
        .increment_running_and_decrement_ready(&job.job_id, &svc)
        .expect("claim");
    store
        .increment_ready_and_decrement_running(&job.job_id, &svc)
        .expect("retry");
    store
        .increment_running_and_decrement_ready(&job.job_id, &svc)
        .expect("claim again");
    store
        .decrement_running_count(&job.job_id, &svc)
        .expect("complete");

    let rows = store.user_work_for_job(&job.job_id).expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].ready_count, 2);
    assert_eq!(rows[0].running_count, 0);
    assert_eq!(rows[0].username, "alice");
}

#[test]
fn next_username_prefers_least_loaded_then_oldest() {
    let mut store = setup("fairness_tiebreak");
    let job_a = seed_job(&mut store, "user_a");
    let job_b = seed_job(&mut store, "user_b");
    let svc = service("subsetter:v1");

    store.increment_ready_count(&job_a.job_id, &svc, 6).expect("ready a");
    store.increment_ready_count(&job_b.job_id, &svc, 6).expect("ready b");

    // Both users end with ready=1, running=5; user_b worked earlier so its
    // max(last_worked) is older and must break the tie.
    for _ in 0..5 {
        store
            .increment_running_and_decrement_ready(&job_b.job_id, &svc)
            .expect("claim b");
    }
    sleep(Duration::from_millis(5));
    for _ in 0..5 {
        store
            .increment_running_and_decrement_ready(&job_a.job_id, &svc)
            .expect("claim a");
    }

    let winner = store.next_username_for_work(&svc).expect("select");
    assert_eq!(winner.as_deref(), Some("user_b"));
}

#[test]
fn next_username_skips_users_without_ready_work() {
    let mut store = setup("skip_no_ready");
    let job_a = seed_job(&mut store, "user_a");
    let job_b = seed_job(&mut store, "user_b");
    let svc = service("subsetter:v1");

    // user_b has plenty running but nothing ready; user_a is busier yet is
    // the only eligible pick.
    store.increment_ready_count(&job_b.job_id, &svc, 2).expect("ready b");
    store
        .increment_running_and_decrement_ready(&job_b.job_id, &svc)
        .expect("claim b");
    store
        .increment_running_and_decrement_ready(&job_b.job_id, &svc)
        .expect("claim b");

    store.increment_ready_count(&job_a.job_id, &svc, 1).expect("ready a");
    for _ in 0..3 {
        store.increment_ready_count(&job_a.job_id, &svc, 1).expect("ready a");
        store
            .increment_running_and_decrement_ready(&job_a.job_id, &svc)
            .expect("claim a");
    }

    let winner = store.next_username_for_work(&svc).expect("select");
    assert_eq!(winner.as_deref(), Some("user_a"));
}

#[test]
fn next_job_for_user_is_the_longest_untouched() {
    let mut store = setup("oldest_job_wins");
    let job_one = seed_job(&mut store, "alice");
    let job_two = seed_job(&mut store, "alice");
    let svc = service("subsetter:v1");

    store.increment_ready_count(&job_one.job_id, &svc, 2).expect("ready one");
    store.increment_ready_count(&job_two.job_id, &svc, 2).expect("ready two");

    // Touch job_two more recently; job_one becomes the starved one.
    sleep(Duration::from_millis(5));
    store
        .increment_running_and_decrement_ready(&job_two.job_id, &svc)
        .expect("claim two");

    let next = store
        .next_job_id_for_username_and_service(&svc, "alice")
        .expect("select")
        .expect("some job");
    assert_eq!(next, job_one.job_id);
}

#[test]
fn delete_orphaned_rows_removes_exactly_the_drained_rows() {
    let mut store = setup("orphans");
    let job_a = seed_job(&mut store, "alice");
    let job_b = seed_job(&mut store, "bob");
    let job_c = seed_job(&mut store, "carol");
    let svc = service("subsetter:v1");

    // a: drained (0/0), b: ready only, c: running only.
    store.increment_ready_count(&job_a.job_id, &svc, 1).expect("ready a");
    store
        .increment_running_and_decrement_ready(&job_a.job_id, &svc)
        .expect("claim a");
    store.decrement_running_count(&job_a.job_id, &svc).expect("done a");

    store.increment_ready_count(&job_b.job_id, &svc, 1).expect("ready b");

    store.increment_ready_count(&job_c.job_id, &svc, 1).expect("ready c");
    store
        .increment_running_and_decrement_ready(&job_c.job_id, &svc)
        .expect("claim c");

    let deleted = store.delete_orphaned_rows().expect("delete");
    assert_eq!(deleted, 1);
    assert!(store.user_work_for_job(&job_a.job_id).expect("rows").is_empty());
    assert_eq!(store.user_work_for_job(&job_b.job_id).expect("rows").len(), 1);
    assert_eq!(store.user_work_for_job(&job_c.job_id).expect("rows").len(), 1);
}

#[test]
fn pause_zeroes_every_ready_count_for_the_job() {
    let mut store = setup("pause_zeroes");
    let job = seed_job(&mut store, "alice");
    let svc_one = service("subsetter:v1");
    let svc_two = service("regridder:v2");

    let mut loaded = store
        .job_by_id(&job.job_id, Default::default())
        .expect("load")
        .expect("job exists");
    loaded.start().expect("start");
    store.job_save(&mut loaded).expect("save");

    store.increment_ready_count(&job.job_id, &svc_one, 3).expect("ready one");
    store.increment_ready_count(&job.job_id, &svc_two, 2).expect("ready two");
    store
        .increment_running_and_decrement_ready(&job.job_id, &svc_one)
        .expect("claim");

    store.job_pause_and_save(&job.job_id).expect("pause");

    let rows = store.user_work_for_job(&job.job_id).expect("rows");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.ready_count == 0));
    // Running work is unaffected by the pause; it drains on its own.
    assert_eq!(rows.iter().map(|r| r.running_count).sum::<i64>(), 1);
}

#[test]
fn queued_and_running_count_sums_across_users() {
    let mut store = setup("service_depth");
    let job_a = seed_job(&mut store, "alice");
    let job_b = seed_job(&mut store, "bob");
    let svc = service("subsetter:v1");
    let other = service("regridder:v2");

    store.increment_ready_count(&job_a.job_id, &svc, 2).expect("ready a");
    store.increment_ready_count(&job_b.job_id, &svc, 3).expect("ready b");
    store
        .increment_running_and_decrement_ready(&job_b.job_id, &svc)
        .expect("claim b");
    store.increment_ready_count(&job_b.job_id, &other, 7).expect("ready other");

    assert_eq!(
        store.queued_and_running_count_for_service(&svc).expect("count"),
        5
    );
    assert_eq!(
        store.queued_and_running_count_for_service(&other).expect("count"),
        7
    );
}

#[test]
fn recalculate_ready_count_rederives_from_items() {
    let mut store = setup("recalculate");
    let job = seed_job(&mut store, "alice");
    let svc = service("subsetter:v1");

    store.work_items_create(&job.job_id, &svc, 3).expect("items");
    // Counters drift: two phantom claims that never touched the items.
    store
        .increment_running_and_decrement_ready(&job.job_id, &svc)
        .expect("claim");
    store
        .increment_running_and_decrement_ready(&job.job_id, &svc)
        .expect("claim");

    store.recalculate_ready_count(&job.job_id).expect("recalculate");
    let rows = store.user_work_for_job(&job.job_id).expect("rows");
    assert_eq!(rows[0].ready_count, 3, "ready rederived from the items");
}

#[test]
fn populate_from_work_items_skips_paused_and_previewing_jobs() {
    let mut store = setup("populate");
    let active = seed_job(&mut store, "alice");
    let paused = seed_job(&mut store, "bob");
    let svc = service("subsetter:v1");

    store.work_items_create(&active.job_id, &svc, 2).expect("items");
    store.next_work_item(&svc).expect("claim one");

    store.work_items_create(&paused.job_id, &svc, 2).expect("items");
    let mut loaded = store
        .job_by_id(&paused.job_id, Default::default())
        .expect("load")
        .expect("job exists");
    loaded.start().expect("start");
    store.job_save(&mut loaded).expect("save");
    store.job_pause_and_save(&paused.job_id).expect("pause");

    store.populate_from_work_items().expect("populate");

    let active_rows = store.user_work_for_job(&active.job_id).expect("rows");
    assert_eq!(active_rows.len(), 1);
    assert_eq!(active_rows[0].ready_count, 1);
    assert_eq!(active_rows[0].running_count, 1);

    assert!(store.user_work_for_job(&paused.job_id).expect("rows").is_empty());
}
