#![forbid(unsafe_code)]

use sy_core::job::Job;
use sy_core::link::JobLink;
use sy_core::status::JobStatus;
use sy_storage::{JobLoadOpts, SqliteStore, StoreError};
use std::path::PathBuf;

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

fn make_job(username: &str) -> Job {
    Job::new(
        username,
        "https://example.com/ogc-api-coverages/rangeset?granules=3",
        3,
        vec!["C1-PROV".to_string()],
    )
}

fn load_all() -> JobLoadOpts {
    JobLoadOpts {
        include_links: true,
        include_labels: true,
        lock: false,
    }
}

fn start_job(store: &mut SqliteStore, job_id: &sy_core::ids::JobId) {
    let mut loaded = store
        .job_by_id(job_id, JobLoadOpts::default())
        .expect("load")
        .expect("job exists");
    loaded.start().expect("start");
    store.job_save(&mut loaded).expect("save");
}

#[test]
fn create_round_trips() {
    let mut store = setup("create_round_trips");
    let mut job = make_job("jdoe");
    store.job_create(&mut job).expect("create");
    assert!(job.id.is_some());
    assert!(job.created_at_ms > 0);

    let loaded = store
        .job_by_id(&job.job_id, load_all())
        .expect("load")
        .expect("job exists");
    assert_eq!(loaded.status, JobStatus::Accepted);
    assert_eq!(loaded.progress, 0);
    assert_eq!(loaded.username, "jdoe");
    assert_eq!(loaded.num_input_granules, 3);
    assert_eq!(loaded.collection_ids, vec!["C1-PROV".to_string()]);
    assert_eq!(loaded.request_id, job.job_id);
}

#[test]
fn start_then_complete_reports_success() {
    let mut store = setup("start_then_complete");
    let mut job = make_job("jdoe");
    store.job_create(&mut job).expect("create");

    let mut loaded = store
        .job_by_id(&job.job_id, JobLoadOpts { lock: true, ..JobLoadOpts::default() })
        .expect("load")
        .expect("job exists");
    loaded.start().expect("start");
    store.job_save(&mut loaded).expect("save");

    let done = store
        .job_succeed_and_save(&job.job_id, None)
        .expect("succeed");
    assert_eq!(done.status, JobStatus::Successful);
    assert_eq!(done.progress, 100);
    assert_eq!(done.message(), "The job has completed successfully");
}

#[test]
fn pause_resume_then_complete() {
    let mut store = setup("pause_resume");
    let mut job = make_job("jdoe");
    store.job_create(&mut job).expect("create");
    let mut loaded = store
        .job_by_id(&job.job_id, JobLoadOpts::default())
        .expect("load")
        .expect("job exists");
    loaded.start().expect("start");
    store.job_save(&mut loaded).expect("save");

    store.job_pause_and_save(&job.job_id).expect("pause");
    store.job_resume_and_save(&job.job_id).expect("resume");
    let done = store
        .job_succeed_and_save(&job.job_id, None)
        .expect("succeed");
    assert_eq!(done.status, JobStatus::Successful);
    assert_eq!(done.progress, 100);
}

#[test]
fn resume_while_running_is_a_conflict() {
    let mut store = setup("resume_running");
    let mut job = make_job("jdoe");
    store.job_create(&mut job).expect("create");
    let mut loaded = store
        .job_by_id(&job.job_id, JobLoadOpts::default())
        .expect("load")
        .expect("job exists");
    loaded.start().expect("start");
    store.job_save(&mut loaded).expect("save");

    let err = store.job_resume_and_save(&job.job_id).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)), "got: {err}");

    let reloaded = store
        .job_by_id(&job.job_id, JobLoadOpts::default())
        .expect("load")
        .expect("job exists");
    assert_eq!(reloaded.status, JobStatus::Running, "state must not move");
}

#[test]
fn canceled_job_rejects_further_transitions() {
    let mut store = setup("canceled_rejects");
    let mut job = make_job("jdoe");
    store.job_create(&mut job).expect("create");
    start_job(&mut store, &job.job_id);
    store
        .job_cancel_and_save(&job.job_id, Some("user clicked cancel"))
        .expect("cancel");

    let err = store.job_succeed_and_save(&job.job_id, None).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)), "got: {err}");
}

#[test]
fn terminal_write_barrier_blocks_stale_entities() {
    let mut store = setup("write_barrier");
    let mut job = make_job("jdoe");
    store.job_create(&mut job).expect("create");
    start_job(&mut store, &job.job_id);

    // Hold a stale copy while another actor finishes the job.
    let mut stale = store
        .job_by_id(&job.job_id, JobLoadOpts::default())
        .expect("load")
        .expect("job exists");
    let mut other = store
        .job_by_id(&job.job_id, JobLoadOpts::default())
        .expect("load")
        .expect("job exists");
    other.cancel(None).expect("cancel");
    store.job_save(&mut other).expect("save cancel");

    // The stale copy still believes the job is running; the save-time
    // recheck against the stored status refuses the write.
    stale.pause().expect("pause on stale copy");
    let err = store.job_save(&mut stale).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)), "got: {err}");

    // A copy loaded after the cancel carries the terminal original status
    // and is refused by the entity barrier as well.
    let mut finished = store
        .job_by_id(&job.job_id, JobLoadOpts::default())
        .expect("load")
        .expect("job exists");
    finished.status = JobStatus::Running;
    let err = store.job_save(&mut finished).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)), "got: {err}");

    let reloaded = store
        .job_by_id(&job.job_id, JobLoadOpts::default())
        .expect("load")
        .expect("job exists");
    assert_eq!(reloaded.status, JobStatus::Canceled);
}

#[test]
fn refailing_a_failed_job_is_allowed() {
    let mut store = setup("refail");
    let mut job = make_job("jdoe");
    store.job_create(&mut job).expect("create");
    start_job(&mut store, &job.job_id);
    store
        .job_fail_and_save(&job.job_id, Some("first failure"))
        .expect("fail");
    let refailed = store
        .job_fail_and_save(&job.job_id, Some("second failure"))
        .expect("re-fail");
    assert_eq!(refailed.status, JobStatus::Failed);
    assert_eq!(refailed.message(), "second failure");
}

#[test]
fn request_url_is_truncated_at_save() {
    let mut store = setup("request_truncated");
    let mut job = make_job("jdoe");
    job.request = format!("https://example.com/?q={}", "x".repeat(5_000));
    store.job_create(&mut job).expect("create");
    assert_eq!(job.request.chars().count(), 4_096);

    let loaded = store
        .job_by_id(&job.job_id, JobLoadOpts::default())
        .expect("load")
        .expect("job exists");
    assert_eq!(loaded.request.chars().count(), 4_096);
}

#[test]
fn short_request_round_trips_unchanged() {
    let mut store = setup("request_unchanged");
    let mut job = make_job("jdoe");
    let original = job.request.clone();
    store.job_create(&mut job).expect("create");
    let loaded = store
        .job_by_id(&job.job_id, JobLoadOpts::default())
        .expect("load")
        .expect("job exists");
    assert_eq!(loaded.request, original);
}

#[test]
fn invalid_request_url_fails_validation() {
    let mut store = setup("invalid_request");
    let mut job = make_job("jdoe");
    job.request = "ftp://x".to_string();
    let err = store.job_create(&mut job).unwrap_err();
    match err {
        StoreError::Validation(problems) => {
            assert!(problems.iter().any(|p| p.contains("request URL")), "{problems:?}");
        }
        other => panic!("expected validation error, got: {other}"),
    }
}

#[test]
fn failure_message_is_truncated_on_save() {
    let mut store = setup("failure_truncated");
    let mut job = make_job("jdoe");
    store.job_create(&mut job).expect("create");
    start_job(&mut store, &job.job_id);
    store
        .job_fail_and_save(&job.job_id, Some(&"x".repeat(5_000)))
        .expect("fail");

    let loaded = store
        .job_by_id(&job.job_id, JobLoadOpts::default())
        .expect("load")
        .expect("job exists");
    assert_eq!(loaded.message().chars().count(), 3_096);
}

#[test]
fn saved_links_are_never_rewritten() {
    let mut store = setup("links_append_only");
    let mut job = make_job("jdoe");
    job.add_link(JobLink::new("s3://stage/one.nc", "data"));
    store.job_create(&mut job).expect("create");

    let mut loaded = store
        .job_by_id(&job.job_id, load_all())
        .expect("load")
        .expect("job exists");
    assert_eq!(loaded.links.len(), 1);
    assert!(loaded.links[0].id.is_some());

    // Tampering with an already-saved link must not stick; new links append.
    loaded.links[0].href = "s3://stage/tampered.nc".to_string();
    loaded.add_link(JobLink::new("s3://stage/two.nc", "data"));
    store.job_save(&mut loaded).expect("save");

    let reloaded = store
        .job_by_id(&job.job_id, load_all())
        .expect("load")
        .expect("job exists");
    assert_eq!(reloaded.links.len(), 2);
    assert_eq!(reloaded.links[0].href, "s3://stage/one.nc");
    assert_eq!(reloaded.links[1].href, "s3://stage/two.nc");
}

#[test]
fn labels_are_a_set() {
    let mut store = setup("labels_set");
    let mut job = make_job("jdoe");
    job.labels = vec![
        "ice".to_string(),
        " ice ".to_string(),
        "albedo".to_string(),
        String::new(),
    ];
    store.job_create(&mut job).expect("create");

    let loaded = store
        .job_by_id(&job.job_id, load_all())
        .expect("load")
        .expect("job exists");
    assert_eq!(loaded.labels, vec!["albedo".to_string(), "ice".to_string()]);
}

#[test]
fn by_username_filters_other_users() {
    let mut store = setup("by_username");
    let mut job = make_job("jdoe");
    store.job_create(&mut job).expect("create");

    let mine = store
        .job_by_username_and_id("jdoe", &job.job_id, JobLoadOpts::default())
        .expect("load");
    assert!(mine.is_some());
    let theirs = store
        .job_by_username_and_id("intruder", &job.job_id, JobLoadOpts::default())
        .expect("load");
    assert!(theirs.is_none());
}

#[test]
fn num_input_granules_is_optional_on_missing_jobs() {
    let mut store = setup("granules_optional");
    let mut job = make_job("jdoe");
    store.job_create(&mut job).expect("create");

    assert_eq!(
        store.job_num_input_granules(&job.job_id).expect("query"),
        Some(3)
    );
    let absent = sy_core::ids::JobId::new();
    assert_eq!(store.job_num_input_granules(&absent).expect("query"), None);
}

#[test]
fn has_links_filters_by_rel_and_extents() {
    let mut store = setup("has_links");
    let mut job = make_job("jdoe");
    let mut extent_link = JobLink::new("s3://stage/a.nc", "data");
    extent_link.bbox = Some([-180.0, -90.0, 180.0, 90.0]);
    job.add_link(extent_link);
    job.add_staging_bucket_link("s3://stage/");
    store.job_create(&mut job).expect("create");

    assert!(store.job_has_links(&job.job_id, None, false).expect("query"));
    assert!(store.job_has_links(&job.job_id, Some("data"), true).expect("query"));
    assert!(!store
        .job_has_links(&job.job_id, Some("s3-access"), true)
        .expect("query"));
    assert!(!store
        .job_has_links(&job.job_id, Some("self"), false)
        .expect("query"));
}

#[test]
fn cleanup_requires_terminal_status_and_drops_derived_rows() {
    let mut store = setup("cleanup");
    let mut job = make_job("jdoe");
    job.add_link(JobLink::new("s3://stage/a.nc", "data"));
    store.job_create(&mut job).expect("create");
    store
        .job_error_add(&job.job_id, "granule 12 unreadable", None)
        .expect("error add");

    let err = store.job_cleanup(&job.job_id).unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)), "got: {err}");

    start_job(&mut store, &job.job_id);
    store.job_cancel_and_save(&job.job_id, None).expect("cancel");
    store.job_cleanup(&job.job_id).expect("cleanup");

    assert!(!store.job_has_links(&job.job_id, None, false).expect("query"));
    assert!(store
        .job_errors_for_job(&job.job_id, 10)
        .expect("errors")
        .is_empty());
    // The job row itself survives cleanup.
    assert!(store
        .job_by_id(&job.job_id, JobLoadOpts::default())
        .expect("load")
        .is_some());
}
