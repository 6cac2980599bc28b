use hermes_core::job::JobStatus;
use hermes_core::job_store::{INTERRUPTED_ERROR, JobSnapshot, JobStore};
use hermes_core::traits::SnapshotStore;
use hermes_core::AppError;
use hermes_store::FileSnapshotStore;

use crate::integration::common::record;

#[tokio::test]
async fn save_and_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSnapshotStore::new(dir.path().join("jobs.json"));

    let snapshot = JobSnapshot {
        jobs: vec![record(JobStatus::Completed, 3), record(JobStatus::Failed, 0)],
        saved_at: Some(chrono::Utc::now()),
    };
    store.save(&snapshot).await.unwrap();

    let loaded = store.load().await.unwrap();
    assert_eq!(loaded, snapshot);
    assert_eq!(loaded.jobs[0].items.len(), 3);
    assert!(!dir.path().join("jobs.json.tmp").exists());
}

#[tokio::test]
async fn save_replaces_previous_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSnapshotStore::new(dir.path().join("jobs.json"));

    store
        .save(&JobSnapshot {
            jobs: vec![record(JobStatus::Completed, 1), record(JobStatus::Completed, 2)],
            saved_at: None,
        })
        .await
        .unwrap();
    store.save(&JobSnapshot::default()).await.unwrap();

    assert!(store.load().await.unwrap().jobs.is_empty());
}

#[tokio::test]
async fn save_creates_missing_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("hermes").join("jobs.json");
    let store = FileSnapshotStore::new(&path);

    store.save(&JobSnapshot::default()).await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn corrupt_file_is_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = FileSnapshotStore::new(&path).load().await.unwrap_err();
    assert!(matches!(err, AppError::PersistenceError(_)));
}

#[tokio::test]
async fn empty_file_loads_empty_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");
    std::fs::write(&path, "\n").unwrap();

    let loaded = FileSnapshotStore::new(&path).load().await.unwrap();
    assert!(loaded.jobs.is_empty());
}

#[tokio::test]
async fn concurrent_saves_leave_a_valid_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSnapshotStore::new(dir.path().join("jobs.json"));

    let mut handles = Vec::new();
    for n in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let jobs = (0..n).map(|_| record(JobStatus::Completed, 1)).collect();
            store
                .save(&JobSnapshot {
                    jobs,
                    saved_at: None,
                })
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let loaded = store.load().await.unwrap();
    assert!(loaded.jobs.len() < 8);
}

#[tokio::test]
async fn restart_marks_unfinished_jobs_failed() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSnapshotStore::new(dir.path().join("jobs.json"));

    let running = record(JobStatus::Running, 4);
    let done = record(JobStatus::Completed, 2);
    store
        .save(&JobSnapshot {
            jobs: vec![running.clone(), done.clone()],
            saved_at: None,
        })
        .await
        .unwrap();

    let jobs = JobStore::new();
    assert_eq!(jobs.restore(store.load().await.unwrap()), 1);

    let interrupted = jobs.get(running.id).unwrap();
    assert_eq!(interrupted.status, JobStatus::Failed);
    assert_eq!(interrupted.error.as_deref(), Some(INTERRUPTED_ERROR));
    assert_eq!(interrupted.items.len(), 4);
    assert_eq!(jobs.get(done.id).unwrap().status, JobStatus::Completed);
}
