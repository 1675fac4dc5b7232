use appvoc_core::job::{ControllerKind, Job, JobStatus};
use appvoc_core::run::{ItemMetrics, JobRun};
use appvoc_core::traits::JobStore;
use appvoc_core::{Batch, Director, RawResponse, categories};
use appvoc_db::JobRepository;

use crate::integration::common::setup_test_db;

#[tokio::test]
async fn add_and_get_job() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool);

    let job = Job::new(ControllerKind::Rating, 6000, "Business");
    repo.add_job(&job).await.unwrap();

    let stored = repo.get_job(job.id).await.unwrap().expect("job exists");
    assert_eq!(stored.id, job.id);
    assert_eq!(stored.controller, ControllerKind::Rating);
    assert_eq!(stored.category_id, 6000);
    assert_eq!(stored.category, "Business");
    assert_eq!(stored.status, JobStatus::NotStarted);
    assert!(!stored.complete);
    assert_eq!(stored.runs, 0);
    assert!(stored.started.is_none());
}

#[tokio::test]
async fn get_missing_job_is_none() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool);
    assert!(repo.get_job(uuid::Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_category_is_rejected() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool);

    repo.add_job(&Job::new(ControllerKind::Rating, 6000, "Business"))
        .await
        .unwrap();
    let result = repo
        .add_job(&Job::new(ControllerKind::Rating, 6000, "Business"))
        .await;
    assert!(result.is_err());

    // Same category under another controller is a separate job.
    repo.add_job(&Job::new(ControllerKind::Review, 6000, "Business"))
        .await
        .unwrap();
}

#[tokio::test]
async fn update_job_persists_transitions() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool);

    let mut job = Job::new(ControllerKind::Review, 6014, "Games");
    repo.add_job(&job).await.unwrap();

    job.start().unwrap();
    repo.update_job(&job).await.unwrap();
    let stored = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::InProgress);
    assert_eq!(stored.runs, 1);
    assert!(stored.started.is_some());

    job.end(true).unwrap();
    repo.update_job(&job).await.unwrap();
    let stored = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Complete);
    assert!(stored.complete);
    assert!(stored.completed.is_some());
}

#[tokio::test]
async fn update_missing_job_fails() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool);

    let job = Job::new(ControllerKind::Rating, 6000, "Business");
    assert!(repo.update_job(&job).await.is_err());
}

#[tokio::test]
async fn list_and_pick_filter_by_controller_and_status() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool);

    let mut started = Job::new(ControllerKind::Rating, 6018, "Books");
    started.start().unwrap();
    repo.add_job(&started).await.unwrap();
    repo.add_job(&Job::new(ControllerKind::Rating, 6000, "Business"))
        .await
        .unwrap();
    repo.add_job(&Job::new(ControllerKind::Review, 6001, "Weather"))
        .await
        .unwrap();

    let listed = repo.list_jobs(ControllerKind::Rating).await.unwrap();
    let ids: Vec<i64> = listed.iter().map(|j| j.category_id).collect();
    assert_eq!(ids, vec![6000, 6018]);

    let in_progress = repo
        .pick(ControllerKind::Rating, JobStatus::InProgress)
        .await
        .unwrap()
        .expect("one job in progress");
    assert_eq!(in_progress.id, started.id);

    let not_started = repo
        .pick(ControllerKind::Review, JobStatus::NotStarted)
        .await
        .unwrap()
        .expect("one fresh review job");
    assert_eq!(not_started.category_id, 6001);

    assert!(
        repo.pick(ControllerKind::Review, JobStatus::Complete)
            .await
            .unwrap()
            .is_none()
    );

    assert_eq!(repo.delete_jobs(ControllerKind::Rating).await.unwrap(), 2);
    assert!(repo.list_jobs(ControllerKind::Rating).await.unwrap().is_empty());
}

#[tokio::test]
async fn jobrun_insert_and_update() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool);

    let mut job = Job::new(ControllerKind::Rating, 6000, "Business");
    job.start().unwrap();
    repo.add_job(&job).await.unwrap();

    let mut run: JobRun<ItemMetrics> = JobRun::from_job(&job);
    repo.add_jobrun(&run.to_record().unwrap()).await.unwrap();

    let mut batch: Batch<i32> = Batch::new();
    batch.items = vec![1, 2, 3];
    let response = RawResponse::new("https://itunes.apple.com", 200, "{\"ok\":true}");
    batch.record_response(Some(&response));
    batch.record_response(None);
    run.add(&batch);
    run.end(true);
    repo.update_jobrun(&run.to_record().unwrap()).await.unwrap();

    let runs = repo.list_runs(job.id).await.unwrap();
    assert_eq!(runs.len(), 1);
    let stored = &runs[0];
    assert_eq!(stored.id, run.id);
    assert_eq!(stored.requests, 2);
    assert_eq!(stored.items, 3);
    assert!(stored.complete);
    assert!(stored.ended.is_some());
    assert_eq!(stored.metrics["items"], 3);
}

#[tokio::test]
async fn director_seeds_and_selects_from_postgres() {
    let (pool, _container) = setup_test_db().await;
    let director = Director::new(JobRepository::new(pool));

    let cats = categories::resolve(&[6000, 6018]).unwrap();
    assert_eq!(director.seed(ControllerKind::Rating, &cats).await.unwrap(), 2);
    assert_eq!(director.seed(ControllerKind::Rating, &cats).await.unwrap(), 0);

    let mut job = director
        .next(ControllerKind::Rating)
        .await
        .unwrap()
        .expect("a job is available");
    job.start().unwrap();
    director.update_job(&job).await.unwrap();

    // An in-progress job is always preferred.
    for _ in 0..5 {
        let next = director.next(ControllerKind::Rating).await.unwrap().unwrap();
        assert_eq!(next.id, job.id);
    }
}
