// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::*;
use crate::domain::models::job::ResultRecord;
use crate::domain::repositories::result_repository::ResultRepository;
use crate::infrastructure::repositories::result_repo_impl::ResultRepositoryImpl;
use chrono::Duration;
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use serde_json::json;

async fn setup_db() -> Arc<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let db = Arc::new(db);
    Migrator::up(db.as_ref(), None).await.unwrap();
    db
}

fn completed_job(age: Duration) -> JobRecord {
    let mut job = JobRecord::new(
        "amazon",
        "product",
        JobStatus::Completed,
        json!({"url": "https://www.amazon.com/dp/B000TEST"}),
    );
    job.created_at = Utc::now() - age;
    job.updated_at = job.created_at;
    job
}

#[tokio::test]
async fn test_create_and_find() {
    let db = setup_db().await;
    let repo = JobRepositoryImpl::new(db);

    let job = JobRecord::new("ebay", "listing", JobStatus::Pending, json!({"mode": "async"}))
        .with_correlation_id("task-42");
    repo.create(&job).await.unwrap();

    let found = repo.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(found.status, JobStatus::Pending);
    assert_eq!(found.params["mode"], "async");

    let by_correlation = repo.find_by_correlation_id("task-42").await.unwrap().unwrap();
    assert_eq!(by_correlation.id, job.id);
    assert!(repo.find_by_correlation_id("task-43").await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_status() {
    let db = setup_db().await;
    let repo = JobRepositoryImpl::new(db);

    let job = JobRecord::new("ebay", "listing", JobStatus::Pending, json!({}));
    repo.create(&job).await.unwrap();

    repo.update_status(job.id, JobStatus::Failed, Some("provider returned 500".into()))
        .await
        .unwrap();
    let found = repo.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(found.status, JobStatus::Failed);
    assert_eq!(found.error.as_deref(), Some("provider returned 500"));

    assert!(matches!(
        repo.update_status(Uuid::new_v4(), JobStatus::Completed, None).await,
        Err(RepositoryError::NotFound)
    ));
}

#[tokio::test]
async fn test_find_orphaned_skips_jobs_with_results() {
    let db = setup_db().await;
    let jobs = JobRepositoryImpl::new(db.clone());
    let results = ResultRepositoryImpl::new(db);

    let orphan = completed_job(Duration::hours(2));
    let healthy = completed_job(Duration::hours(2));
    let recent = completed_job(Duration::minutes(1));
    let mut pending = completed_job(Duration::hours(2));
    pending.status = JobStatus::Pending;

    for job in [&orphan, &healthy, &recent, &pending] {
        jobs.create(job).await.unwrap();
    }
    results
        .save(&ResultRecord::for_job(&healthy, "https://a.test", json!({"ok": true})))
        .await
        .unwrap();

    let found = jobs
        .find_orphaned(Utc::now() - Duration::minutes(15))
        .await
        .unwrap();
    let ids: Vec<Uuid> = found.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![orphan.id]);
}

#[tokio::test]
async fn test_results_are_listed_per_job() {
    let db = setup_db().await;
    let jobs = JobRepositoryImpl::new(db.clone());
    let results = ResultRepositoryImpl::new(db);

    let job = completed_job(Duration::zero());
    jobs.create(&job).await.unwrap();

    for url in ["https://a.test/1", "https://a.test/2"] {
        let mut record = ResultRecord::for_job(&job, url, json!({"url": url}));
        record.sentiment = Some(json!({"score": 0.4}));
        results.save(&record).await.unwrap();
    }

    let stored = results.find_by_job_id(job.id).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|r| r.platform == "amazon"));
    assert_eq!(stored[0].sentiment, Some(json!({"score": 0.4})));
    assert!(results.find_by_job_id(Uuid::new_v4()).await.unwrap().is_empty());
}
