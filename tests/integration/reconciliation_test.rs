// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::spawn_app;
use chrono::Utc;
use scrapeflow::domain::models::job::JobStatus;
use scrapeflow::domain::repositories::job_repository::JobRepository;
use scrapeflow::domain::services::dispatch_service::DispatchError;
use scrapeflow::workers::reconciliation_worker::ReconciliationWorker;
use sea_orm::ConnectionTrait;
use serde_json::json;
use std::time::Duration;

const URL: &str = "https://www.amazon.com/dp/B000TEST";

#[tokio::test]
async fn test_partial_write_is_reconciled_as_orphaned() {
    let app = spawn_app().await;

    // Hide the results table so the second phase of the write fails
    app.db
        .execute_unprepared("ALTER TABLE results RENAME TO results_hidden")
        .await
        .unwrap();
    let err = app
        .dispatcher
        .persist_result("amazon", "product", json!({"url": URL}), URL, json!({"p": 1}))
        .await
        .unwrap_err();
    let job_id = match err {
        DispatchError::PartialWrite { job_id, .. } => job_id,
        other => panic!("expected partial write, got {:?}", other),
    };
    app.db
        .execute_unprepared("ALTER TABLE results_hidden RENAME TO results")
        .await
        .unwrap();

    let job = app.jobs.find_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let worker = ReconciliationWorker::new(
        app.jobs.clone(),
        Duration::from_secs(3600),
        chrono::Duration::minutes(15),
    );

    // Still inside the grace period
    assert_eq!(worker.sweep(Utc::now()).await.unwrap(), 0);

    let later = Utc::now() + chrono::Duration::minutes(16);
    assert_eq!(worker.sweep(later).await.unwrap(), 1);
    let job = app.jobs.find_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Orphaned);
    assert!(job.error.is_some());
}

#[tokio::test]
async fn test_complete_writes_are_not_reconciled() {
    let app = spawn_app().await;
    let job = app
        .dispatcher
        .persist_result("amazon", "product", json!({"url": URL}), URL, json!({"p": 1}))
        .await
        .unwrap();

    let worker = ReconciliationWorker::new(
        app.jobs.clone(),
        Duration::from_secs(3600),
        chrono::Duration::minutes(15),
    );
    let later = Utc::now() + chrono::Duration::hours(2);
    assert_eq!(worker.sweep(later).await.unwrap(), 0);
    assert_eq!(
        app.jobs.find_by_id(job.id).await.unwrap().unwrap().status,
        JobStatus::Completed
    );
}
