// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{spawn_app, API_TOKEN};
use scrapeflow::domain::models::job::JobStatus;
use scrapeflow::domain::models::scrape_task::ScrapeTaskStatus;
use scrapeflow::domain::repositories::job_repository::JobRepository;
use scrapeflow::domain::repositories::result_repository::ResultRepository;
use scrapeflow::domain::services::dispatch_service::{
    DispatchError, DispatchOptions, DispatchRequest, TaskHandle,
};
use scrapeflow::infrastructure::database::entities::job;
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

const PRODUCT_URL: &str = "https://www.amazon.com/dp/B000TEST";

#[tokio::test]
async fn test_async_dispatch_then_fetch_persists_job_and_result() {
    let app = spawn_app().await;
    Mock::given(method("POST"))
        .and(path("/task"))
        .and(header("authorization", format!("Bearer {}", API_TOKEN).as_str()))
        .and(body_partial_json(json!({"url": PRODUCT_URL, "platform": "amazon"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "t-100"})))
        .expect(1)
        .mount(&app.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/task/t-100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "queued"})))
        .up_to_n_times(2)
        .mount(&app.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/task/t-100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "data": {"title": "Widget", "price": 19.5}
        })))
        .mount(&app.server)
        .await;

    let handle = app
        .dispatcher
        .dispatch(
            DispatchRequest::Async {
                url: PRODUCT_URL.to_string(),
            },
            "amazon",
            &DispatchOptions {
                content_type: "product".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let task = handle.task().clone();
    assert_eq!(task.correlation_id.as_deref(), Some("t-100"));
    let job_id = task.job_id.unwrap();

    let pending = app.jobs.find_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(pending.status, JobStatus::Pending);
    assert_eq!(pending.params["url"], PRODUCT_URL);

    let result = app
        .dispatcher
        .fetch_result("t-100", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(result.status, ScrapeTaskStatus::Completed);
    assert_eq!(result.job_id, job_id);

    let job = app.jobs.find_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let stored = app.results.find_by_job_id(job_id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].url, PRODUCT_URL);
    assert_eq!(stored[0].content_type, "product");
    assert_eq!(stored[0].raw_data["title"], "Widget");

    // Served from the store without another provider round-trip
    let again = app
        .dispatcher
        .fetch_result("t-100", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(again.status, ScrapeTaskStatus::Completed);
    assert_eq!(again.data, Some(json!({"title": "Widget", "price": 19.5})));
}

#[tokio::test]
async fn test_sync_dispatch_and_persist() {
    let app = spawn_app().await;
    Mock::given(method("POST"))
        .and(path("/scrape"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"rating": 4.5}
        })))
        .expect(1)
        .mount(&app.server)
        .await;

    let handle = app
        .dispatcher
        .dispatch(
            DispatchRequest::Sync {
                url: PRODUCT_URL.to_string(),
            },
            "amazon",
            &DispatchOptions::default(),
        )
        .await
        .unwrap();
    let payload = match handle {
        TaskHandle::Fetched { payload, .. } => payload,
        other => panic!("expected fetched payload, got {:?}", other),
    };
    assert_eq!(payload, json!({"rating": 4.5}));

    let job = app
        .dispatcher
        .persist_result(
            "amazon",
            "review",
            json!({"mode": "sync", "url": PRODUCT_URL}),
            PRODUCT_URL,
            payload,
        )
        .await
        .unwrap();

    let stored_job = app.jobs.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored_job.status, JobStatus::Completed);
    let stored = app.results.find_by_job_id(job.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].raw_data, json!({"rating": 4.5}));
}

#[tokio::test]
async fn test_batch_dispatch_persists_completed_targets() {
    let app = spawn_app().await;
    let urls = vec![
        "https://shop.test/1".to_string(),
        "https://shop.test/2".to_string(),
        "https://shop.test/3".to_string(),
    ];
    Mock::given(method("POST"))
        .and(path("/task/batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"batch_id": "b-7"})))
        .expect(1)
        .mount(&app.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/task/batch/b-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "results": [
                {"url": "https://shop.test/1", "status": "completed", "data": {"n": 1}},
                {"url": "https://shop.test/2", "status": "failed", "error": "captcha"},
                {"url": "https://shop.test/3", "status": "completed", "data": {"n": 3}}
            ]
        })))
        .mount(&app.server)
        .await;

    let handle = app
        .dispatcher
        .dispatch(
            DispatchRequest::Batch { urls },
            "shopee",
            &DispatchOptions::default(),
        )
        .await
        .unwrap();
    let job_id = handle.task().job_id.unwrap();

    let batch = app
        .dispatcher
        .fetch_batch_result("b-7", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(batch.status, ScrapeTaskStatus::Completed);
    assert_eq!(batch.items.len(), 3);
    assert_eq!(batch.items[1].error.as_deref(), Some("captcha"));

    let stored = app.results.find_by_job_id(job_id).await.unwrap();
    let mut stored_urls: Vec<&str> = stored.iter().map(|r| r.url.as_str()).collect();
    stored_urls.sort();
    assert_eq!(stored_urls, vec!["https://shop.test/1", "https://shop.test/3"]);
}

#[tokio::test]
async fn test_rejected_submission_writes_nothing() {
    let app = spawn_app().await;
    Mock::given(method("POST"))
        .and(path("/task"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&app.server)
        .await;

    let err = app
        .dispatcher
        .dispatch(
            DispatchRequest::Async {
                url: PRODUCT_URL.to_string(),
            },
            "amazon",
            &DispatchOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "provider_http_error");
    assert!(!err.is_transient());
    assert_eq!(job::Entity::find().count(app.db.as_ref()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_poll_timeout_leaves_job_pending() {
    let app = spawn_app().await;
    Mock::given(method("POST"))
        .and(path("/task"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "t-slow"})))
        .mount(&app.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/task/t-slow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
        .mount(&app.server)
        .await;

    let handle = app
        .dispatcher
        .dispatch(
            DispatchRequest::Async {
                url: PRODUCT_URL.to_string(),
            },
            "amazon",
            &DispatchOptions::default(),
        )
        .await
        .unwrap();
    let job_id = handle.task().job_id.unwrap();

    let err = app
        .dispatcher
        .fetch_result("t-slow", Duration::from_millis(150))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::PollTimeout { .. }));

    let job = app.jobs.find_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
}

#[tokio::test]
async fn test_unknown_correlation_id() {
    let app = spawn_app().await;
    let err = app
        .dispatcher
        .fetch_result("never-submitted", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::UnknownCorrelation(id) if id == "never-submitted"));
}
