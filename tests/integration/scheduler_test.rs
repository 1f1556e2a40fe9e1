// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::spawn_app;
use chrono::{DateTime, TimeZone, Utc};
use scrapeflow::domain::models::scheduled_job::{Frequency, NewScheduledJob};
use scrapeflow::domain::repositories::result_repository::ResultRepository;
use scrapeflow::domain::repositories::scheduled_job_repository::ScheduledJobRepository;
use scrapeflow::infrastructure::database::entities::job;
use scrapeflow::queue::scheduler::{RecurrenceScheduler, RunStatus};
use sea_orm::EntityTrait;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

fn at(month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, month, day, hour, minute, 0).unwrap()
}

fn new_job(url: &str, frequency: Frequency) -> NewScheduledJob {
    NewScheduledJob {
        platform: "amazon".to_string(),
        target_url: url.to_string(),
        content_type: "product".to_string(),
        frequency,
        day_of_week: None,
        day_of_month: None,
        hour: 6,
        minute: 30,
        active: true,
    }
}

#[tokio::test]
async fn test_tick_runs_due_jobs_and_persists_results() {
    let app = spawn_app().await;
    Mock::given(method("POST"))
        .and(path("/scrape"))
        .and(body_partial_json(json!({"url": "https://shop.test/broken"})))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&app.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/scrape"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"price": 42}
        })))
        .mount(&app.server)
        .await;

    let scheduler = RecurrenceScheduler::new(app.scheduled_jobs.clone(), app.dispatcher.clone(), 2);

    // Monday 2026-10-19 05:00
    let registered = at(10, 19, 5, 0);
    let daily = scheduler
        .register_job(new_job("https://shop.test/daily", Frequency::Daily), registered)
        .await
        .unwrap();
    let mut weekly = new_job("https://shop.test/weekly", Frequency::Weekly);
    weekly.day_of_week = Some(1);
    let weekly = scheduler.register_job(weekly, registered).await.unwrap();
    let broken = scheduler
        .register_job(new_job("https://shop.test/broken", Frequency::Daily), registered)
        .await
        .unwrap();
    let mut monthly = new_job("https://shop.test/monthly", Frequency::Monthly);
    monthly.day_of_month = Some(31);
    let monthly = scheduler.register_job(monthly, registered).await.unwrap();

    assert_eq!(daily.next_run_at, at(10, 19, 6, 30));
    assert_eq!(weekly.next_run_at, at(10, 19, 6, 30));
    assert_eq!(monthly.next_run_at, at(11, 30, 6, 30));

    let now = at(10, 19, 6, 31);
    let outcomes = scheduler.tick(now).await.unwrap();
    assert_eq!(outcomes.len(), 3);
    let status_of = |id: uuid::Uuid| outcomes.iter().find(|o| o.job_id == id).unwrap().status;
    assert_eq!(status_of(daily.id), RunStatus::Success);
    assert_eq!(status_of(weekly.id), RunStatus::Success);
    assert_eq!(status_of(broken.id), RunStatus::Error);

    let daily_after = app.scheduled_jobs.find_by_id(daily.id).await.unwrap().unwrap();
    assert_eq!(daily_after.last_run_at, Some(now));
    assert_eq!(daily_after.next_run_at, at(10, 20, 6, 30));
    let weekly_after = app.scheduled_jobs.find_by_id(weekly.id).await.unwrap().unwrap();
    assert_eq!(weekly_after.next_run_at, at(10, 26, 6, 30));
    let broken_after = app.scheduled_jobs.find_by_id(broken.id).await.unwrap().unwrap();
    assert_eq!(broken_after.next_run_at, at(10, 20, 6, 30));
    assert!(broken_after.last_error.unwrap().contains("503"));

    // One job row and one result row per successful run
    let jobs = job::Entity::find().all(app.db.as_ref()).await.unwrap();
    assert_eq!(jobs.len(), 2);
    for row in &jobs {
        assert_eq!(row.status, "completed");
        let results = app.results.find_by_job_id(row.id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].raw_data, json!({"price": 42}));
    }

    // Nothing is due again until tomorrow
    assert!(scheduler.tick(at(10, 19, 23, 59)).await.unwrap().is_empty());
    assert_eq!(scheduler.tick(at(10, 20, 6, 30)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_paused_job_survives_ticks_and_resumes_from_now() {
    let app = spawn_app().await;
    Mock::given(method("POST"))
        .and(path("/scrape"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .mount(&app.server)
        .await;
    let scheduler = RecurrenceScheduler::new(app.scheduled_jobs.clone(), app.dispatcher.clone(), 1);

    let job = scheduler
        .register_job(new_job("https://shop.test/a", Frequency::Daily), at(10, 19, 5, 0))
        .await
        .unwrap();
    scheduler.pause(job.id).await.unwrap();
    assert!(scheduler.tick(at(10, 25, 0, 0)).await.unwrap().is_empty());

    let resumed = scheduler.resume(job.id, at(10, 25, 12, 0)).await.unwrap();
    assert_eq!(resumed.next_run_at, at(10, 26, 6, 30));

    let stored = app.scheduled_jobs.find_by_id(job.id).await.unwrap().unwrap();
    assert!(stored.active);
    assert_eq!(stored.next_run_at, at(10, 26, 6, 30));
    assert_eq!(stored.last_run_at, None);
}
