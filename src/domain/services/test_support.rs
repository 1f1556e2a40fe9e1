// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 单元测试用的内存仓库与可编排的服务商

use crate::domain::models::job::{JobRecord, JobStatus, ResultRecord};
use crate::domain::models::scheduled_job::ScheduledJob;
use crate::domain::repositories::job_repository::JobRepository;
use crate::domain::repositories::result_repository::ResultRepository;
use crate::domain::repositories::scheduled_job_repository::ScheduledJobRepository;
use crate::domain::repositories::RepositoryError;
use crate::provider::{
    BatchStatus, ProviderError, ProviderRequest, RemoteState, ScrapeProvider, Target, TaskStatus,
};
use crate::proxy::ProxyEndpoint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// 作业与结果的内存存储
#[derive(Default)]
pub struct InMemoryStore {
    pub jobs: Mutex<Vec<JobRecord>>,
    pub results: Mutex<Vec<ResultRecord>>,
    pub fail_result_writes: AtomicBool,
    /// 结果表达到该行数后写入失败
    pub result_write_limit: Mutex<Option<usize>>,
}

impl InMemoryStore {
    pub fn job(&self, id: Uuid) -> Option<JobRecord> {
        self.jobs.lock().iter().find(|j| j.id == id).cloned()
    }

    pub fn results_for(&self, job_id: Uuid) -> Vec<ResultRecord> {
        self.results
            .lock()
            .iter()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl JobRepository for InMemoryStore {
    async fn create(&self, job: &JobRecord) -> Result<JobRecord, RepositoryError> {
        self.jobs.lock().push(job.clone());
        Ok(job.clone())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(RepositoryError::NotFound)?;
        job.status = status;
        job.error = error;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<JobRecord>, RepositoryError> {
        Ok(self.job(id))
    }

    async fn find_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Option<JobRecord>, RepositoryError> {
        Ok(self
            .jobs
            .lock()
            .iter()
            .find(|j| j.correlation_id.as_deref() == Some(correlation_id))
            .cloned())
    }

    async fn find_orphaned(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, RepositoryError> {
        let results = self.results.lock();
        Ok(self
            .jobs
            .lock()
            .iter()
            .filter(|j| j.status == JobStatus::Completed && j.updated_at < cutoff)
            .filter(|j| !results.iter().any(|r| r.job_id == j.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ResultRepository for InMemoryStore {
    async fn save(&self, result: &ResultRecord) -> Result<(), RepositoryError> {
        let limit_reached = self
            .result_write_limit
            .lock()
            .is_some_and(|limit| self.results.lock().len() >= limit);
        if limit_reached || self.fail_result_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sea_orm::DbErr::Custom(
                "disk full".to_string(),
            )));
        }
        self.results.lock().push(result.clone());
        Ok(())
    }

    async fn find_by_job_id(&self, job_id: Uuid) -> Result<Vec<ResultRecord>, RepositoryError> {
        Ok(self.results_for(job_id))
    }
}

/// 定时作业的内存存储
#[derive(Default)]
pub struct InMemoryScheduledJobs {
    pub jobs: Mutex<Vec<ScheduledJob>>,
}

impl InMemoryScheduledJobs {
    pub fn get(&self, id: Uuid) -> Option<ScheduledJob> {
        self.jobs.lock().iter().find(|j| j.id == id).cloned()
    }
}

#[async_trait]
impl ScheduledJobRepository for InMemoryScheduledJobs {
    async fn create(&self, job: &ScheduledJob) -> Result<ScheduledJob, RepositoryError> {
        self.jobs.lock().push(job.clone());
        Ok(job.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScheduledJob>, RepositoryError> {
        Ok(self.get(id))
    }

    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>, RepositoryError> {
        let mut due: Vec<ScheduledJob> = self
            .jobs
            .lock()
            .iter()
            .filter(|j| j.active && j.next_run_at <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.next_run_at.cmp(&b.next_run_at).then(a.id.cmp(&b.id)));
        Ok(due)
    }

    async fn record_run(
        &self,
        id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
        last_error: Option<String>,
    ) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(RepositoryError::NotFound)?;
        job.last_run_at = Some(last_run_at);
        job.next_run_at = next_run_at;
        job.last_error = last_error;
        Ok(())
    }

    async fn set_active(
        &self,
        id: Uuid,
        active: bool,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(RepositoryError::NotFound)?;
        job.active = active;
        job.next_run_at = next_run_at;
        Ok(())
    }
}

/// 同步抓取的预设响应
#[derive(Clone)]
pub enum ScrapeScript {
    Payload(Value),
    HttpError(u16),
    Unreachable,
}

/// 可编排的服务商
///
/// 任务/批次状态按队列依次返回，队列只剩一项时重复返回该项。
#[derive(Default)]
pub struct FakeProvider {
    pub scrape_scripts: Mutex<HashMap<String, ScrapeScript>>,
    pub task_statuses: Mutex<VecDeque<TaskStatus>>,
    pub batch_statuses: Mutex<VecDeque<BatchStatus>>,
    pub scrape_calls: Mutex<Vec<(ProviderRequest, Option<ProxyEndpoint>)>>,
    pub fail_submissions: AtomicBool,
    pub polls: AtomicUsize,
    /// 每次同步抓取的耗时
    pub scrape_delay: Mutex<Option<Duration>>,
    /// 同时进行中的同步抓取数的峰值
    pub peak_in_flight: AtomicUsize,
    in_flight: AtomicUsize,
    submissions: AtomicUsize,
}

impl FakeProvider {
    pub fn script(&self, url: &str, script: ScrapeScript) {
        self.scrape_scripts.lock().insert(url.to_string(), script);
    }

    pub fn push_task_status(&self, state: RemoteState, data: Option<Value>) {
        self.task_statuses.lock().push_back(TaskStatus {
            state,
            data,
            error: None,
        });
    }

    fn next<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
        let mut queue = queue.lock();
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn submission_error(&self) -> Option<ProviderError> {
        self.fail_submissions
            .load(Ordering::SeqCst)
            .then(|| ProviderError::Status {
                status: 503,
                body: "unavailable".to_string(),
            })
    }
}

/// 构造一个没有状态码的 reqwest 错误，等同于连接失败
pub fn transport_error() -> ProviderError {
    match reqwest::Client::new().get("http://[invalid").build() {
        Err(e) => ProviderError::Request(e),
        Ok(_) => ProviderError::MalformedPayload("expected a builder error".to_string()),
    }
}

#[async_trait]
impl ScrapeProvider for FakeProvider {
    async fn scrape(
        &self,
        request: &ProviderRequest,
        egress: Option<&ProxyEndpoint>,
    ) -> Result<Value, ProviderError> {
        self.scrape_calls
            .lock()
            .push((request.clone(), egress.cloned()));

        let delay = *self.scrape_delay.lock();
        if let Some(delay) = delay {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        let url = match &request.url {
            Target::One(url) => url.clone(),
            Target::Many(urls) => urls.join(","),
        };
        let script = self.scrape_scripts.lock().get(&url).cloned();
        match script {
            Some(ScrapeScript::Payload(value)) => Ok(value),
            Some(ScrapeScript::HttpError(status)) => Err(ProviderError::Status {
                status,
                body: "scripted failure".to_string(),
            }),
            Some(ScrapeScript::Unreachable) => Err(transport_error()),
            None => Ok(serde_json::json!({ "url": url })),
        }
    }

    async fn submit_task(&self, _request: &ProviderRequest) -> Result<String, ProviderError> {
        if let Some(e) = self.submission_error() {
            return Err(e);
        }
        let n = self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(format!("task-{}", n))
    }

    async fn submit_batch(&self, _request: &ProviderRequest) -> Result<String, ProviderError> {
        if let Some(e) = self.submission_error() {
            return Err(e);
        }
        let n = self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(format!("batch-{}", n))
    }

    async fn task_status(&self, _task_id: &str) -> Result<TaskStatus, ProviderError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::next(&self.task_statuses).unwrap_or(TaskStatus {
            state: RemoteState::Pending,
            data: None,
            error: None,
        }))
    }

    async fn batch_status(&self, _batch_id: &str) -> Result<BatchStatus, ProviderError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::next(&self.batch_statuses).unwrap_or(BatchStatus {
            state: RemoteState::Pending,
            results: Vec::new(),
        }))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
