// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::scheduled_job::{NewScheduledJob, ScheduledJob};
use crate::domain::models::scrape_task::DomainError;
use crate::domain::repositories::scheduled_job_repository::ScheduledJobRepository;
use crate::domain::repositories::RepositoryError;
use crate::domain::services::dispatch_service::{
    DispatchOptions, DispatchRequest, DispatchService, TaskHandle,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::counter;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 调度器错误类型
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// 存储错误
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    /// 作业定义不合法
    #[error("Invalid scheduled job: {0}")]
    InvalidJob(#[from] DomainError),
    /// 作业不存在
    #[error("Scheduled job {0} not found")]
    NotFound(Uuid),
}

/// 单次执行结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

/// 单个作业的执行结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRunOutcome {
    pub job_id: Uuid,
    pub status: RunStatus,
    /// 失败原因或成功写入的作业记录
    pub message: Option<String>,
    /// 重新计算后的下一次执行时间
    pub next_run_at: DateTime<Utc>,
}

/// 重复作业调度器
///
/// 每次 `tick` 取出所有到期作业，以有限并发同步执行，并在每个作业结束后
/// （无论成功失败）更新其 `last_run_at` 与 `next_run_at`。
pub struct RecurrenceScheduler {
    repository: Arc<dyn ScheduledJobRepository>,
    dispatcher: Arc<DispatchService>,
    permits: Arc<Semaphore>,
}

impl RecurrenceScheduler {
    /// 创建新的调度器实例
    ///
    /// # 参数
    ///
    /// * `repository` - 定时作业仓库
    /// * `dispatcher` - 任务分发服务
    /// * `max_concurrency` - 单次 tick 内同时执行的作业数上限
    pub fn new(
        repository: Arc<dyn ScheduledJobRepository>,
        dispatcher: Arc<DispatchService>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// 执行一轮调度
    ///
    /// # 参数
    ///
    /// * `now` - 本轮调度的参考时间
    ///
    /// # 返回值
    ///
    /// * `Ok(Vec<JobRunOutcome>)` - 按到期顺序排列的执行结果
    /// * `Err(SchedulerError)` - 无法读取到期作业
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<JobRunOutcome>, SchedulerError> {
        let due = self.repository.find_due(now).await?;
        if due.is_empty() {
            debug!(%now, "No scheduled jobs due");
            return Ok(Vec::new());
        }
        info!(%now, count = due.len(), "Running due scheduled jobs");

        let mut pending = Vec::with_capacity(due.len());
        let mut handles = Vec::with_capacity(due.len());
        for job in due {
            let repository = self.repository.clone();
            let dispatcher = self.dispatcher.clone();
            let permits = self.permits.clone();
            pending.push((job.id, job.next_run_after(now)));
            handles.push(tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                run_job(repository.as_ref(), dispatcher.as_ref(), job, now).await
            }));
        }

        // join_all keeps the input order, which is the due order
        let outcomes = join_all(handles)
            .await
            .into_iter()
            .zip(pending)
            .map(|(joined, (job_id, fallback_next))| match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(%job_id, "Scheduled job task aborted: {}", e);
                    JobRunOutcome {
                        job_id,
                        status: RunStatus::Error,
                        message: Some(format!("job run aborted: {}", e)),
                        next_run_at: fallback_next,
                    }
                }
            })
            .collect();

        Ok(outcomes)
    }

    /// 注册定时作业
    ///
    /// 校验字段并计算首次执行时间后写入存储。
    pub async fn register_job(
        &self,
        new_job: NewScheduledJob,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJob, SchedulerError> {
        let job = ScheduledJob::create(new_job, now)?;
        self.repository.create(&job).await?;
        info!(
            job_id = %job.id,
            frequency = %job.recurrence.frequency(),
            next_run_at = %job.next_run_at,
            "Registered scheduled job"
        );
        Ok(job)
    }

    /// 暂停作业
    pub async fn pause(&self, id: Uuid) -> Result<(), SchedulerError> {
        let job = self.find(id).await?;
        self.repository
            .set_active(id, false, job.next_run_at)
            .await?;
        info!(job_id = %id, "Paused scheduled job");
        Ok(())
    }

    /// 恢复作业，并以 `now` 为基准重新计算下一次执行时间
    pub async fn resume(&self, id: Uuid, now: DateTime<Utc>) -> Result<ScheduledJob, SchedulerError> {
        let mut job = self.find(id).await?;
        job.active = true;
        job.next_run_at = job.next_run_after(now);
        self.repository.set_active(id, true, job.next_run_at).await?;
        info!(job_id = %id, next_run_at = %job.next_run_at, "Resumed scheduled job");
        Ok(job)
    }

    async fn find(&self, id: Uuid) -> Result<ScheduledJob, SchedulerError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(SchedulerError::NotFound(id))
    }
}

async fn run_job(
    repository: &dyn ScheduledJobRepository,
    dispatcher: &DispatchService,
    mut job: ScheduledJob,
    now: DateTime<Utc>,
) -> JobRunOutcome {
    let result = execute(dispatcher, &job).await;
    let error = result.as_ref().err().cloned();
    job.record_run(now, error.clone());

    let mut outcome = match result {
        Ok(job_record_id) => JobRunOutcome {
            job_id: job.id,
            status: RunStatus::Success,
            message: Some(format!("stored as job {}", job_record_id)),
            next_run_at: job.next_run_at,
        },
        Err(message) => JobRunOutcome {
            job_id: job.id,
            status: RunStatus::Error,
            message: Some(message),
            next_run_at: job.next_run_at,
        },
    };

    if let Err(e) = repository
        .record_run(job.id, now, job.next_run_at, error)
        .await
    {
        error!(job_id = %job.id, "Failed to record scheduled run: {}", e);
        outcome.status = RunStatus::Error;
        outcome.message = Some(format!("failed to record run: {}", e));
    }

    match outcome.status {
        RunStatus::Success => {
            counter!("scheduler_runs_total", "outcome" => "success").increment(1);
            info!(job_id = %job.id, next_run_at = %job.next_run_at, "Scheduled job succeeded");
        }
        RunStatus::Error => {
            counter!("scheduler_runs_total", "outcome" => "error").increment(1);
            warn!(
                job_id = %job.id,
                next_run_at = %job.next_run_at,
                "Scheduled job failed: {}",
                outcome.message.as_deref().unwrap_or_default()
            );
        }
    }

    outcome
}

async fn execute(dispatcher: &DispatchService, job: &ScheduledJob) -> Result<Uuid, String> {
    let options = DispatchOptions {
        content_type: job.content_type.clone(),
        route_via_proxy: dispatcher.proxy_pool().is_some(),
        ..Default::default()
    };
    let request = DispatchRequest::Sync {
        url: job.target_url.clone(),
    };

    let payload = match dispatcher
        .dispatch(request, &job.platform, &options)
        .await
        .map_err(|e| e.to_string())?
    {
        TaskHandle::Fetched { payload, .. } => payload,
        TaskHandle::Submitted { .. } => return Err("sync dispatch returned no payload".into()),
    };

    let params = json!({
        "mode": "sync",
        "url": job.target_url,
        "scheduled_job_id": job.id,
    });
    let record = dispatcher
        .persist_result(&job.platform, &job.content_type, params, &job.target_url, payload)
        .await
        .map_err(|e| e.to_string())?;
    Ok(record.id)
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
