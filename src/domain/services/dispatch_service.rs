// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::job::{JobRecord, JobStatus, ResultRecord};
use crate::domain::models::scrape_task::{DomainError, ScrapeMode, ScrapeTask, ScrapeTaskStatus};
use crate::domain::repositories::job_repository::JobRepository;
use crate::domain::repositories::result_repository::ResultRepository;
use crate::domain::repositories::RepositoryError;
use crate::provider::{
    BatchStatus, ProviderError, ProviderRequest, RemoteState, ScrapeProvider, Target, TaskStatus,
};
use crate::proxy::ProxyPool;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

const DEFAULT_CONTENT_TYPE: &str = "raw";

/// 分发错误类型
#[derive(Error, Debug)]
pub enum DispatchError {
    /// 服务商调用失败
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
    /// 代理池中所有代理都在黑名单中
    #[error("Proxy pool exhausted, retry after recovery")]
    PoolExhausted,
    /// 轮询超时，任务仍处于等待状态
    #[error("Timed out after {waited:?} waiting for {correlation_id}")]
    PollTimeout {
        correlation_id: String,
        waited: Duration,
    },
    /// 找不到关联ID对应的作业
    #[error("No job found for correlation id {0}")]
    UnknownCorrelation(String),
    /// 作业已写入但结果写入失败
    #[error("Job {job_id} persisted without its result: {source}")]
    PartialWrite {
        job_id: Uuid,
        #[source]
        source: RepositoryError,
    },
    /// 存储错误
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    /// 请求不合法
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// 任务状态转换错误
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl DispatchError {
    /// 机器可读的错误码
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::Provider(ProviderError::Configuration(_)) => "configuration_error",
            DispatchError::Provider(ProviderError::Status { .. }) => "provider_http_error",
            DispatchError::Provider(ProviderError::MalformedPayload(_)) => "provider_malformed",
            DispatchError::Provider(ProviderError::Request(_)) => "provider_unreachable",
            DispatchError::PoolExhausted => "pool_exhausted",
            DispatchError::PollTimeout { .. } => "poll_timeout",
            DispatchError::UnknownCorrelation(_) => "unknown_correlation",
            DispatchError::PartialWrite { .. } => "partial_write",
            DispatchError::Repository(_) => "repository_error",
            DispatchError::InvalidRequest(_) => "invalid_request",
            DispatchError::Domain(_) => "invalid_state",
        }
    }

    /// 调用方重试是否有意义
    pub fn is_transient(&self) -> bool {
        match self {
            DispatchError::Provider(e) => e.is_transport(),
            DispatchError::PoolExhausted | DispatchError::PollTimeout { .. } => true,
            _ => false,
        }
    }
}

/// 分发请求
///
/// 每种模式只携带自己需要的字段。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DispatchRequest {
    Sync { url: String },
    Async { url: String },
    Batch { urls: Vec<String> },
}

impl DispatchRequest {
    pub fn mode(&self) -> ScrapeMode {
        match self {
            DispatchRequest::Sync { .. } => ScrapeMode::Sync,
            DispatchRequest::Async { .. } => ScrapeMode::Async,
            DispatchRequest::Batch { .. } => ScrapeMode::Batch,
        }
    }

    pub fn targets(&self) -> Vec<String> {
        match self {
            DispatchRequest::Sync { url } | DispatchRequest::Async { url } => vec![url.clone()],
            DispatchRequest::Batch { urls } => urls.clone(),
        }
    }

    fn validate(&self) -> Result<(), DispatchError> {
        let targets = self.targets();
        if targets.is_empty() {
            return Err(DispatchError::InvalidRequest("batch has no targets".into()));
        }
        for target in &targets {
            if target.trim().is_empty() {
                return Err(DispatchError::InvalidRequest("target url is empty".into()));
            }
            Url::parse(target).map_err(|e| {
                DispatchError::InvalidRequest(format!("invalid target url '{}': {}", target, e))
            })?;
        }
        Ok(())
    }

    fn target(&self) -> Target {
        match self {
            DispatchRequest::Sync { url } | DispatchRequest::Async { url } => {
                Target::One(url.clone())
            }
            DispatchRequest::Batch { urls } => Target::Many(urls.clone()),
        }
    }
}

/// 分发选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchOptions {
    /// 内容类型，写入作业与结果记录
    pub content_type: String,
    pub headless_mode: Option<bool>,
    pub geo: Option<String>,
    pub locale: Option<String>,
    pub device_type: Option<String>,
    pub session_id: Option<String>,
    /// 同步请求是否经由代理池出口
    pub route_via_proxy: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            headless_mode: None,
            geo: None,
            locale: None,
            device_type: None,
            session_id: None,
            route_via_proxy: false,
        }
    }
}

/// 分发结果句柄
#[derive(Debug, Clone)]
pub enum TaskHandle {
    /// 同步模式：直接拿到数据，由调用方持久化
    Fetched { task: ScrapeTask, payload: Value },
    /// 异步/批量模式：已提交，等待轮询
    Submitted { task: ScrapeTask },
}

impl TaskHandle {
    pub fn task(&self) -> &ScrapeTask {
        match self {
            TaskHandle::Fetched { task, .. } | TaskHandle::Submitted { task } => task,
        }
    }
}

/// 单任务轮询结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub job_id: Uuid,
    pub status: ScrapeTaskStatus,
    pub data: Option<Value>,
    pub error: Option<String>,
}

/// 批次中单个目标的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItemResult {
    pub url: String,
    pub status: ScrapeTaskStatus,
    pub data: Option<Value>,
    pub error: Option<String>,
}

/// 批次轮询结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    pub job_id: Uuid,
    pub status: ScrapeTaskStatus,
    pub items: Vec<BatchItemResult>,
}

fn task_status(state: RemoteState) -> ScrapeTaskStatus {
    match state {
        RemoteState::Pending => ScrapeTaskStatus::Pending,
        RemoteState::Completed => ScrapeTaskStatus::Completed,
        RemoteState::Failed => ScrapeTaskStatus::Failed,
    }
}

fn record_outcome(mode: ScrapeMode, outcome: &'static str) {
    counter!("dispatch_requests_total", "mode" => mode.to_string(), "outcome" => outcome)
        .increment(1);
}

/// 任务分发服务
///
/// 调用外部服务商执行同步、异步和批量抓取，并负责作业与结果记录的写入。
/// 不做内部重试，重试策略由调度器或调用方决定。
pub struct DispatchService {
    provider: Arc<dyn ScrapeProvider>,
    job_repository: Arc<dyn JobRepository>,
    result_repository: Arc<dyn ResultRepository>,
    proxy_pool: Option<Arc<ProxyPool>>,
    poll_interval: Duration,
}

impl DispatchService {
    /// 创建新的分发服务实例
    ///
    /// # 参数
    ///
    /// * `provider` - 抓取服务商
    /// * `job_repository` - 作业仓库
    /// * `result_repository` - 结果仓库
    /// * `poll_interval` - 轮询间隔
    pub fn new(
        provider: Arc<dyn ScrapeProvider>,
        job_repository: Arc<dyn JobRepository>,
        result_repository: Arc<dyn ResultRepository>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            provider,
            job_repository,
            result_repository,
            proxy_pool: None,
            poll_interval,
        }
    }

    /// 挂接代理池，同步请求可经由代理出口
    pub fn with_proxy_pool(mut self, pool: Arc<ProxyPool>) -> Self {
        self.proxy_pool = Some(pool);
        self
    }

    pub fn proxy_pool(&self) -> Option<&Arc<ProxyPool>> {
        self.proxy_pool.as_ref()
    }

    /// 分发抓取请求
    ///
    /// # 参数
    ///
    /// * `request` - 请求（同步/异步/批量）
    /// * `platform` - 平台标识
    /// * `options` - 分发选项
    ///
    /// # 返回值
    ///
    /// * `Ok(TaskHandle::Fetched)` - 同步模式，携带数据
    /// * `Ok(TaskHandle::Submitted)` - 异步/批量模式，携带关联ID与作业ID
    /// * `Err(DispatchError)` - 请求不合法、代理池耗尽或服务商调用失败
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
        platform: &str,
        options: &DispatchOptions,
    ) -> Result<TaskHandle, DispatchError> {
        request.validate()?;
        let mode = request.mode();
        let task = ScrapeTask::new(mode, platform, request.targets());
        let body = self.provider_request(&request, platform, options);

        let result = match mode {
            ScrapeMode::Sync => self.dispatch_sync(task, &body, options).await,
            ScrapeMode::Async | ScrapeMode::Batch => {
                self.dispatch_submission(task, &request, &body, options)
                    .await
            }
        };

        match &result {
            Ok(handle) => {
                record_outcome(mode, "success");
                debug!(
                    task_id = %handle.task().id,
                    mode = %mode,
                    platform,
                    correlation_id = ?handle.task().correlation_id,
                    "Dispatched scrape task"
                );
            }
            Err(e) => {
                record_outcome(mode, e.code());
                warn!(mode = %mode, platform, code = e.code(), "Dispatch failed: {}", e);
            }
        }
        result
    }

    async fn dispatch_sync(
        &self,
        task: ScrapeTask,
        body: &ProviderRequest,
        options: &DispatchOptions,
    ) -> Result<TaskHandle, DispatchError> {
        let egress = match (&self.proxy_pool, options.route_via_proxy) {
            (Some(pool), true) => Some(pool.select_endpoint().ok_or(DispatchError::PoolExhausted)?),
            _ => None,
        };

        let outcome = self.provider.scrape(body, egress.as_ref()).await;

        if let (Some(pool), Some(endpoint)) = (&self.proxy_pool, &egress) {
            match &outcome {
                Ok(_) => pool.report_success(endpoint),
                Err(e) => pool.report_failure(endpoint, e.is_transport()),
            }
        }

        let payload = outcome?;
        Ok(TaskHandle::Fetched {
            task: task.complete()?,
            payload,
        })
    }

    async fn dispatch_submission(
        &self,
        task: ScrapeTask,
        request: &DispatchRequest,
        body: &ProviderRequest,
        options: &DispatchOptions,
    ) -> Result<TaskHandle, DispatchError> {
        let correlation_id = match request {
            DispatchRequest::Batch { .. } => self.provider.submit_batch(body).await?,
            _ => self.provider.submit_task(body).await?,
        };

        let job = JobRecord::new(
            task.platform.clone(),
            options.content_type.clone(),
            JobStatus::Pending,
            self.job_params(request, options),
        )
        .with_correlation_id(correlation_id.clone());
        self.job_repository.create(&job).await?;

        let task = task.accept(correlation_id)?.with_job(job.id);
        Ok(TaskHandle::Submitted { task })
    }

    /// 轮询异步任务结果
    ///
    /// 完成时写入结果记录并将作业标记为完成；失败时将作业标记为失败。
    /// 超时返回 [`DispatchError::PollTimeout`]，作业保持等待状态，之后仍可
    /// 用同一关联ID再次获取。
    ///
    /// # 参数
    ///
    /// * `correlation_id` - 服务商任务ID
    /// * `timeout` - 最长等待时间
    pub async fn fetch_result(
        &self,
        correlation_id: &str,
        timeout: Duration,
    ) -> Result<TaskResult, DispatchError> {
        let job = self.find_job(correlation_id).await?;

        if job.status.is_terminal() {
            return self.stored_result(&job).await;
        }

        let status: TaskStatus = self
            .poll_until_terminal(correlation_id, timeout, || {
                self.provider.task_status(correlation_id)
            })
            .await?;

        match status.state {
            RemoteState::Completed => {
                let data = status.data.unwrap_or(Value::Null);
                let url = job.params["url"].as_str().unwrap_or_default().to_string();
                self.complete_job(&job, vec![(url, data.clone())]).await?;
                record_outcome(ScrapeMode::Async, "completed");
                Ok(TaskResult {
                    job_id: job.id,
                    status: ScrapeTaskStatus::Completed,
                    data: Some(data),
                    error: None,
                })
            }
            _ => {
                let error = status
                    .error
                    .unwrap_or_else(|| "provider reported failure".to_string());
                self.job_repository
                    .update_status(job.id, JobStatus::Failed, Some(error.clone()))
                    .await?;
                record_outcome(ScrapeMode::Async, "failed");
                Ok(TaskResult {
                    job_id: job.id,
                    status: ScrapeTaskStatus::Failed,
                    data: None,
                    error: Some(error),
                })
            }
        }
    }

    /// 轮询批量任务结果
    ///
    /// 整个批次完成后，逐个目标写入结果记录（仅限有数据的目标）。没有任何目标
    /// 产出数据时作业标记为失败。已结束的批次直接从存储返回，不再轮询。
    pub async fn fetch_batch_result(
        &self,
        batch_id: &str,
        timeout: Duration,
    ) -> Result<BatchResult, DispatchError> {
        let job = self.find_job(batch_id).await?;

        if job.status.is_terminal() {
            return self.stored_batch_result(&job).await;
        }

        let status: BatchStatus = self
            .poll_until_terminal(batch_id, timeout, || self.provider.batch_status(batch_id))
            .await?;

        let items: Vec<BatchItemResult> = status
            .results
            .into_iter()
            .map(|item| BatchItemResult {
                url: item.url,
                status: task_status(item.state),
                data: item.data,
                error: item.error,
            })
            .collect();

        let payloads: Vec<(String, Value)> = items
            .iter()
            .filter(|item| item.status == ScrapeTaskStatus::Completed)
            .filter_map(|item| item.data.clone().map(|data| (item.url.clone(), data)))
            .collect();

        let failure = match status.state {
            RemoteState::Failed => Some("provider reported batch failure"),
            _ if payloads.is_empty() => Some("no target in the batch produced data"),
            _ => None,
        };
        if let Some(reason) = failure {
            self.job_repository
                .update_status(job.id, JobStatus::Failed, Some(reason.to_string()))
                .await?;
            record_outcome(ScrapeMode::Batch, "failed");
            warn!(job_id = %job.id, batch_id, "Batch failed: {}", reason);
            return Ok(BatchResult {
                job_id: job.id,
                status: ScrapeTaskStatus::Failed,
                items,
            });
        }

        self.complete_job(&job, payloads).await?;
        record_outcome(ScrapeMode::Batch, "completed");

        Ok(BatchResult {
            job_id: job.id,
            status: ScrapeTaskStatus::Completed,
            items,
        })
    }

    /// 两阶段写入：先写作业记录（已完成），再写结果记录
    ///
    /// 第二步失败时作业记录保留，返回携带作业ID的 [`DispatchError::PartialWrite`]，
    /// 由对账流程处理。
    ///
    /// # 返回值
    ///
    /// * `Ok(JobRecord)` - 写入的作业记录
    /// * `Err(DispatchError)` - 写入失败
    pub async fn persist_result(
        &self,
        platform: &str,
        content_type: &str,
        params: Value,
        url: &str,
        payload: Value,
    ) -> Result<JobRecord, DispatchError> {
        let job = JobRecord::new(platform, content_type, JobStatus::Completed, params);
        self.job_repository.create(&job).await?;

        let result = ResultRecord::for_job(&job, url, payload);
        self.save_result(job.id, &result).await?;

        info!(job_id = %job.id, platform, url, "Persisted scrape result");
        Ok(job)
    }

    fn provider_request(
        &self,
        request: &DispatchRequest,
        platform: &str,
        options: &DispatchOptions,
    ) -> ProviderRequest {
        ProviderRequest {
            url: request.target(),
            platform: platform.to_string(),
            headless_mode: options.headless_mode,
            geo: options.geo.clone(),
            locale: options.locale.clone(),
            device_type: options.device_type.clone(),
            session_id: options.session_id.clone(),
        }
    }

    fn job_params(&self, request: &DispatchRequest, options: &DispatchOptions) -> Value {
        let mut params = json!({
            "mode": request.mode().to_string(),
            "options": options,
        });
        match request {
            DispatchRequest::Sync { url } | DispatchRequest::Async { url } => {
                params["url"] = json!(url);
            }
            DispatchRequest::Batch { urls } => {
                params["urls"] = json!(urls);
            }
        }
        params
    }

    async fn find_job(&self, correlation_id: &str) -> Result<JobRecord, DispatchError> {
        self.job_repository
            .find_by_correlation_id(correlation_id)
            .await?
            .ok_or_else(|| DispatchError::UnknownCorrelation(correlation_id.to_string()))
    }

    async fn stored_result(&self, job: &JobRecord) -> Result<TaskResult, DispatchError> {
        let status = match job.status {
            JobStatus::Completed => ScrapeTaskStatus::Completed,
            _ => ScrapeTaskStatus::Failed,
        };
        let data = self
            .result_repository
            .find_by_job_id(job.id)
            .await?
            .into_iter()
            .next()
            .map(|r| r.raw_data);

        Ok(TaskResult {
            job_id: job.id,
            status,
            data,
            error: job.error.clone(),
        })
    }

    async fn stored_batch_result(&self, job: &JobRecord) -> Result<BatchResult, DispatchError> {
        let status = match job.status {
            JobStatus::Completed => ScrapeTaskStatus::Completed,
            _ => ScrapeTaskStatus::Failed,
        };
        let items = self
            .result_repository
            .find_by_job_id(job.id)
            .await?
            .into_iter()
            .map(|r| BatchItemResult {
                url: r.url,
                status: ScrapeTaskStatus::Completed,
                data: Some(r.raw_data),
                error: None,
            })
            .collect();

        Ok(BatchResult {
            job_id: job.id,
            status,
            items,
        })
    }

    async fn poll_until_terminal<T, F, Fut>(
        &self,
        correlation_id: &str,
        timeout: Duration,
        poll: F,
    ) -> Result<T, DispatchError>
    where
        T: PollState,
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let polling = async {
            loop {
                let status = poll().await?;
                if status.state().is_terminal() {
                    return Ok::<T, DispatchError>(status);
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        match tokio::time::timeout(timeout, polling).await {
            Ok(result) => result,
            Err(_) => {
                debug!(correlation_id, ?timeout, "Poll timed out, task left pending");
                Err(DispatchError::PollTimeout {
                    correlation_id: correlation_id.to_string(),
                    waited: timeout,
                })
            }
        }
    }

    /// 标记作业完成并写入其全部结果
    ///
    /// 多个结果中途写入失败时，已有部分行存在，对账查询无法识别，因此当场把
    /// 作业标记为孤立。
    async fn complete_job(
        &self,
        job: &JobRecord,
        payloads: Vec<(String, Value)>,
    ) -> Result<(), DispatchError> {
        self.job_repository
            .update_status(job.id, JobStatus::Completed, None)
            .await?;

        for (url, data) in payloads {
            let result = ResultRecord::for_job(job, url, data);
            if let Err(e) = self.save_result(job.id, &result).await {
                if let Err(mark) = self
                    .job_repository
                    .update_status(
                        job.id,
                        JobStatus::Orphaned,
                        Some(format!("result write failed: {}", e)),
                    )
                    .await
                {
                    error!(job_id = %job.id, "Failed to mark job orphaned: {}", mark);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    async fn save_result(&self, job_id: Uuid, result: &ResultRecord) -> Result<(), DispatchError> {
        if let Err(source) = self.result_repository.save(result).await {
            counter!("dispatch_partial_writes_total").increment(1);
            error!(
                job_id = %job_id,
                url = %result.url,
                "Result write failed after job was persisted, left for reconciliation: {}",
                source
            );
            return Err(DispatchError::PartialWrite { job_id, source });
        }
        Ok(())
    }
}

/// 轮询结果的公共视图
trait PollState {
    fn state(&self) -> RemoteState;
}

impl PollState for TaskStatus {
    fn state(&self) -> RemoteState {
        self.state
    }
}

impl PollState for BatchStatus {
    fn state(&self) -> RemoteState {
        self.state
    }
}

#[cfg(test)]
#[path = "dispatch_service_test.rs"]
mod tests;
