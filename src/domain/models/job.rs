// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 作业记录
///
/// 每次抓取执行对应一条作业记录；结果记录通过 `job_id` 引用它。
/// 作业与结果是两次独立写入，结果写入失败的作业由对账流程标记为
/// [`JobStatus::Orphaned`]。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub platform: String,
    pub content_type: String,
    pub status: JobStatus,
    /// 请求参数（目标地址、模式、选项等）
    pub params: serde_json::Value,
    /// 异步/批量任务的服务商关联ID
    pub correlation_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(
        platform: impl Into<String>,
        content_type: impl Into<String>,
        status: JobStatus,
        params: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            platform: platform.into(),
            content_type: content_type.into(),
            status,
            params,
            correlation_id: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// 作业状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 已提交，等待服务商完成
    #[default]
    Pending,
    /// 已完成
    Completed,
    /// 失败
    Failed,
    /// 已完成但缺少结果记录
    Orphaned,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Orphaned => write!(f, "orphaned"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "orphaned" => Ok(JobStatus::Orphaned),
            _ => Err(()),
        }
    }
}

/// 结果记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    pub platform: String,
    pub content_type: String,
    /// 抓取目标地址
    pub url: String,
    /// 服务商返回的原始数据
    pub raw_data: serde_json::Value,
    /// 下游处理后的数据
    pub processed_data: Option<serde_json::Value>,
    /// 下游情感分析结果
    pub sentiment: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl ResultRecord {
    /// 为作业创建结果记录
    ///
    /// # 参数
    ///
    /// * `job` - 所属作业
    /// * `url` - 抓取目标地址
    /// * `raw_data` - 原始数据
    pub fn for_job(job: &JobRecord, url: impl Into<String>, raw_data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: job.id,
            platform: job.platform.clone(),
            content_type: job.content_type.clone(),
            url: url.into(),
            raw_data,
            processed_data: None,
            sentiment: None,
            created_at: Utc::now(),
        }
    }
}
