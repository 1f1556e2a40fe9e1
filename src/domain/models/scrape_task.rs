// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// 领域错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 无效的状态转换
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// 验证错误，当输入数据不符合领域规则时发生
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// 请求模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeMode {
    /// 同步：一次阻塞调用直接返回数据
    Sync,
    /// 异步：提交后通过关联ID轮询结果
    Async,
    /// 批量：多个目标作为一个批次提交
    Batch,
}

impl fmt::Display for ScrapeMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScrapeMode::Sync => write!(f, "sync"),
            ScrapeMode::Async => write!(f, "async"),
            ScrapeMode::Batch => write!(f, "batch"),
        }
    }
}

/// 抓取任务状态
///
/// 状态转换遵循以下流程：
/// Submitted → Pending → Completed/Failed，同步任务可直接由 Submitted 结束
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeTaskStatus {
    #[default]
    Submitted,
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for ScrapeTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScrapeTaskStatus::Submitted => write!(f, "submitted"),
            ScrapeTaskStatus::Pending => write!(f, "pending"),
            ScrapeTaskStatus::Completed => write!(f, "completed"),
            ScrapeTaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// 抓取任务
///
/// 表示发往外部服务商的一次请求。任务只前进不复用。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeTask {
    pub id: Uuid,
    pub mode: ScrapeMode,
    pub platform: String,
    pub targets: Vec<String>,
    /// 服务商返回的任务/批次ID，仅异步与批量模式存在
    pub correlation_id: Option<String>,
    pub status: ScrapeTaskStatus,
    /// 对应的作业记录
    pub job_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ScrapeTask {
    pub fn new(mode: ScrapeMode, platform: impl Into<String>, targets: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            platform: platform.into(),
            targets,
            correlation_id: None,
            status: ScrapeTaskStatus::Submitted,
            job_id: None,
            created_at: Utc::now(),
        }
    }

    /// 记录服务商接受任务，进入等待状态
    ///
    /// # 参数
    ///
    /// * `correlation_id` - 服务商返回的任务/批次ID
    pub fn accept(mut self, correlation_id: impl Into<String>) -> Result<Self, DomainError> {
        match (self.mode, self.status) {
            (ScrapeMode::Async | ScrapeMode::Batch, ScrapeTaskStatus::Submitted) => {
                self.correlation_id = Some(correlation_id.into());
                self.status = ScrapeTaskStatus::Pending;
                Ok(self)
            }
            _ => Err(self.transition_error(ScrapeTaskStatus::Pending)),
        }
    }

    /// 标记完成
    pub fn complete(mut self) -> Result<Self, DomainError> {
        match self.status {
            ScrapeTaskStatus::Submitted if self.mode == ScrapeMode::Sync => {}
            ScrapeTaskStatus::Pending => {}
            _ => return Err(self.transition_error(ScrapeTaskStatus::Completed)),
        }
        self.status = ScrapeTaskStatus::Completed;
        Ok(self)
    }

    pub fn with_job(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    fn transition_error(&self, to: ScrapeTaskStatus) -> DomainError {
        DomainError::InvalidStateTransition {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}
