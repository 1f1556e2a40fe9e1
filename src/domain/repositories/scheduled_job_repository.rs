// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::RepositoryError;
use crate::domain::models::scheduled_job::ScheduledJob;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// 定时作业仓库特质
#[async_trait]
pub trait ScheduledJobRepository: Send + Sync {
    /// 创建定时作业
    async fn create(&self, job: &ScheduledJob) -> Result<ScheduledJob, RepositoryError>;
    /// 根据ID查找
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScheduledJob>, RepositoryError>;
    /// 查找到期作业
    ///
    /// 仅返回 `active` 且 `next_run_at <= now` 的作业，按 `next_run_at`
    /// 升序、相同时间按ID升序排列。
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>, RepositoryError>;
    /// 记录一次执行
    async fn record_run(
        &self,
        id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
        last_error: Option<String>,
    ) -> Result<(), RepositoryError>;
    /// 启用或暂停作业
    async fn set_active(
        &self,
        id: Uuid,
        active: bool,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}
