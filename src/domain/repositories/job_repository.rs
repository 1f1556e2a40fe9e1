// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::RepositoryError;
use crate::domain::models::job::{JobRecord, JobStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// 作业仓库特质
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 创建作业记录
    async fn create(&self, job: &JobRecord) -> Result<JobRecord, RepositoryError>;
    /// 更新作业状态与错误信息
    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<(), RepositoryError>;
    /// 根据ID查找作业
    async fn find_by_id(&self, id: Uuid) -> Result<Option<JobRecord>, RepositoryError>;
    /// 根据服务商关联ID查找作业
    async fn find_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Option<JobRecord>, RepositoryError>;
    /// 查找在 `cutoff` 之前完成但没有任何结果记录的作业
    async fn find_orphaned(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, RepositoryError>;
}
