// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::RepositoryError;
use crate::domain::models::job::ResultRecord;
use async_trait::async_trait;
use uuid::Uuid;

/// 结果仓库特质
#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// 保存结果记录
    async fn save(&self, result: &ResultRecord) -> Result<(), RepositoryError>;
    /// 查找作业的全部结果
    async fn find_by_job_id(&self, job_id: Uuid) -> Result<Vec<ResultRecord>, RepositoryError>;
}
