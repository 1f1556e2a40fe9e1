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

use crate::domain::models::job::{JobRecord, JobStatus};
use crate::domain::repositories::job_repository::JobRepository;
use crate::domain::repositories::RepositoryError;
use crate::infrastructure::database::entities::job as job_entity;
use crate::infrastructure::database::entities::result as result_entity;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use std::sync::Arc;
use uuid::Uuid;

/// 作业仓库实现
pub struct JobRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl JobRepositoryImpl {
    /// 创建新的作业仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<job_entity::Model> for JobRecord {
    fn from(model: job_entity::Model) -> Self {
        Self {
            id: model.id,
            platform: model.platform,
            content_type: model.content_type,
            status: model.status.parse().unwrap_or_default(),
            params: model.params,
            correlation_id: model.correlation_id,
            error: model.error,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<JobRecord> for job_entity::ActiveModel {
    fn from(job: JobRecord) -> Self {
        Self {
            id: Set(job.id),
            platform: Set(job.platform),
            content_type: Set(job.content_type),
            status: Set(job.status.to_string()),
            params: Set(job.params),
            correlation_id: Set(job.correlation_id),
            error: Set(job.error),
            created_at: Set(job.created_at.into()),
            updated_at: Set(job.updated_at.into()),
        }
    }
}

#[async_trait]
impl JobRepository for JobRepositoryImpl {
    async fn create(&self, job: &JobRecord) -> Result<JobRecord, RepositoryError> {
        let model: job_entity::ActiveModel = job.clone().into();

        model.insert(self.db.as_ref()).await?;
        Ok(job.clone())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<(), RepositoryError> {
        let now: DateTime<FixedOffset> = Utc::now().into();
        let result = job_entity::Entity::update_many()
            .col_expr(job_entity::Column::Status, Expr::value(status.to_string()))
            .col_expr(job_entity::Column::Error, Expr::value(error))
            .col_expr(job_entity::Column::UpdatedAt, Expr::value(now))
            .filter(job_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<JobRecord>, RepositoryError> {
        let model = job_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(Into::into))
    }

    async fn find_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Option<JobRecord>, RepositoryError> {
        let model = job_entity::Entity::find()
            .filter(job_entity::Column::CorrelationId.eq(correlation_id))
            .order_by_desc(job_entity::Column::CreatedAt)
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(Into::into))
    }

    async fn find_orphaned(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, RepositoryError> {
        let cutoff: DateTime<FixedOffset> = cutoff.into();
        let with_results = result_entity::Entity::find()
            .select_only()
            .column(result_entity::Column::JobId)
            .into_query();

        let models = job_entity::Entity::find()
            .filter(job_entity::Column::Status.eq(JobStatus::Completed.to_string()))
            .filter(job_entity::Column::UpdatedAt.lt(cutoff))
            .filter(job_entity::Column::Id.not_in_subquery(with_results))
            .order_by_asc(job_entity::Column::UpdatedAt)
            .all(self.db.as_ref())
            .await?;

        Ok(models.into_iter().map(JobRecord::from).collect())
    }
}

#[cfg(test)]
#[path = "job_repo_impl_test.rs"]
mod tests;
