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

use crate::domain::models::scheduled_job::{Frequency, Recurrence, ScheduledJob, TimeOfDay};
use crate::domain::models::scrape_task::DomainError;
use crate::domain::repositories::scheduled_job_repository::ScheduledJobRepository;
use crate::domain::repositories::RepositoryError;
use crate::infrastructure::database::entities::scheduled_job as scheduled_job_entity;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use std::sync::Arc;
use uuid::Uuid;

/// 定时作业仓库实现
pub struct ScheduledJobRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl ScheduledJobRepositoryImpl {
    /// 创建新的定时作业仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn small(value: Option<i16>) -> Result<Option<u8>, RepositoryError> {
    value
        .map(|v| u8::try_from(v).map_err(|_| RepositoryError::Corrupt(format!("value {}", v))))
        .transpose()
}

impl TryFrom<scheduled_job_entity::Model> for ScheduledJob {
    type Error = RepositoryError;

    fn try_from(model: scheduled_job_entity::Model) -> Result<Self, Self::Error> {
        let id = model.id;
        let corrupt =
            |e: DomainError| RepositoryError::Corrupt(format!("scheduled job {}: {}", id, e));

        let frequency = model.frequency.parse::<Frequency>().map_err(corrupt)?;
        let recurrence = Recurrence::from_parts(
            frequency,
            small(model.day_of_week)?,
            small(model.day_of_month)?,
        )
        .map_err(corrupt)?;
        let hour = small(Some(model.hour))?.unwrap_or_default();
        let minute = small(Some(model.minute))?.unwrap_or_default();
        let time_of_day = TimeOfDay::new(hour, minute).map_err(corrupt)?;

        Ok(Self {
            id: model.id,
            platform: model.platform,
            target_url: model.target_url,
            content_type: model.content_type,
            recurrence,
            time_of_day,
            active: model.active,
            last_run_at: model.last_run_at.map(|t| t.with_timezone(&Utc)),
            next_run_at: model.next_run_at.with_timezone(&Utc),
            last_error: model.last_error,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        })
    }
}

impl From<ScheduledJob> for scheduled_job_entity::ActiveModel {
    fn from(job: ScheduledJob) -> Self {
        Self {
            id: Set(job.id),
            platform: Set(job.platform),
            target_url: Set(job.target_url),
            content_type: Set(job.content_type),
            frequency: Set(job.recurrence.frequency().to_string()),
            day_of_week: Set(job.recurrence.day_of_week().map(i16::from)),
            day_of_month: Set(job.recurrence.day_of_month().map(i16::from)),
            hour: Set(i16::from(job.time_of_day.hour())),
            minute: Set(i16::from(job.time_of_day.minute())),
            active: Set(job.active),
            last_run_at: Set(job.last_run_at.map(Into::into)),
            next_run_at: Set(job.next_run_at.into()),
            last_error: Set(job.last_error),
            created_at: Set(job.created_at.into()),
            updated_at: Set(job.updated_at.into()),
        }
    }
}

#[async_trait]
impl ScheduledJobRepository for ScheduledJobRepositoryImpl {
    async fn create(&self, job: &ScheduledJob) -> Result<ScheduledJob, RepositoryError> {
        let model: scheduled_job_entity::ActiveModel = job.clone().into();

        model.insert(self.db.as_ref()).await?;
        Ok(job.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScheduledJob>, RepositoryError> {
        scheduled_job_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .map(ScheduledJob::try_from)
            .transpose()
    }

    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>, RepositoryError> {
        let now: DateTime<FixedOffset> = now.into();
        let models = scheduled_job_entity::Entity::find()
            .filter(scheduled_job_entity::Column::Active.eq(true))
            .filter(scheduled_job_entity::Column::NextRunAt.lte(now))
            .order_by_asc(scheduled_job_entity::Column::NextRunAt)
            .order_by_asc(scheduled_job_entity::Column::Id)
            .all(self.db.as_ref())
            .await?;

        models.into_iter().map(ScheduledJob::try_from).collect()
    }

    async fn record_run(
        &self,
        id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
        last_error: Option<String>,
    ) -> Result<(), RepositoryError> {
        let last_run_at: DateTime<FixedOffset> = last_run_at.into();
        let next_run_at: DateTime<FixedOffset> = next_run_at.into();
        let result = scheduled_job_entity::Entity::update_many()
            .col_expr(
                scheduled_job_entity::Column::LastRunAt,
                Expr::value(Some(last_run_at)),
            )
            .col_expr(
                scheduled_job_entity::Column::NextRunAt,
                Expr::value(next_run_at),
            )
            .col_expr(scheduled_job_entity::Column::LastError, Expr::value(last_error))
            .col_expr(
                scheduled_job_entity::Column::UpdatedAt,
                Expr::value(last_run_at),
            )
            .filter(scheduled_job_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn set_active(
        &self,
        id: Uuid,
        active: bool,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let next_run_at: DateTime<FixedOffset> = next_run_at.into();
        let now: DateTime<FixedOffset> = Utc::now().into();
        let result = scheduled_job_entity::Entity::update_many()
            .col_expr(scheduled_job_entity::Column::Active, Expr::value(active))
            .col_expr(
                scheduled_job_entity::Column::NextRunAt,
                Expr::value(next_run_at),
            )
            .col_expr(scheduled_job_entity::Column::UpdatedAt, Expr::value(now))
            .filter(scheduled_job_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "scheduled_job_repo_impl_test.rs"]
mod tests;
