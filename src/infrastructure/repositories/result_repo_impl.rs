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

use crate::domain::models::job::ResultRecord;
use crate::domain::repositories::result_repository::ResultRepository;
use crate::domain::repositories::RepositoryError;
use crate::infrastructure::database::entities::result as result_entity;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::*;
use std::sync::Arc;
use uuid::Uuid;

/// 结果仓库实现
pub struct ResultRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl ResultRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ResultRepository for ResultRepositoryImpl {
    async fn save(&self, result: &ResultRecord) -> Result<(), RepositoryError> {
        let active_model = result_entity::ActiveModel {
            id: Set(result.id),
            job_id: Set(result.job_id),
            platform: Set(result.platform.clone()),
            content_type: Set(result.content_type.clone()),
            url: Set(result.url.clone()),
            raw_data: Set(result.raw_data.clone()),
            processed_data: Set(result.processed_data.clone()),
            sentiment: Set(result.sentiment.clone()),
            created_at: Set(result.created_at.into()),
        };

        result_entity::Entity::insert(active_model)
            .exec(self.db.as_ref())
            .await?;

        Ok(())
    }

    async fn find_by_job_id(&self, job_id: Uuid) -> Result<Vec<ResultRecord>, RepositoryError> {
        let models = result_entity::Entity::find()
            .filter(result_entity::Column::JobId.eq(job_id))
            .order_by_asc(result_entity::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;

        Ok(models
            .into_iter()
            .map(|m| ResultRecord {
                id: m.id,
                job_id: m.job_id,
                platform: m.platform,
                content_type: m.content_type,
                url: m.url,
                raw_data: m.raw_data,
                processed_data: m.processed_data,
                sentiment: m.sentiment,
                created_at: m.created_at.with_timezone(&Utc),
            })
            .collect())
    }
}
