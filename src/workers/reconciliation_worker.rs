// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::JobStatus;
use crate::domain::repositories::job_repository::JobRepository;
use crate::domain::repositories::RepositoryError;
use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const ORPHANED_REASON: &str = "job completed without a stored result";

/// 孤儿作业对账工作器
///
/// 定期扫描"已完成但没有结果记录"的作业并将其标记为 `orphaned`。
/// 结果写入失败时作业已被标记完成，这里负责收尾。
pub struct ReconciliationWorker {
    repository: Arc<dyn JobRepository>,
    interval: Duration,
    grace_period: chrono::Duration,
}

impl ReconciliationWorker {
    /// 创建新的对账工作器
    ///
    /// # 参数
    ///
    /// * `repository` - 作业仓库
    /// * `interval` - 扫描间隔
    /// * `grace_period` - 最近更新时间在此范围内的作业不参与对账
    pub fn new(
        repository: Arc<dyn JobRepository>,
        interval: Duration,
        grace_period: chrono::Duration,
    ) -> Self {
        Self {
            repository,
            interval,
            grace_period,
        }
    }

    /// 运行工作器
    pub async fn run(&self) {
        info!(
            interval_secs = self.interval.as_secs(),
            grace_secs = self.grace_period.num_seconds(),
            "Reconciliation worker started"
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            interval.tick().await;

            match self.sweep(Utc::now()).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Marked {} jobs as orphaned", count);
                    }
                }
                Err(e) => {
                    error!("Reconciliation sweep failed: {}", e);
                }
            }
        }
    }

    /// 启动后台运行
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// 执行一次对账
    ///
    /// # 返回值
    ///
    /// * `Ok(u64)` - 被标记为孤儿的作业数量
    /// * `Err(RepositoryError)` - 查询失败
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let cutoff = now - self.grace_period;
        let orphaned = self.repository.find_orphaned(cutoff).await?;

        let mut marked = 0;
        for job in orphaned {
            match self
                .repository
                .update_status(job.id, JobStatus::Orphaned, Some(ORPHANED_REASON.to_string()))
                .await
            {
                Ok(()) => {
                    warn!(job_id = %job.id, platform = %job.platform, "Job has no stored result, marked orphaned");
                    marked += 1;
                }
                // Keep sweeping; the job is picked up again next round
                Err(e) => error!(job_id = %job.id, "Failed to mark job orphaned: {}", e),
            }
        }

        if marked > 0 {
            counter!("reconciliation_orphaned_total").increment(marked);
        }
        Ok(marked)
    }
}

#[cfg(test)]
#[path = "reconciliation_worker_test.rs"]
mod tests;
