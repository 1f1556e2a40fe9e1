// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::queue::scheduler::{RecurrenceScheduler, RunStatus};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// 定时作业工作器
///
/// 按固定间隔驱动 [`RecurrenceScheduler::tick`]
pub struct SchedulerWorker {
    scheduler: Arc<RecurrenceScheduler>,
    interval: Duration,
}

impl SchedulerWorker {
    pub fn new(scheduler: Arc<RecurrenceScheduler>, interval: Duration) -> Self {
        Self {
            scheduler,
            interval,
        }
    }

    /// 运行工作器
    pub async fn run(&self) {
        info!(interval_secs = self.interval.as_secs(), "Scheduler worker started");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            self.run_once().await;
        }
    }

    /// 启动后台运行
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run_once(&self) -> usize {
        match self.scheduler.tick(Utc::now()).await {
            Ok(outcomes) => {
                let failed = outcomes
                    .iter()
                    .filter(|o| o.status == RunStatus::Error)
                    .count();
                if !outcomes.is_empty() {
                    info!(
                        total = outcomes.len(),
                        failed, "Scheduler tick finished"
                    );
                }
                outcomes.len()
            }
            Err(e) => {
                error!("Scheduler tick failed: {}", e);
                0
            }
        }
    }
}
