// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::{ReconciliationSettings, SchedulerSettings};
use crate::domain::repositories::job_repository::JobRepository;
use crate::queue::scheduler::RecurrenceScheduler;
use crate::workers::reconciliation_worker::ReconciliationWorker;
use crate::workers::scheduler_worker::SchedulerWorker;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// 工作管理器
///
/// 持有所有后台工作器的句柄，收到关闭信号后统一终止
#[derive(Default)]
pub struct WorkerManager {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl WorkerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 启动定时作业工作器
    pub fn start_scheduler(
        &mut self,
        scheduler: Arc<RecurrenceScheduler>,
        settings: &SchedulerSettings,
    ) {
        let worker = SchedulerWorker::new(
            scheduler,
            Duration::from_secs(settings.tick_interval_secs.max(1)),
        );
        self.handles.push(("scheduler", worker.start()));
    }

    /// 启动孤儿作业对账工作器
    pub fn start_reconciliation(
        &mut self,
        repository: Arc<dyn JobRepository>,
        settings: &ReconciliationSettings,
    ) {
        let worker = ReconciliationWorker::new(
            repository,
            Duration::from_secs(settings.interval_secs.max(1)),
            chrono::Duration::seconds(settings.grace_period_secs as i64),
        );
        self.handles.push(("reconciliation", worker.start()));
    }

    /// 已启动的工作器数量
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// 终止所有工作器
    pub fn shutdown(&mut self) {
        info!("Shutting down workers...");
        for (name, handle) in self.handles.drain(..) {
            handle.abort();
            info!(worker = name, "Worker stopped");
        }
        info!("Workers shut down successfully");
    }

    /// 等待关闭信号并关闭工作进程
    pub async fn wait_for_shutdown(&mut self) {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }

        self.shutdown();
    }
}
