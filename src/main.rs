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

use scrapeflow::config::settings::Settings;
use scrapeflow::domain::repositories::job_repository::JobRepository;
use scrapeflow::domain::services::dispatch_service::DispatchService;
use scrapeflow::infrastructure::database::connection;
use scrapeflow::infrastructure::metrics;
use scrapeflow::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use scrapeflow::infrastructure::repositories::result_repo_impl::ResultRepositoryImpl;
use scrapeflow::infrastructure::repositories::scheduled_job_repo_impl::ScheduledJobRepositoryImpl;
use scrapeflow::provider::HttpScrapeProvider;
use scrapeflow::proxy::{ProxyPool, ProxyPoolConfig};
use scrapeflow::queue::scheduler::RecurrenceScheduler;
use scrapeflow::utils::telemetry;
use scrapeflow::workers::WorkerManager;
use std::sync::Arc;
use tracing::{info, warn};

use migration::{Migrator, MigratorTrait};

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动后台工作器
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting scrapeflow...");

    // 2. Load configuration
    let settings = Settings::new()?;
    info!("Configuration loaded");

    metrics::init_metrics(&settings.metrics)?;

    // 3. Connect to database
    let db = Arc::new(connection::create_pool(&settings.database).await?);

    info!("Running database migrations...");
    Migrator::up(db.as_ref(), None).await?;
    info!("Database migrations applied");

    let job_repository = Arc::new(JobRepositoryImpl::new(db.clone()));
    let result_repository = Arc::new(ResultRepositoryImpl::new(db.clone()));
    let scheduled_job_repository = Arc::new(ScheduledJobRepositoryImpl::new(db.clone()));

    // 4. Provider client
    let provider = Arc::new(HttpScrapeProvider::from_settings(&settings.provider)?);
    info!(base_url = %settings.provider.base_url, "Scrape provider configured");

    // 5. Dispatcher, optionally routed through the proxy pool
    let mut dispatcher = DispatchService::new(
        provider,
        job_repository.clone(),
        result_repository,
        settings.provider.poll_interval(),
    );
    if settings.proxy_pool.enabled {
        let pool = ProxyPool::new(ProxyPoolConfig::from(&settings.proxy_pool));
        let count = pool.initialize(None)?;
        info!(endpoints = count, "Proxy pool ready");
        dispatcher = dispatcher.with_proxy_pool(Arc::new(pool));
    } else {
        warn!("Proxy pool disabled, scheduled scrapes go direct");
    }
    let dispatcher = Arc::new(dispatcher);

    // 6. Scheduler
    let scheduler = Arc::new(RecurrenceScheduler::new(
        scheduled_job_repository,
        dispatcher,
        settings.scheduler.max_concurrency,
    ));

    // 7. Background workers
    let mut manager = WorkerManager::new();
    manager.start_scheduler(scheduler, &settings.scheduler);
    let reconciliation_repository: Arc<dyn JobRepository> = job_repository;
    manager.start_reconciliation(reconciliation_repository, &settings.reconciliation);
    info!(workers = manager.len(), "Background workers started");

    manager.wait_for_shutdown().await;
    Ok(())
}
