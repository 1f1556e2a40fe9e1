// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use migration::{Migrator, MigratorTrait};
use scrapeflow::config::settings::DatabaseSettings;
use scrapeflow::domain::services::dispatch_service::DispatchService;
use scrapeflow::infrastructure::database::connection;
use scrapeflow::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use scrapeflow::infrastructure::repositories::result_repo_impl::ResultRepositoryImpl;
use scrapeflow::infrastructure::repositories::scheduled_job_repo_impl::ScheduledJobRepositoryImpl;
use scrapeflow::provider::client::ProviderAuth;
use scrapeflow::provider::HttpScrapeProvider;
use scrapeflow::proxy::ProxyPool;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

pub const API_TOKEN: &str = "integration-token";

#[allow(dead_code)]
pub struct TestApp {
    pub server: MockServer,
    pub db: Arc<DatabaseConnection>,
    pub jobs: Arc<JobRepositoryImpl>,
    pub results: Arc<ResultRepositoryImpl>,
    pub scheduled_jobs: Arc<ScheduledJobRepositoryImpl>,
    pub dispatcher: Arc<DispatchService>,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_pool(None).await
}

/// 使用内存 SQLite、真实仓库实现和 wiremock 模拟的服务商构建测试环境
pub async fn spawn_app_with_pool(pool: Option<Arc<ProxyPool>>) -> TestApp {
    let server = MockServer::start().await;

    let settings = DatabaseSettings {
        url: "sqlite::memory:".to_string(),
        max_connections: Some(5),
        min_connections: None,
        connect_timeout: Some(5),
        idle_timeout: None,
    };
    let db = Arc::new(connection::create_pool(&settings).await.unwrap());
    Migrator::up(db.as_ref(), None).await.unwrap();

    let jobs = Arc::new(JobRepositoryImpl::new(db.clone()));
    let results = Arc::new(ResultRepositoryImpl::new(db.clone()));
    let scheduled_jobs = Arc::new(ScheduledJobRepositoryImpl::new(db.clone()));

    let provider = HttpScrapeProvider::new(
        &server.uri(),
        ProviderAuth::Bearer(API_TOKEN.to_string()),
        Duration::from_secs(5),
    )
    .unwrap();

    let mut dispatcher = DispatchService::new(
        Arc::new(provider),
        jobs.clone(),
        results.clone(),
        Duration::from_millis(20),
    );
    if let Some(pool) = pool {
        dispatcher = dispatcher.with_proxy_pool(pool);
    }

    TestApp {
        server,
        db,
        jobs,
        results,
        scheduled_jobs,
        dispatcher: Arc::new(dispatcher),
    }
}
