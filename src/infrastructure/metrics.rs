// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::MetricsSettings;
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

/// 初始化指标系统
///
/// 安装 Prometheus 导出器并注册各类指标说明。未启用时直接返回，
/// 指标宏在没有记录器的情况下不产生任何开销。
///
/// # 参数
///
/// * `settings` - 指标配置
///
/// # 返回值
///
/// * `Ok(())` - 初始化成功或未启用
/// * `Err(anyhow::Error)` - 监听地址无效
pub fn init_metrics(settings: &MetricsSettings) -> anyhow::Result<()> {
    if !settings.enabled {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr: SocketAddr = settings.listen_addr.parse()?;

    // Port conflicts are common in development; keep running without metrics
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!(
            "Failed to install Prometheus recorder: {}. This might happen if the port is already in use.",
            e
        );
        return Ok(());
    }

    describe_metrics();
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

fn describe_metrics() {
    describe_gauge!("proxy_pool_endpoints", "Number of endpoints in the proxy pool");
    describe_gauge!(
        "proxy_pool_blacklisted",
        "Number of proxy endpoints currently blacklisted"
    );
    describe_counter!(
        "proxy_pool_exhausted_total",
        "Selections that found every endpoint blacklisted"
    );
    describe_counter!(
        "proxy_pool_selections_total",
        "Endpoint selections by strategy"
    );
    describe_counter!(
        "proxy_pool_reports_total",
        "Endpoint outcome reports by outcome"
    );
    describe_counter!("dispatch_requests_total", "Dispatch calls by mode and outcome");
    describe_counter!(
        "dispatch_partial_writes_total",
        "Job records written without their result record"
    );
    describe_counter!("scheduler_runs_total", "Scheduled job runs by outcome");
    describe_counter!(
        "reconciliation_orphaned_total",
        "Job records marked orphaned by the reconciliation sweep"
    );
}
