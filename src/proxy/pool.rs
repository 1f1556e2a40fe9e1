// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::settings::ProxyPoolSettings;
use crate::proxy::endpoint::{EndpointParseError, ProxyEndpoint};
use crate::proxy::strategy::{SelectionStrategy, Selector};

/// 代理池错误类型
#[derive(Error, Debug)]
pub enum ProxyPoolError {
    /// 没有可用的代理配置
    #[error("Proxy pool is empty: no endpoints were supplied or configured")]
    EmptyPool,
    /// 代理地址无效
    #[error("Invalid proxy endpoint at {location}: {source}")]
    InvalidEndpoint {
        location: String,
        #[source]
        source: EndpointParseError,
    },
    /// 代理列表文件读取失败
    #[error("Failed to read proxy source {path}: {source}")]
    SourceRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 代理池配置
#[derive(Debug, Clone)]
pub struct ProxyPoolConfig {
    /// 选择策略
    pub strategy: SelectionStrategy,
    /// 黑名单时长
    pub blacklist_duration: Duration,
    /// 智能策略选择最高分代理的概率
    pub exploit_probability: f64,
    /// 内联代理列表
    pub endpoints: Vec<String>,
    /// 代理列表文件
    pub source_file: Option<PathBuf>,
    /// 统计信息中的最佳代理数量
    pub top_n: usize,
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::Random,
            blacklist_duration: Duration::minutes(10),
            exploit_probability: 0.8,
            endpoints: Vec::new(),
            source_file: None,
            top_n: 5,
        }
    }
}

impl From<&ProxyPoolSettings> for ProxyPoolConfig {
    fn from(settings: &ProxyPoolSettings) -> Self {
        Self {
            strategy: settings.strategy,
            blacklist_duration: Duration::seconds(settings.blacklist_duration_secs as i64),
            exploit_probability: settings.exploit_probability,
            endpoints: settings.endpoints.clone(),
            source_file: settings.source_file.as_ref().map(PathBuf::from),
            top_n: settings.top_n,
        }
    }
}

/// 单个代理的统计信息
///
/// `successes + failures` 只增不减，直到代理被移出池子。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyStats {
    pub successes: u64,
    pub failures: u64,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ProxyStats {
    pub fn total_requests(&self) -> u64 {
        self.successes + self.failures
    }

    /// 成功率，没有请求记录时为 0
    pub fn success_rate(&self) -> f64 {
        match self.total_requests() {
            0 => 0.0,
            total => self.successes as f64 / total as f64,
        }
    }
}

/// 黑名单条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlacklistEntry {
    pub blacklisted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// 单个代理的统计报告（代理地址已脱敏）
#[derive(Debug, Clone, Serialize)]
pub struct EndpointReport {
    pub endpoint: String,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub blacklisted_until: Option<DateTime<Utc>>,
}

/// 代理池统计摘要
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub strategy: SelectionStrategy,
    pub total_endpoints: usize,
    pub available_endpoints: usize,
    pub blacklisted_endpoints: usize,
    pub total_successes: u64,
    pub total_failures: u64,
    pub endpoints: Vec<EndpointReport>,
    pub top_performers: Vec<EndpointReport>,
}

struct PoolState {
    initialized: bool,
    /// 按加入顺序排列
    endpoints: Vec<ProxyEndpoint>,
    stats: HashMap<ProxyEndpoint, ProxyStats>,
    blacklist: HashMap<ProxyEndpoint, BlacklistEntry>,
    selector: Selector,
}

impl PoolState {
    fn add(&mut self, endpoints: Vec<ProxyEndpoint>) -> usize {
        let mut added = 0;
        for endpoint in endpoints {
            if self.stats.contains_key(&endpoint) {
                continue;
            }
            self.stats.insert(endpoint.clone(), ProxyStats::default());
            self.endpoints.push(endpoint);
            added += 1;
        }
        added
    }

    fn evict_expired(&mut self, now: DateTime<Utc>) {
        let before = self.blacklist.len();
        self.blacklist.retain(|_, entry| now < entry.expires_at);
        let evicted = before - self.blacklist.len();
        if evicted > 0 {
            debug!(evicted, "Evicted expired blacklist entries");
        }
    }

    /// 移除最早被拉黑的代理；并列时按加入顺序取第一个
    fn release_longest_blacklisted(&mut self) -> Option<ProxyEndpoint> {
        let mut oldest: Option<(&ProxyEndpoint, DateTime<Utc>)> = None;
        for endpoint in &self.endpoints {
            if let Some(entry) = self.blacklist.get(endpoint) {
                match oldest {
                    Some((_, at)) if at <= entry.blacklisted_at => {}
                    _ => oldest = Some((endpoint, entry.blacklisted_at)),
                }
            }
        }

        let endpoint = oldest.map(|(endpoint, _)| endpoint.clone())?;
        self.blacklist.remove(&endpoint);
        Some(endpoint)
    }

    fn blacklisted_count(&self, now: DateTime<Utc>) -> usize {
        self.blacklist
            .values()
            .filter(|entry| now < entry.expires_at)
            .count()
    }
}

/// 代理池管理器
///
/// 池内所有状态（代理列表、统计、黑名单、轮询索引）都由同一把锁保护，
/// 选择与上报在并发调用下保持串行，统计计数不会丢失更新。
pub struct ProxyPool {
    state: Mutex<PoolState>,
    config: ProxyPoolConfig,
}

impl ProxyPool {
    /// 创建新的代理池
    ///
    /// # 参数
    ///
    /// * `config` - 代理池配置
    ///
    /// # 返回值
    ///
    /// 返回未初始化的代理池，需调用 [`ProxyPool::initialize`] 填充代理
    pub fn new(config: ProxyPoolConfig) -> Self {
        let selector = Selector::new(config.strategy, config.exploit_probability);
        Self {
            state: Mutex::new(PoolState {
                initialized: false,
                endpoints: Vec::new(),
                stats: HashMap::new(),
                blacklist: HashMap::new(),
                selector,
            }),
            config,
        }
    }

    pub fn config(&self) -> &ProxyPoolConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn len(&self) -> usize {
        self.state.lock().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 初始化代理池
    ///
    /// 幂等：首次成功初始化之后的调用不会修改池子。
    ///
    /// # 参数
    ///
    /// * `endpoints` - 显式代理列表；为 `None` 时从配置源加载
    ///
    /// # 返回值
    ///
    /// * `Ok(usize)` - 池中代理数量
    /// * `Err(ProxyPoolError)` - 代理列表为空或配置源无效
    pub fn initialize(&self, endpoints: Option<Vec<ProxyEndpoint>>) -> Result<usize, ProxyPoolError> {
        {
            let state = self.state.lock();
            if state.initialized {
                debug!("Proxy pool already initialized, ignoring");
                return Ok(state.endpoints.len());
            }
        }

        let endpoints = match endpoints {
            Some(list) => list,
            None => self.load_configured_endpoints()?,
        };
        if endpoints.is_empty() {
            return Err(ProxyPoolError::EmptyPool);
        }

        let mut state = self.state.lock();
        // Another caller may have won the race while the source was loading
        if state.initialized {
            return Ok(state.endpoints.len());
        }
        state.add(endpoints);
        state.initialized = true;

        info!(
            endpoints = state.endpoints.len(),
            strategy = %self.config.strategy,
            "Proxy pool initialized"
        );
        gauge!("proxy_pool_endpoints").set(state.endpoints.len() as f64);
        Ok(state.endpoints.len())
    }

    /// 添加代理，已存在的代理会被忽略
    ///
    /// # 返回值
    ///
    /// 实际新增的代理数量
    pub fn add_endpoints(&self, endpoints: Vec<ProxyEndpoint>) -> usize {
        let mut state = self.state.lock();
        let added = state.add(endpoints);
        if added > 0 {
            info!(added, total = state.endpoints.len(), "Added proxy endpoints");
        }
        gauge!("proxy_pool_endpoints").set(state.endpoints.len() as f64);
        added
    }

    /// 移除代理及其统计和黑名单条目
    ///
    /// # 返回值
    ///
    /// 实际移除的代理数量
    pub fn remove_endpoints(&self, endpoints: &[ProxyEndpoint]) -> usize {
        let mut state = self.state.lock();
        let before = state.endpoints.len();

        state.endpoints.retain(|e| !endpoints.contains(e));
        for endpoint in endpoints {
            state.stats.remove(endpoint);
            state.blacklist.remove(endpoint);
        }

        let removed = before - state.endpoints.len();
        if removed > 0 {
            info!(removed, total = state.endpoints.len(), "Removed proxy endpoints");
        }
        gauge!("proxy_pool_endpoints").set(state.endpoints.len() as f64);
        gauge!("proxy_pool_blacklisted").set(state.blacklist.len() as f64);
        removed
    }

    /// 选择一个代理
    pub fn select_endpoint(&self) -> Option<ProxyEndpoint> {
        self.select_endpoint_at(Utc::now())
    }

    /// 在指定时间点选择一个代理
    ///
    /// 所有代理都被拉黑时，释放拉黑时间最早的一个并返回 `None`，
    /// 下一次调用即可成功。
    pub fn select_endpoint_at(&self, now: DateTime<Utc>) -> Option<ProxyEndpoint> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.evict_expired(now);

        let candidates: Vec<&ProxyEndpoint> = state
            .endpoints
            .iter()
            .filter(|e| !state.blacklist.contains_key(*e))
            .collect();

        if candidates.is_empty() {
            counter!("proxy_pool_exhausted_total").increment(1);
            match state.release_longest_blacklisted() {
                Some(released) => warn!(
                    endpoint = %released,
                    "Proxy pool exhausted, released longest-blacklisted endpoint"
                ),
                None => warn!("Proxy pool has no endpoints"),
            }
            gauge!("proxy_pool_blacklisted").set(state.blacklist.len() as f64);
            return None;
        }

        let index = state.selector.pick(&candidates, &state.stats, now)?;
        let selected = candidates[index].clone();

        if let Some(stats) = state.stats.get_mut(&selected) {
            stats.last_used_at = Some(now);
        }

        counter!("proxy_pool_selections_total", "strategy" => self.config.strategy.to_string())
            .increment(1);
        debug!(endpoint = %selected, "Selected proxy endpoint");
        Some(selected)
    }

    /// 上报成功
    pub fn report_success(&self, endpoint: &ProxyEndpoint) {
        let mut state = self.state.lock();
        match state.stats.get_mut(endpoint) {
            Some(stats) => {
                stats.successes += 1;
                counter!("proxy_pool_reports_total", "outcome" => "success").increment(1);
            }
            None => warn!(endpoint = %endpoint, "Success reported for unknown proxy endpoint"),
        }
    }

    /// 上报失败
    pub fn report_failure(&self, endpoint: &ProxyEndpoint, blacklist: bool) {
        self.report_failure_at(endpoint, blacklist, Utc::now())
    }

    /// 在指定时间点上报失败
    ///
    /// # 参数
    ///
    /// * `endpoint` - 代理
    /// * `blacklist` - 是否同时拉黑，黑名单有效期为配置的 `blacklist_duration`
    /// * `now` - 当前时间
    pub fn report_failure_at(&self, endpoint: &ProxyEndpoint, blacklist: bool, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        let Some(stats) = state.stats.get_mut(endpoint) else {
            warn!(endpoint = %endpoint, "Failure reported for unknown proxy endpoint");
            return;
        };
        stats.failures += 1;
        counter!("proxy_pool_reports_total", "outcome" => "failure").increment(1);

        if blacklist {
            let expires_at = now + self.config.blacklist_duration;
            state.blacklist.insert(
                endpoint.clone(),
                BlacklistEntry {
                    blacklisted_at: now,
                    expires_at,
                },
            );
            info!(endpoint = %endpoint, %expires_at, "Blacklisted proxy endpoint");
            gauge!("proxy_pool_blacklisted").set(state.blacklist.len() as f64);
        }
    }

    /// 获取统计摘要
    pub fn stats(&self) -> PoolStats {
        self.stats_at(Utc::now())
    }

    /// 在指定时间点获取统计摘要
    pub fn stats_at(&self, now: DateTime<Utc>) -> PoolStats {
        let state = self.state.lock();

        let endpoints: Vec<EndpointReport> = state
            .endpoints
            .iter()
            .map(|endpoint| {
                let stats = state.stats.get(endpoint).copied().unwrap_or_default();
                EndpointReport {
                    endpoint: endpoint.masked(),
                    successes: stats.successes,
                    failures: stats.failures,
                    success_rate: stats.success_rate(),
                    last_used_at: stats.last_used_at,
                    blacklisted_until: state
                        .blacklist
                        .get(endpoint)
                        .filter(|entry| now < entry.expires_at)
                        .map(|entry| entry.expires_at),
                }
            })
            .collect();

        let mut top_performers = endpoints.clone();
        top_performers.sort_by(|a, b| {
            b.success_rate
                .partial_cmp(&a.success_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        top_performers.truncate(self.config.top_n);

        let blacklisted_endpoints = state.blacklisted_count(now);

        PoolStats {
            strategy: state.selector.strategy(),
            total_endpoints: state.endpoints.len(),
            available_endpoints: state.endpoints.len() - blacklisted_endpoints,
            blacklisted_endpoints,
            total_successes: endpoints.iter().map(|e| e.successes).sum(),
            total_failures: endpoints.iter().map(|e| e.failures).sum(),
            endpoints,
            top_performers,
        }
    }

    /// 从内联列表和代理文件加载代理
    fn load_configured_endpoints(&self) -> Result<Vec<ProxyEndpoint>, ProxyPoolError> {
        let mut endpoints = Vec::new();

        for (i, raw) in self.config.endpoints.iter().enumerate() {
            let endpoint = raw
                .parse::<ProxyEndpoint>()
                .map_err(|source| ProxyPoolError::InvalidEndpoint {
                    location: format!("proxy_pool.endpoints[{}]", i),
                    source,
                })?;
            endpoints.push(endpoint);
        }

        if let Some(path) = &self.config.source_file {
            let content =
                std::fs::read_to_string(path).map_err(|source| ProxyPoolError::SourceRead {
                    path: path.display().to_string(),
                    source,
                })?;

            for (line_no, line) in content.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let endpoint =
                    line.parse::<ProxyEndpoint>()
                        .map_err(|source| ProxyPoolError::InvalidEndpoint {
                            location: format!("{}:{}", path.display(), line_no + 1),
                            source,
                        })?;
                endpoints.push(endpoint);
            }
        }

        Ok(endpoints)
    }
}

#[cfg(test)]
#[path = "pool_test.rs"]
mod tests;
