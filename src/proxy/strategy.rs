// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::proxy::endpoint::ProxyEndpoint;
use crate::proxy::pool::ProxyStats;

/// 最近使用惩罚的恢复窗口
const RECENCY_WINDOW_SECS: i64 = 5 * 60;
/// 最近使用加分权重
const RECENCY_WEIGHT: f64 = 0.5;
/// 没有请求记录时的默认成功率
const UNTRIED_SUCCESS_RATE: f64 = 0.5;

/// 代理选择策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// 随机
    #[default]
    Random,
    /// 轮询
    RoundRobin,
    /// 智能评分 (利用/探索)
    #[serde(alias = "adaptive")]
    Smart,
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SelectionStrategy::Random => write!(f, "random"),
            SelectionStrategy::RoundRobin => write!(f, "round_robin"),
            SelectionStrategy::Smart => write!(f, "smart"),
        }
    }
}

/// 选择器
///
/// 持有策略本地状态（轮询索引）。轮询索引与具体代理无关，
/// 候选集合在两次调用之间变化时可能跳过或重复某个代理。
#[derive(Debug, Clone)]
pub struct Selector {
    strategy: SelectionStrategy,
    exploit_probability: f64,
    round_robin_index: usize,
}

impl Selector {
    pub fn new(strategy: SelectionStrategy, exploit_probability: f64) -> Self {
        Self {
            strategy,
            exploit_probability,
            round_robin_index: 0,
        }
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    /// 从候选列表中选择一个代理
    ///
    /// # 参数
    ///
    /// * `candidates` - 当前可用（未被拉黑）的代理，按加入顺序排列
    /// * `stats` - 代理统计信息
    /// * `now` - 当前时间
    ///
    /// # 返回值
    ///
    /// 被选中代理在 `candidates` 中的下标；候选为空时返回 `None`
    pub fn pick(
        &mut self,
        candidates: &[&ProxyEndpoint],
        stats: &HashMap<ProxyEndpoint, ProxyStats>,
        now: DateTime<Utc>,
    ) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }

        match self.strategy {
            SelectionStrategy::Random => Some(rand::random_range(0..candidates.len())),
            SelectionStrategy::RoundRobin => {
                let index = self.round_robin_index % candidates.len();
                self.round_robin_index = self.round_robin_index.wrapping_add(1);
                Some(index)
            }
            SelectionStrategy::Smart => Some(self.pick_smart(candidates, stats, now)),
        }
    }

    fn pick_smart(
        &self,
        candidates: &[&ProxyEndpoint],
        stats: &HashMap<ProxyEndpoint, ProxyStats>,
        now: DateTime<Utc>,
    ) -> usize {
        let default_stats = ProxyStats::default();
        let mut ranked: Vec<(usize, f64)> = candidates
            .iter()
            .enumerate()
            .map(|(i, endpoint)| {
                let stat = stats.get(*endpoint).unwrap_or(&default_stats);
                (i, smart_score(stat, now))
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        if ranked.len() == 1 || rand::random::<f64>() < self.exploit_probability {
            return ranked[0].0;
        }

        let explore = rand::random_range(1..ranked.len());
        ranked[explore].0
    }
}

/// 智能策略评分
///
/// `successRate + 0.5 * min(1, sinceLastUse / 5min)`；没有请求记录的代理
/// 成功率按 0.5 计算，从未被选中的代理视为已完全冷却。
pub fn smart_score(stats: &ProxyStats, now: DateTime<Utc>) -> f64 {
    let success_rate = if stats.total_requests() == 0 {
        UNTRIED_SUCCESS_RATE
    } else {
        stats.success_rate()
    };

    let rested = match stats.last_used_at {
        Some(last_used) => {
            let idle = (now - last_used).max(Duration::zero());
            (idle.num_milliseconds() as f64 / (RECENCY_WINDOW_SECS * 1000) as f64).min(1.0)
        }
        None => 1.0,
    };

    success_rate + RECENCY_WEIGHT * rested
}
