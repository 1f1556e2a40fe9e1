// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 代理池模块
///
/// 管理出口代理集合：选择策略、健康统计和临时黑名单
pub mod endpoint;
pub mod pool;
pub mod strategy;

pub use endpoint::{ProxyEndpoint, ProxyProtocol};
pub use pool::{PoolStats, ProxyPool, ProxyPoolConfig, ProxyPoolError, ProxyStats};
pub use strategy::SelectionStrategy;
