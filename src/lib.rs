// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含核心业务实体、服务和仓库接口
pub mod domain;

/// 基础设施模块
///
/// 提供数据库、仓库实现与指标导出
pub mod infrastructure;

/// 服务商模块
///
/// 远程抓取服务商的 HTTP 客户端与接口定义
pub mod provider;

/// 代理池模块
///
/// 出口代理的选择、健康统计和黑名单
pub mod proxy;

/// 队列模块
///
/// 重复作业调度
pub mod queue;

/// 工具模块
pub mod utils;

/// 工作器模块
///
/// 实现后台任务处理和工作器管理
pub mod workers;
