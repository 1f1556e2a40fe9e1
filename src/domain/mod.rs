// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// - 领域模型（models）：作业、定时作业和抓取任务
/// - 仓库接口（repositories）：数据持久化抽象接口
/// - 服务（services）：任务分发
///
/// 领域层不依赖于任何具体的存储实现。
pub mod models;
pub mod repositories;
pub mod services;
