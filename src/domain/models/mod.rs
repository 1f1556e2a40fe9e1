// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// - 作业与结果记录（job）：持久化的执行记录
/// - 定时作业（scheduled_job）：重复规则与下一次执行时间计算
/// - 抓取任务（scrape_task）：发往服务商的单次请求
pub mod job;
pub mod scheduled_job;
pub mod scrape_task;
