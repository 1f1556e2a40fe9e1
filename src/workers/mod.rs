// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 后台周期任务：定时作业调度与孤儿作业对账
pub mod manager;
pub mod reconciliation_worker;
pub mod scheduler_worker;

pub use manager::WorkerManager;
