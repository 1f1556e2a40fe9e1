// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::DbErr;
use thiserror::Error;

/// 仓库接口模块
///
/// 仓库接口定义了数据持久化的抽象契约，具体实现由基础设施层提供。
///
/// - 作业仓库（job_repository）：作业记录
/// - 结果仓库（result_repository）：结果记录
/// - 定时作业仓库（scheduled_job_repository）：定时作业定义与执行时间
pub mod job_repository;
pub mod result_repository;
pub mod scheduled_job_repository;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
    /// 存储的数据无法还原为领域模型
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}
