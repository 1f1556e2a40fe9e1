// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// - 任务分发服务（dispatch_service）：调用外部服务商，关联任务ID并持久化结果
pub mod dispatch_service;

#[cfg(test)]
pub(crate) mod test_support;
