// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 抓取服务商模块
///
/// 外部抓取服务商的接口抽象与基于 reqwest 的 HTTP 实现
pub mod client;
pub mod traits;

pub use client::HttpScrapeProvider;
pub use traits::{
    BatchItem, BatchStatus, ProviderError, ProviderRequest, RemoteState, ScrapeProvider, Target,
    TaskStatus,
};
