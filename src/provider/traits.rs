// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::proxy::ProxyEndpoint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// 服务商错误类型
#[derive(Error, Debug)]
pub enum ProviderError {
    /// 请求失败（连接、超时、TLS 等传输层错误）
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// 服务商返回非 2xx 状态码
    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// 响应内容无法解析
    #[error("Malformed provider payload: {0}")]
    MalformedPayload(String),
    /// 配置错误（缺少凭据、地址无效等）
    #[error("Provider configuration error: {0}")]
    Configuration(String),
}

impl ProviderError {
    /// 判断是否为传输层错误
    ///
    /// 传输层错误意味着出口代理本身可能不可用；HTTP 错误说明请求已到达服务商。
    pub fn is_transport(&self) -> bool {
        match self {
            ProviderError::Request(e) => e.status().is_none() && !e.is_decode(),
            _ => false,
        }
    }
}

/// 抓取目标：单个地址或地址列表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    One(String),
    Many(Vec<String>),
}

/// 发往服务商的请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub url: Target,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headless_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// 服务商侧的任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteState {
    Pending,
    Completed,
    Failed,
}

impl RemoteState {
    /// 解析服务商返回的状态字符串
    ///
    /// 未知状态（queued、running 等）一律视为仍在进行中。
    pub fn from_remote(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "completed" | "complete" | "done" | "success" | "succeeded" => RemoteState::Completed,
            "failed" | "failure" | "error" | "cancelled" => RemoteState::Failed,
            _ => RemoteState::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RemoteState::Pending)
    }
}

/// 单任务轮询结果
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatus {
    pub state: RemoteState,
    pub data: Option<Value>,
    pub error: Option<String>,
}

/// 批次中单个目标的结果
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub url: String,
    pub state: RemoteState,
    pub data: Option<Value>,
    pub error: Option<String>,
}

/// 批次轮询结果
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStatus {
    pub state: RemoteState,
    pub results: Vec<BatchItem>,
}

/// 抓取服务商特质
///
/// 对应服务商的五个端点：同步抓取、异步提交、批量提交及两种轮询。
#[async_trait]
pub trait ScrapeProvider: Send + Sync {
    /// 同步抓取，直接返回数据
    ///
    /// # 参数
    ///
    /// * `request` - 请求体
    /// * `egress` - 出口代理，`None` 表示直连
    async fn scrape(
        &self,
        request: &ProviderRequest,
        egress: Option<&ProxyEndpoint>,
    ) -> Result<Value, ProviderError>;

    /// 提交异步任务，返回任务ID
    async fn submit_task(&self, request: &ProviderRequest) -> Result<String, ProviderError>;

    /// 提交批量任务，返回批次ID
    async fn submit_batch(&self, request: &ProviderRequest) -> Result<String, ProviderError>;

    /// 查询任务状态
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, ProviderError>;

    /// 查询批次状态
    async fn batch_status(&self, batch_id: &str) -> Result<BatchStatus, ProviderError>;

    /// 获取服务商名称
    fn name(&self) -> &'static str;
}
