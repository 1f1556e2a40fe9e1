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

use crate::config::settings::ProviderSettings;
use crate::provider::traits::{
    BatchItem, BatchStatus, ProviderError, ProviderRequest, RemoteState, ScrapeProvider,
    TaskStatus,
};
use crate::proxy::ProxyEndpoint;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

const USER_AGENT: &str = "scrapeflow/0.1";
const ERROR_BODY_LIMIT: usize = 512;

/// 服务商认证方式
#[derive(Clone)]
pub enum ProviderAuth {
    Bearer(String),
    Basic { username: String, password: String },
}

impl std::fmt::Debug for ProviderAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderAuth::Bearer(_) => f.write_str("Bearer(********)"),
            ProviderAuth::Basic { username, .. } => {
                write!(f, "Basic {{ username: {:?}, password: ******** }}", username)
            }
        }
    }
}

#[derive(Deserialize)]
struct TaskAccepted {
    task_id: String,
}

#[derive(Deserialize)]
struct BatchAccepted {
    batch_id: String,
}

#[derive(Deserialize)]
struct TaskStatusBody {
    status: String,
    data: Option<Value>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct BatchItemBody {
    url: String,
    status: String,
    data: Option<Value>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct BatchStatusBody {
    status: String,
    #[serde(default)]
    results: Vec<BatchItemBody>,
}

/// 基于 reqwest 的服务商客户端
#[derive(Debug, Clone)]
pub struct HttpScrapeProvider {
    base_url: Url,
    auth: ProviderAuth,
    timeout: Duration,
    client: Client,
}

impl HttpScrapeProvider {
    /// 创建客户端
    ///
    /// # 参数
    ///
    /// * `base_url` - 服务商 API 根地址
    /// * `auth` - 认证方式
    /// * `timeout` - 单次请求超时时间
    ///
    /// # 返回值
    ///
    /// * `Ok(HttpScrapeProvider)` - 客户端
    /// * `Err(ProviderError)` - 地址无效或客户端构建失败
    pub fn new(base_url: &str, auth: ProviderAuth, timeout: Duration) -> Result<Self, ProviderError> {
        let mut base_url = Url::parse(base_url).map_err(|e| {
            ProviderError::Configuration(format!("invalid base url '{}': {}", base_url, e))
        })?;
        // Url::join drops the last segment unless the path ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Self::client_builder(timeout).build()?;
        Ok(Self {
            base_url,
            auth,
            timeout,
            client,
        })
    }

    /// 根据配置创建客户端
    ///
    /// 优先使用 `api_token`（Bearer），否则使用 `username`/`password`（Basic）；
    /// 两者都缺失时返回配置错误。
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let auth = match (&settings.api_token, &settings.username, &settings.password) {
            (Some(token), _, _) if !token.is_empty() => ProviderAuth::Bearer(token.clone()),
            (_, Some(username), Some(password)) if !username.is_empty() => ProviderAuth::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            _ => {
                return Err(ProviderError::Configuration(
                    "missing provider credentials: set api_token or username/password".to_string(),
                ))
            }
        };

        Self::new(&settings.base_url, auth, settings.request_timeout())
    }

    fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
        Client::builder().user_agent(USER_AGENT).timeout(timeout)
    }

    fn url(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ProviderError::Configuration(format!("invalid path '{}': {}", path, e)))
    }

    /// 以路径段拼接资源地址，服务商返回的ID按单个段编码
    fn resource_url(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ProviderError::Configuration(format!(
                    "base url '{}' cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            ProviderAuth::Bearer(token) => builder.bearer_auth(token),
            ProviderAuth::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
        }
    }

    async fn post(
        &self,
        client: &Client,
        path: &str,
        request: &ProviderRequest,
    ) -> Result<Value, ProviderError> {
        let url = self.url(path)?;
        let start = Instant::now();
        let response = self
            .authorize(client.post(url))
            .json(request)
            .send()
            .await?;
        debug!(
            path,
            status = response.status().as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Provider responded"
        );
        read_json(response).await
    }

    async fn get(&self, url: Url) -> Result<Value, ProviderError> {
        let response = self.authorize(self.client.get(url)).send().await?;
        read_json(response).await
    }
}

async fn read_json(response: Response) -> Result<Value, ProviderError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body: body.chars().take(ERROR_BODY_LIMIT).collect(),
        });
    }

    serde_json::from_str(&body).map_err(|e| ProviderError::MalformedPayload(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ProviderError> {
    serde_json::from_value(value).map_err(|e| ProviderError::MalformedPayload(e.to_string()))
}

#[async_trait]
impl ScrapeProvider for HttpScrapeProvider {
    async fn scrape(
        &self,
        request: &ProviderRequest,
        egress: Option<&ProxyEndpoint>,
    ) -> Result<Value, ProviderError> {
        let mut body = match egress {
            Some(endpoint) => {
                // Proxy settings are per client, so routed calls get their own
                let proxy = reqwest::Proxy::all(endpoint.connection_url()).map_err(|e| {
                    ProviderError::Configuration(format!(
                        "invalid proxy {}: {}",
                        endpoint.masked(),
                        e
                    ))
                })?;
                let client = Self::client_builder(self.timeout).proxy(proxy).build()?;
                self.post(&client, "scrape", request).await?
            }
            None => self.post(&self.client, "scrape", request).await?,
        };

        Ok(match body.get_mut("data") {
            Some(data) => data.take(),
            None => body,
        })
    }

    async fn submit_task(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        let body = self.post(&self.client, "task", request).await?;
        Ok(decode::<TaskAccepted>(body)?.task_id)
    }

    async fn submit_batch(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        let body = self.post(&self.client, "task/batch", request).await?;
        Ok(decode::<BatchAccepted>(body)?.batch_id)
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, ProviderError> {
        let body: TaskStatusBody =
            decode(self.get(self.resource_url(&["task", task_id])?).await?)?;
        Ok(TaskStatus {
            state: RemoteState::from_remote(&body.status),
            data: body.data,
            error: body.error,
        })
    }

    async fn batch_status(&self, batch_id: &str) -> Result<BatchStatus, ProviderError> {
        let body: BatchStatusBody = decode(
            self.get(self.resource_url(&["task", "batch", batch_id])?)
                .await?,
        )?;
        Ok(BatchStatus {
            state: RemoteState::from_remote(&body.status),
            results: body
                .results
                .into_iter()
                .map(|item| BatchItem {
                    url: item.url,
                    state: RemoteState::from_remote(&item.status),
                    data: item.data,
                    error: item.error,
                })
                .collect(),
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
