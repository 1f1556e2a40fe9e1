// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

/// 密码掩码，固定长度，不泄露原始密码长度
const PASSWORD_MASK: &str = "********";

/// 代理地址解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointParseError {
    /// URL 格式错误
    #[error("Invalid proxy url: {0}")]
    InvalidUrl(String),
    /// 不支持的协议
    #[error("Unsupported proxy scheme: {0}")]
    UnsupportedScheme(String),
    /// 缺少主机
    #[error("Proxy url is missing a host")]
    MissingHost,
    /// 缺少端口
    #[error("Proxy url is missing a port")]
    MissingPort,
}

/// 代理协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks5,
}

impl ProxyProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks5 => "socks5",
        }
    }
}

impl FromStr for ProxyProtocol {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(ProxyProtocol::Http),
            "https" => Ok(ProxyProtocol::Https),
            "socks5" | "socks5h" => Ok(ProxyProtocol::Socks5),
            other => Err(EndpointParseError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// 代理认证信息
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: Option<String>,
}

impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| PASSWORD_MASK))
            .finish()
    }
}

/// 代理出口描述
///
/// `Display` 与 `Debug` 输出均不包含明文密码；只有
/// [`ProxyEndpoint::connection_url`] 会返回可直接用于连接的完整地址。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyEndpoint {
    pub protocol: ProxyProtocol,
    pub credentials: Option<ProxyCredentials>,
    pub host: String,
    pub port: u16,
}

impl ProxyEndpoint {
    pub fn new(protocol: ProxyProtocol, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol,
            credentials: None,
            host: host.into(),
            port,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        self.credentials = Some(ProxyCredentials {
            username: username.into(),
            password,
        });
        self
    }

    /// 带认证信息的完整连接地址，仅用于建立连接，不得写入日志
    pub fn connection_url(&self) -> String {
        match &self.credentials {
            Some(ProxyCredentials {
                username,
                password: Some(password),
            }) => format!(
                "{}://{}:{}@{}:{}",
                self.protocol.as_str(),
                username,
                password,
                self.host,
                self.port
            ),
            Some(ProxyCredentials {
                username,
                password: None,
            }) => format!(
                "{}://{}@{}:{}",
                self.protocol.as_str(),
                username,
                self.host,
                self.port
            ),
            None => self.to_string(),
        }
    }

    /// 用户名保留、密码替换为固定掩码的地址
    pub fn masked(&self) -> String {
        match &self.credentials {
            Some(creds) => {
                let password = if creds.password.is_some() {
                    format!(":{}", PASSWORD_MASK)
                } else {
                    String::new()
                };
                format!(
                    "{}://{}{}@{}:{}",
                    self.protocol.as_str(),
                    creds.username,
                    password,
                    self.host,
                    self.port
                )
            }
            None => self.to_string(),
        }
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol.as_str(), self.host, self.port)
    }
}

impl FromStr for ProxyEndpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // Bare host:port defaults to http
        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };

        let url = Url::parse(&candidate).map_err(|e| EndpointParseError::InvalidUrl(e.to_string()))?;
        let protocol: ProxyProtocol = url.scheme().parse()?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or(EndpointParseError::MissingHost)?
            .to_string();
        // Url drops the default port for http/https, so fall back to it explicitly
        let port = url
            .port_or_known_default()
            .ok_or(EndpointParseError::MissingPort)?;

        let credentials = if url.username().is_empty() {
            None
        } else {
            Some(ProxyCredentials {
                username: url.username().to_string(),
                password: url.password().map(str::to_string),
            })
        };

        Ok(Self {
            protocol,
            credentials,
            host,
            port,
        })
    }
}
