//! Consul HTTP 客户端

use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method, RequestBuilder, Response, Url};
use std::collections::HashMap;
use std::time::Duration;

use super::{AgentServiceRegistration, ConsulApi, QueryOptions, QueryResponse};
use crate::error::ConsulError;

/// 非阻塞请求超时
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// 阻塞查询在 wait 之外额外预留的时间
const BLOCKING_QUERY_GRACE: Duration = Duration::from_secs(5);

const CONSUL_INDEX_HEADER: &str = "X-Consul-Index";
const CONSUL_TOKEN_HEADER: &str = "X-Consul-Token";

/// 基于 reqwest 的 Consul 客户端
#[derive(Clone)]
pub struct HttpConsulClient {
    http_client: HttpClient,
    base_url: Url,
    token: Option<String>,
}

impl HttpConsulClient {
    /// 创建新的客户端
    ///
    /// `address` 可以不带协议（如 `127.0.0.1:8500`），此时默认使用 `http://`。
    pub fn new(address: &str, token: Option<&str>) -> Result<Self, ConsulError> {
        let raw = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };
        let base_url = Url::parse(&raw).map_err(|e| ConsulError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConsulError::InvalidAddress {
                address: address.to_string(),
                reason: "address cannot be used as a base url".to_string(),
            });
        }

        Ok(Self {
            http_client: HttpClient::builder().build()?,
            base_url,
            token: token.filter(|t| !t.is_empty()).map(str::to_string),
        })
    }

    /// 服务端地址
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// 拼接 API 路径，每一段单独转义（实例 ID 中的 `/`、`?` 不会破坏路径）
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ConsulError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ConsulError::InvalidAddress {
                    address: self.base_url.to_string(),
                    reason: "address cannot be used as a base url".to_string(),
                })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, timeout: Duration) -> RequestBuilder {
        let builder = self.http_client.request(method, url).timeout(timeout);
        match &self.token {
            Some(token) => builder.header(CONSUL_TOKEN_HEADER, token),
            None => builder,
        }
    }

    async fn send(builder: RequestBuilder) -> Result<Response, ConsulError> {
        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ConsulError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    fn consul_index(resp: &Response) -> u64 {
        resp.headers()
            .get(CONSUL_INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0)
    }

    fn blocking_params(options: &QueryOptions) -> (Vec<(&'static str, String)>, Duration) {
        let mut params = Vec::new();
        if let Some(index) = options.index {
            params.push(("index", index.to_string()));
        }
        let timeout = match options.wait {
            Some(wait) => {
                params.push(("wait", format!("{}ms", wait.as_millis())));
                wait + wait / 16 + BLOCKING_QUERY_GRACE
            }
            None => DEFAULT_REQUEST_TIMEOUT,
        };
        (params, timeout)
    }
}

#[async_trait]
impl ConsulApi for HttpConsulClient {
    async fn register_service(&self, registration: &AgentServiceRegistration) -> Result<(), ConsulError> {
        let url = self.endpoint(&["v1", "agent", "service", "register"])?;
        Self::send(
            self.request(Method::PUT, url, DEFAULT_REQUEST_TIMEOUT)
                .json(registration),
        )
        .await?;
        Ok(())
    }

    async fn deregister_service(&self, service_id: &str) -> Result<(), ConsulError> {
        let url = self.endpoint(&["v1", "agent", "service", "deregister", service_id])?;
        Self::send(self.request(Method::PUT, url, DEFAULT_REQUEST_TIMEOUT)).await?;
        Ok(())
    }

    async fn catalog_services(
        &self,
        options: &QueryOptions,
    ) -> Result<HashMap<String, Vec<String>>, ConsulError> {
        let url = self.endpoint(&["v1", "catalog", "services"])?;
        let (params, timeout) = Self::blocking_params(options);
        let resp = Self::send(self.request(Method::GET, url, timeout).query(&params)).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn health_service(
        &self,
        service: &str,
        tag: Option<&str>,
        passing_only: bool,
        options: &QueryOptions,
    ) -> Result<QueryResponse<serde_json::Value>, ConsulError> {
        let url = self.endpoint(&["v1", "health", "service", service])?;
        let (mut params, timeout) = Self::blocking_params(options);
        if let Some(tag) = tag.filter(|t| !t.is_empty()) {
            params.push(("tag", tag.to_string()));
        }
        if passing_only {
            params.push(("passing", "1".to_string()));
        }

        let resp = Self::send(self.request(Method::GET, url, timeout).query(&params)).await?;
        let index = Self::consul_index(&resp);
        let bytes = resp.bytes().await?;
        Ok(QueryResponse {
            index,
            body: serde_json::from_slice(&bytes)?,
        })
    }

    async fn pass_ttl(&self, check_id: &str, note: &str) -> Result<(), ConsulError> {
        let url = self.endpoint(&["v1", "agent", "check", "pass", check_id])?;
        let mut builder = self.request(Method::PUT, url, DEFAULT_REQUEST_TIMEOUT);
        if !note.is_empty() {
            builder = builder.query(&[("note", note)]);
        }
        Self::send(builder).await?;
        Ok(())
    }
}
