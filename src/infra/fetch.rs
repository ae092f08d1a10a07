//! reqwest-backed outbound HTTP for metadata views and the image relay.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client, Response,
    header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, REFERER},
};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::application::ports::{FetchError, FetchedBody, UpstreamFetch};

use super::error::InfraError;

const SOURCE: &str = "infra::fetch";

/// Desktop browser agent; the metadata provider rejects unknown clients.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";
const PROVIDER_REFERER: &str = "https://movie.douban.com/";
const JSON_ACCEPT: &str = "application/json, text/plain, */*";

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, InfraError> {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, HeaderValue::from_static(PROVIDER_REFERER));
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_ACCEPT));

        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn send(&self, url: &Url, timeout: Duration) -> Result<Response, FetchError> {
        debug!(target_module = SOURCE, url = %url, timeout_ms = timeout.as_millis() as u64, "upstream request");
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| transport_error(url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

fn transport_error(url: &Url, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if err.is_decode() {
        FetchError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl UpstreamFetch for ReqwestFetcher {
    async fn get_json(&self, url: Url, timeout: Duration) -> Result<Value, FetchError> {
        let response = self.send(&url, timeout).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| transport_error(&url, err))?;
        serde_json::from_slice(&bytes).map_err(|err| FetchError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        })
    }

    async fn get_bytes(&self, url: Url, timeout: Duration) -> Result<FetchedBody, FetchError> {
        let response = self.send(&url, timeout).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|err| transport_error(&url, err))?;
        Ok(FetchedBody { content_type, body })
    }
}
