use crate::app::ports::{FetchError, HttpClientPort, HttpGetResult};
use async_trait::async_trait;
use std::time::Duration;

pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new() -> crate::error::Result<Self> {
        Ok(Self { client: reqwest::Client::builder().build()? })
    }

    pub fn with_user_agent(user_agent: &str) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        FetchError::Transport(err.to_string())
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpGetResult, FetchError> {
        tracing::debug!("HTTP GET request to: {}", url);
        let resp = self
            .client
            .get(url)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;
        let status = resp.status().as_u16();
        // The body read is covered by the same per-request timeout
        let bytes = resp.bytes().await.map_err(|e| classify(e, timeout))?.to_vec();
        tracing::debug!("HTTP response: status={}, size={} bytes", status, bytes.len());
        Ok(HttpGetResult { status, bytes })
    }
}
