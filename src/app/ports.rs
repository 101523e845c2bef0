use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Transport-level failure of a single GET. Timeouts are kept apart because
/// they are the only failure the retry policy treats as transient by default.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport failure: {0}")]
    Transport(String),
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub status: u16,
    pub bytes: Vec<u8>,
}

impl HttpGetResult {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpGetResult, FetchError>;
}

/// Blocking waits between requests. Every mandated delay goes through here.
#[async_trait]
pub trait SleeperPort: Send + Sync {
    async fn sleep(&self, duration: Duration);
}
