//! Blocking HTTP transport shared by the subgraph client and the CSV loader.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("HTTP client build error: {0}")]
    ClientBuild(String),
    #[error("HTTP request failed for {url}: {message}")]
    Request { url: String, message: String },
}

/// Seam between the pipelines and the network. Tests substitute canned responses.
pub trait HttpTransport: Send + Sync {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError>;
    fn post_json(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, TransportError>;
}

pub struct ReqwestBlockingTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestBlockingTransport {
    pub fn new(timeout_ms: u64) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| TransportError::ClientBuild(err.to_string()))?;
        Ok(Self { client })
    }

    fn read_response(
        url: &str,
        response: reqwest::blocking::Response,
    ) -> Result<Vec<u8>, TransportError> {
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Request {
                url: url.to_string(),
                message: format!("unexpected HTTP status {status}"),
            });
        }

        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| TransportError::Request {
                url: url.to_string(),
                message: err.to_string(),
            })
    }
}

impl HttpTransport for ReqwestBlockingTransport {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| TransportError::Request {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        Self::read_response(url, response)
    }

    fn post_json(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|err| TransportError::Request {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        Self::read_response(url, response)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 200,
        }
    }
}

pub fn retry<T, E: std::fmt::Display>(
    policy: RetryPolicy,
    mut f: impl FnMut() -> Result<T, E>,
) -> Result<T, E> {
    let mut attempt: u32 = 0;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= policy.max_retries => return Err(err),
            Err(err) => {
                attempt = attempt.saturating_add(1);
                let shift = attempt.saturating_sub(1).min(10);
                let factor = 1u64 << shift;
                let sleep_ms = policy.backoff_ms.saturating_mul(factor);
                debug!(
                    component = "http",
                    event = "http.retry",
                    attempt,
                    sleep_ms,
                    error = %err
                );
                std::thread::sleep(Duration::from_millis(sleep_ms));
            }
        }
    }
}
