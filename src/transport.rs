//! HTTP plumbing with bounded exponential-backoff retry.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::warn;

use crate::error::TransportError;

/// Status and raw body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    pub fn json(&self) -> Result<Value, TransportError> {
        serde_json::from_str(&self.body).map_err(|err| TransportError::Decode(err.to_string()))
    }
}

/// The two requests the judge needs. Implemented over reqwest in
/// production and by scripted stubs in tests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        bearer: &str,
        body: &Value,
    ) -> Result<HttpResponse, TransportError>;

    async fn get(&self, url: &str, bearer: &str) -> Result<HttpResponse, TransportError>;
}

#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn finish(response: reqwest::Response) -> Result<HttpResponse, TransportError> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        bearer: &str,
        body: &Value,
    ) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(bearer)
            .json(body)
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Self::finish(response).await
    }

    async fn get(&self, url: &str, bearer: &str) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(bearer)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Self::finish(response).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// `min(base * 2^attempt, max)`, attempt counted from zero.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Runs `attempt_fn` until it yields a non-5xx response or retries run out.
    ///
    /// 4xx responses come back immediately. If the final attempt is still
    /// a 5xx it is returned as-is; if it failed at the transport level the
    /// last error is returned.
    pub async fn run<F, Fut>(&self, mut attempt_fn: F) -> Result<HttpResponse, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<HttpResponse, TransportError>>,
    {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let has_retry = attempt < self.max_retries;
            match attempt_fn().await {
                Ok(response) if response.is_server_error() && has_retry => {
                    let wait = self.delay_for(attempt);
                    warn!(
                        status = response.status,
                        wait_ms = wait.as_millis() as u64,
                        retry = attempt + 1,
                        "AI request returned a server error, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Ok(response) => return Ok(response),
                Err(err) => {
                    if has_retry {
                        let wait = self.delay_for(attempt);
                        warn!(
                            error = %err,
                            wait_ms = wait.as_millis() as u64,
                            retry = attempt + 1,
                            "AI request failed, retrying"
                        );
                        tokio::time::sleep(wait).await;
                    }
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            TransportError::Network("request failed after the maximum number of retries".into())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    use parking_lot::Mutex;
    use tokio::time::Instant;

    #[test]
    fn delay_doubles_then_caps() {
        let policy = RetryPolicy::default();
        let delays: Vec<u128> = (0..5).map(|n| policy.delay_for(n).as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 5000, 5000]);
        assert_eq!(policy.delay_for(40).as_millis(), 5000);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_two_server_errors() {
        let script = Mutex::new(VecDeque::from(vec![
            HttpResponse::new(500, "boom"),
            HttpResponse::new(503, "busy"),
            HttpResponse::new(200, "ok"),
        ]));
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let response = RetryPolicy::default()
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                let next = script.lock().pop_front();
                async move { next.ok_or_else(|| TransportError::Network("script exhausted".into())) }
            })
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let response = RetryPolicy::default()
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(HttpResponse::new(401, "unauthorized")) }
            })
            .await
            .unwrap();
        assert_eq!(response.status, 401);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failure_exhausts_every_attempt() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let err = RetryPolicy::default()
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(TransportError::Network(format!("refused #{n}"))) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(err, TransportError::Network("refused #3".into()));
        assert_eq!(started.elapsed(), Duration::from_millis(1000 + 2000 + 4000));
    }

    #[tokio::test(start_paused = true)]
    async fn last_server_error_is_returned_not_raised() {
        let calls = AtomicU32::new(0);
        let response = RetryPolicy::default()
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(HttpResponse::new(502, "bad gateway")) }
            })
            .await
            .unwrap();
        assert_eq!(response.status, 502);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
