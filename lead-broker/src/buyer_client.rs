//! The buyer client (§4.5): outbound PING/POST HTTP to buyer endpoints under
//! a hard per-call deadline, with POST's bounded retry policy.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use lead_core::domain::{AuthConfig, Buyer};
use lead_core::value::Value;
use reqwest::Client;

use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Success,
    Failed,
    Timeout,
}

#[derive(Debug, Clone)]
pub struct PingResult {
    pub status: CallStatus,
    pub http_status: Option<u16>,
    pub accepted: bool,
    pub bid_amount: Option<String>,
    pub reason: Option<String>,
    pub response_time_ms: u32,
    pub raw_response: Value,
}

#[derive(Debug, Clone)]
pub struct PostResult {
    pub status: CallStatus,
    pub http_status: Option<u16>,
    pub accepted: bool,
    pub external_lead_id: Option<String>,
    pub reason: Option<String>,
    pub response_time_ms: u32,
    pub raw_response: Value,
}

/// PING: single shot, no retry. POST: up to `max_attempts` (default 3
/// including the first) on TIMEOUT or 5xx, with `backoff` delays between
/// attempts. Never throws — every outcome is represented in the result.
#[async_trait]
pub trait BuyerClient: Send + Sync {
    async fn ping(&self, buyer: &Buyer, payload: &Value, timeout_ms: u32) -> PingResult;

    async fn post(
        &self,
        buyer: &Buyer,
        payload: &Value,
        timeout_ms: u32,
        max_attempts: u32,
        backoff: &[u64],
    ) -> PostResult;
}

pub struct HttpBuyerClient {
    client: Client,
}

impl HttpBuyerClient {
    pub fn new() -> Self {
        Self { client: Client::builder().build().expect("reqwest client builds") }
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder, auth: &AuthConfig) -> reqwest::RequestBuilder {
        match auth {
            AuthConfig::Bearer { token } => req.bearer_auth(token),
            AuthConfig::Basic { username, password } => req.basic_auth(username, Some(password)),
            AuthConfig::Custom { headers } => {
                let mut req = req;
                for (key, value) in headers {
                    req = req.header(key, value);
                }
                req
            }
        }
    }

    async fn call_once(
        &self,
        buyer: &Buyer,
        payload: &Value,
        timeout_ms: u32,
        action: &str,
    ) -> (CallStatus, Option<u16>, Value, u32) {
        let started = Instant::now();
        let body = serde_json::Value::from(payload.clone());
        let req = self.apply_auth(self.client.post(&buyer.api_url).json(&body), &buyer.auth_config);

        let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms as u64), req.send()).await;
        let elapsed_ms = started.elapsed().as_millis() as u32;

        let result = match outcome {
            Err(_) => {
                metrics::BUYER_CALL_TIMEOUTS.with_label_values(&[&buyer.name, action]).inc();
                (CallStatus::Timeout, None, Value::Null, elapsed_ms)
            }
            Ok(Err(_)) => (CallStatus::Failed, None, Value::Null, elapsed_ms),
            Ok(Ok(response)) => {
                let http_status = response.status().as_u16();
                let is_success = response.status().is_success();
                let body = response.json::<serde_json::Value>().await.unwrap_or(serde_json::Value::Null);
                let parsed = Value::from(body);
                let elapsed_ms = started.elapsed().as_millis() as u32;
                let status = if is_success { CallStatus::Success } else { CallStatus::Failed };
                (status, Some(http_status), parsed, elapsed_ms)
            }
        };

        metrics::BUYER_CALL_DURATION_SECONDS
            .with_label_values(&[&buyer.name, action])
            .observe(result.3 as f64 / 1000.0);
        result
    }
}

impl Default for HttpBuyerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BuyerClient for HttpBuyerClient {
    async fn ping(&self, buyer: &Buyer, payload: &Value, timeout_ms: u32) -> PingResult {
        let (status, http_status, body, response_time_ms) =
            self.call_once(buyer, payload, timeout_ms, "ping").await;

        let accepted = body.get_path("accepted").and_then(|v| v.as_bool()).unwrap_or(false);
        // Read bidAmount as text, never through f64, so no float rounding ever
        // touches a bid (§9 hard rule). JSON numbers still stringify exactly
        // via `Value`'s serde_json::Number backing.
        let bid_amount = body.get_path("bidAmount").and_then(|v| match v {
            Value::Str(s) => Some(s.clone()),
            Value::Num(n) => Some(n.to_string()),
            _ => None,
        });
        let reason = body.get_path("reason").and_then(|v| v.as_str().map(str::to_string));

        PingResult {
            status,
            http_status,
            accepted: status == CallStatus::Success && accepted,
            bid_amount,
            reason,
            response_time_ms,
            raw_response: body,
        }
    }

    async fn post(
        &self,
        buyer: &Buyer,
        payload: &Value,
        timeout_ms: u32,
        max_attempts: u32,
        backoff: &[u64],
    ) -> PostResult {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (status, http_status, body, response_time_ms) =
                self.call_once(buyer, payload, timeout_ms, "post").await;

            let is_retryable = matches!(status, CallStatus::Timeout)
                || matches!(http_status, Some(code) if (500..600).contains(&code));

            if !is_retryable || attempt >= max_attempts {
                let accepted = body.get_path("accepted").and_then(|v| v.as_bool()).unwrap_or(false);
                let external_lead_id =
                    body.get_path("externalLeadId").and_then(|v| v.as_str().map(str::to_string));
                let reason = body.get_path("reason").and_then(|v| v.as_str().map(str::to_string));

                return PostResult {
                    status,
                    http_status,
                    accepted: status == CallStatus::Success && accepted,
                    external_lead_id,
                    reason,
                    response_time_ms,
                    raw_response: body,
                };
            }

            let delay = backoff.get((attempt - 1) as usize).copied().unwrap_or(2000);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Scripted responses, mirroring the teacher's `test_utils` fixture
    /// convention: queue up canned outcomes and drain them in call order.
    #[derive(Default)]
    pub struct FakeBuyerClient {
        pings: Mutex<std::collections::HashMap<String, VecDeque<PingResult>>>,
        posts: Mutex<std::collections::HashMap<String, VecDeque<PostResult>>>,
    }

    impl FakeBuyerClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn queue_ping(&self, buyer_name: &str, result: PingResult) {
            self.pings.lock().entry(buyer_name.to_string()).or_default().push_back(result);
        }

        pub fn queue_post(&self, buyer_name: &str, result: PostResult) {
            self.posts.lock().entry(buyer_name.to_string()).or_default().push_back(result);
        }
    }

    #[async_trait]
    impl BuyerClient for FakeBuyerClient {
        async fn ping(&self, buyer: &Buyer, _payload: &Value, _timeout_ms: u32) -> PingResult {
            self.pings
                .lock()
                .get_mut(&buyer.name)
                .and_then(|q| q.pop_front())
                .unwrap_or(PingResult {
                    status: CallStatus::Timeout,
                    http_status: None,
                    accepted: false,
                    bid_amount: None,
                    reason: None,
                    response_time_ms: 0,
                    raw_response: Value::Null,
                })
        }

        async fn post(
            &self,
            buyer: &Buyer,
            _payload: &Value,
            _timeout_ms: u32,
            _max_attempts: u32,
            _backoff: &[u64],
        ) -> PostResult {
            self.posts
                .lock()
                .get_mut(&buyer.name)
                .and_then(|q| q.pop_front())
                .unwrap_or(PostResult {
                    status: CallStatus::Failed,
                    http_status: None,
                    accepted: false,
                    external_lead_id: None,
                    reason: None,
                    response_time_ms: 0,
                    raw_response: Value::Null,
                })
        }
    }
}
