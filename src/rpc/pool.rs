//! Multi-Backend RPC Pool
//!
//! Routes JSON-RPC calls across several rate-limited upstream providers
//! with failover, daily-quota accounting, and failure-based disabling.
//! Endpoint counters live inside the pool and are mutated only here;
//! everything the observers read about capacity is advisory.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Hard per-call timeout against any upstream.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Consecutive failures before an endpoint is disabled for the day.
pub const FAIL_LIMIT: u32 = 3;

/// Default upstream allowance, 5 providers at 50k units/day.
pub const DEFAULT_DAILY_LIMIT: u64 = 50_000;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("upstream error {code}: {message}")]
    Upstream { code: i64, message: String },

    #[error("client construction failed: {0}")]
    Client(String),
}

/// Static description of one upstream provider.
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u64,
}

fn default_daily_limit() -> u64 {
    DEFAULT_DAILY_LIMIT
}

/// Runtime accounting for one upstream.
#[derive(Debug, Clone)]
struct Endpoint {
    name: String,
    url: String,
    daily_limit: u64,
    used_today: u64,
    reset_date: NaiveDate,
    enabled: bool,
    fail_count: u32,
}

impl Endpoint {
    fn new(config: EndpointConfig, today: NaiveDate) -> Self {
        Self {
            name: config.name,
            url: config.url,
            daily_limit: config.daily_limit,
            used_today: 0,
            reset_date: today,
            enabled: true,
            fail_count: 0,
        }
    }

    fn remaining(&self) -> u64 {
        self.daily_limit.saturating_sub(self.used_today)
    }

    /// Usable = enabled, under the 90% quota buffer, not failing.
    fn usable(&self) -> bool {
        self.enabled
            && self.used_today.saturating_mul(10) < self.daily_limit.saturating_mul(9)
            && self.fail_count < FAIL_LIMIT
    }

    /// Rehabilitate on day rollover: zero the counters and re-enable.
    fn reset_if_stale(&mut self, today: NaiveDate) {
        if self.reset_date != today {
            self.used_today = 0;
            self.fail_count = 0;
            self.enabled = true;
            self.reset_date = today;
        }
    }
}

/// Advisory capacity snapshot over enabled endpoints.
#[derive(Debug, Clone, Copy)]
pub struct PoolCapacity {
    pub remaining: u64,
    pub daily_total: u64,
    pub enabled: usize,
}

/// Transport seam so the pool is testable without a network.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// POST a JSON-RPC envelope, returning the raw response body.
    async fn post(&self, url: &str, body: &Value) -> Result<Value, RpcError>;
}

/// Production transport over reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| RpcError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn post(&self, url: &str, body: &Value) -> Result<Value, RpcError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| RpcError::Transport(format!("invalid response body: {e}")))
    }
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcErrorBody>,
}

#[derive(Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
}

/// Fair, capacity-aware JSON-RPC client over a set of upstreams.
pub struct RpcPool {
    transport: Arc<dyn RpcTransport>,
    endpoints: Mutex<Vec<Endpoint>>,
    request_id: AtomicU64,
}

impl RpcPool {
    pub fn new(configs: Vec<EndpointConfig>) -> Result<Self, RpcError> {
        Ok(Self::with_transport(configs, Arc::new(HttpTransport::new()?)))
    }

    pub fn with_transport(configs: Vec<EndpointConfig>, transport: Arc<dyn RpcTransport>) -> Self {
        let today = Utc::now().date_naive();
        let endpoints = configs
            .into_iter()
            .map(|c| Endpoint::new(c, today))
            .collect();
        Self {
            transport,
            endpoints: Mutex::new(endpoints),
            request_id: AtomicU64::new(1),
        }
    }

    /// Issue `method(params)` against the best available upstream, charging
    /// `cost` quota units on success. Returns `None` when no usable capacity
    /// remains or every candidate failed; callers treat that as "skip this
    /// cycle".
    pub async fn call(&self, method: &str, params: Value, cost: u64) -> Option<Value> {
        let total = { self.endpoints.lock().await.len() };
        let mut tried: HashSet<usize> = HashSet::new();

        for _ in 0..total {
            let Some((index, name, url)) = self.select(&tried).await else {
                debug!(method, "rpc pool has no usable endpoint");
                return None;
            };
            tried.insert(index);

            let body = json!({
                "jsonrpc": "2.0",
                "id": self.request_id.fetch_add(1, Ordering::Relaxed),
                "method": method,
                "params": params,
            });

            // The lock is not held across the network call.
            match self.issue(&url, &body).await {
                Ok(result) => {
                    let mut endpoints = self.endpoints.lock().await;
                    let endpoint = &mut endpoints[index];
                    endpoint.used_today = endpoint.used_today.saturating_add(cost);
                    endpoint.fail_count = 0;
                    return Some(result);
                }
                Err(e) => {
                    warn!(endpoint = %name, method, error = %e, "rpc call failed");
                    let mut endpoints = self.endpoints.lock().await;
                    let endpoint = &mut endpoints[index];
                    endpoint.fail_count += 1;
                    if endpoint.fail_count >= FAIL_LIMIT && endpoint.enabled {
                        endpoint.enabled = false;
                        warn!(endpoint = %name, "endpoint disabled after repeated failures");
                    }
                }
            }
        }

        None
    }

    /// Capacity snapshot for adaptive scheduling. Day rollover is applied
    /// here too so an idle pool still rehabilitates.
    pub async fn capacity(&self) -> PoolCapacity {
        let today = Utc::now().date_naive();
        let mut endpoints = self.endpoints.lock().await;
        let mut remaining = 0u64;
        let mut daily_total = 0u64;
        let mut enabled = 0usize;
        for endpoint in endpoints.iter_mut() {
            endpoint.reset_if_stale(today);
            if endpoint.enabled {
                remaining += endpoint.remaining();
                daily_total += endpoint.daily_limit;
                enabled += 1;
            }
        }
        PoolCapacity {
            remaining,
            daily_total,
            enabled,
        }
    }

    /// Pick the untried usable endpoint with the most remaining quota.
    async fn select(&self, tried: &HashSet<usize>) -> Option<(usize, String, String)> {
        let today = Utc::now().date_naive();
        let mut endpoints = self.endpoints.lock().await;
        for endpoint in endpoints.iter_mut() {
            endpoint.reset_if_stale(today);
        }
        endpoints
            .iter()
            .enumerate()
            .filter(|(i, e)| !tried.contains(i) && e.usable())
            .max_by_key(|(_, e)| e.remaining())
            .map(|(i, e)| (i, e.name.clone(), e.url.clone()))
    }

    async fn issue(&self, url: &str, body: &Value) -> Result<Value, RpcError> {
        let raw = self.transport.post(url, body).await?;
        let parsed: JsonRpcResponse = serde_json::from_value(raw)
            .map_err(|e| RpcError::Transport(format!("malformed json-rpc envelope: {e}")))?;
        if let Some(err) = parsed.error {
            return Err(RpcError::Upstream {
                code: err.code,
                message: err.message,
            });
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    #[cfg(test)]
    pub(crate) async fn endpoint_state(&self, index: usize) -> (u64, bool, u32) {
        let endpoints = self.endpoints.lock().await;
        let e = &endpoints[index];
        (e.used_today, e.enabled, e.fail_count)
    }

    #[cfg(test)]
    pub(crate) async fn backdate_reset(&self, index: usize) {
        let mut endpoints = self.endpoints.lock().await;
        endpoints[index].reset_date = NaiveDate::from_ymd_opt(2009, 1, 3).unwrap();
    }
}
