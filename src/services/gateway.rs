use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use std::num::NonZeroU32;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

use crate::config::GatewaySettings;
use crate::models::{EnvelopeError, ProxyExtractRequest, ResponseEnvelope};

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Errors surfaced by the scraping-proxy gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway session not acquired")]
    NotReady,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("proxy returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("undecodable proxy payload: {0}")]
    Decode(#[from] EnvelopeError),

    #[error("gateway session already acquired")]
    AlreadyAcquired,

    #[error("invalid gateway configuration: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Outbound calls to the registry through the scraping proxy.
///
/// `post` is the search path and `get` the detail path; each path has its own budget.
#[async_trait]
pub trait ScrapingGateway: Send + Sync {
    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
        headers: &[(&str, &str)],
    ) -> Result<ResponseEnvelope, GatewayError>;

    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<ResponseEnvelope, GatewayError>;
}

/// Live proxy client.
///
/// Holds a pooled HTTP session between `acquire` and `release`, two per-minute
/// limiters (search and detail) and a linear retry policy for 5xx and
/// network failures.
pub struct ProxyGateway {
    endpoint: String,
    api_key: String,
    request_timeout: Duration,
    connect_timeout: Duration,
    pool_max_idle_per_host: usize,
    max_retries: u32,
    retry_backoff: Duration,
    search_limiter: DirectRateLimiter,
    detail_limiter: DirectRateLimiter,
    session: RwLock<Option<Client>>,
}

impl ProxyGateway {
    pub fn new(settings: &GatewaySettings) -> Result<Self, GatewayError> {
        if settings.api_key.trim().is_empty() {
            return Err(GatewayError::Config(
                "proxy API key must be set (gateway.api_key or ZYTE_API_KEY)".into(),
            ));
        }
        if settings.max_retries == 0 {
            return Err(GatewayError::Config("max_retries must be at least 1".into()));
        }

        let search_rpm = NonZeroU32::new(settings.search_rpm)
            .ok_or_else(|| GatewayError::Config("search_rpm must be > 0".into()))?;
        let detail_rpm = NonZeroU32::new(settings.detail_rpm)
            .ok_or_else(|| GatewayError::Config("detail_rpm must be > 0".into()))?;

        tracing::info!(
            search_rpm = settings.search_rpm,
            detail_rpm = settings.detail_rpm,
            max_retries = settings.max_retries,
            "Initialized proxy gateway"
        );

        Ok(Self {
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            pool_max_idle_per_host: settings.pool_max_idle_per_host,
            max_retries: settings.max_retries,
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
            search_limiter: RateLimiter::direct(Quota::per_minute(search_rpm)),
            detail_limiter: RateLimiter::direct(Quota::per_minute(detail_rpm)),
            session: RwLock::new(None),
        })
    }

    /// Open the pooled session. The returned guard releases it on drop.
    ///
    /// Only one session may be open at a time; a second `acquire` fails with
    /// [`GatewayError::AlreadyAcquired`] and leaves the live session untouched.
    pub fn acquire(self: &Arc<Self>) -> Result<SessionGuard, GatewayError> {
        if self.is_ready() {
            return Err(GatewayError::AlreadyAcquired);
        }

        let client = Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {}", e)))?;

        let mut session = self
            .session
            .write()
            .map_err(|_| GatewayError::Config("session lock poisoned".into()))?;
        if session.is_some() {
            return Err(GatewayError::AlreadyAcquired);
        }
        *session = Some(client);
        tracing::debug!("Proxy session acquired");

        Ok(SessionGuard {
            gateway: Arc::clone(self),
        })
    }

    /// Close the pooled session. Returns `false` if none was open.
    pub fn release(&self) -> bool {
        match self.session.write() {
            Ok(mut session) => {
                let released = session.take().is_some();
                if released {
                    tracing::debug!("Proxy session released");
                }
                released
            }
            Err(_) => false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.session.read().map(|s| s.is_some()).unwrap_or(false)
    }

    fn client(&self) -> Result<Client, GatewayError> {
        self.session
            .read()
            .ok()
            .and_then(|s| s.clone())
            .ok_or(GatewayError::NotReady)
    }

    async fn execute(&self, request: &ProxyExtractRequest) -> Result<ResponseEnvelope, GatewayError> {
        let client = self.client()?;
        let method = request.http_request_method.as_str();

        for attempt in 1..=self.max_retries {
            let sent = client
                .post(&self.endpoint)
                .basic_auth(&self.api_key, Some(""))
                .json(request)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    if attempt < self.max_retries {
                        tracing::warn!(
                            method,
                            attempt,
                            max_retries = self.max_retries,
                            error = %e,
                            "Proxy request failed, retrying"
                        );
                        tokio::time::sleep(self.retry_backoff * attempt).await;
                        continue;
                    }
                    tracing::error!(method, url = %request.url, error = %e, "Proxy request failed");
                    return Err(GatewayError::Transport(e.to_string()));
                }
            };

            let status = response.status();
            if !status.is_success() {
                if status.is_server_error() && attempt < self.max_retries {
                    tracing::warn!(
                        method,
                        status = status.as_u16(),
                        attempt,
                        max_retries = self.max_retries,
                        "Proxy returned server error, retrying"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                    continue;
                }
                tracing::error!(method, status = status.as_u16(), url = %request.url, "Proxy returned error status");
                return Err(GatewayError::Status {
                    status: status.as_u16(),
                    url: request.url.clone(),
                });
            }

            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    if attempt < self.max_retries {
                        tracing::warn!(method, attempt, error = %e, "Failed reading proxy body, retrying");
                        tokio::time::sleep(self.retry_backoff * attempt).await;
                        continue;
                    }
                    return Err(GatewayError::Transport(e.to_string()));
                }
            };

            return serde_json::from_str::<ResponseEnvelope>(&body)
                .map_err(|e| GatewayError::Decode(EnvelopeError::Json(e)));
        }

        Err(GatewayError::Transport(format!(
            "{} {} exhausted {} attempts",
            method, request.url, self.max_retries
        )))
    }
}

#[async_trait]
impl ScrapingGateway for ProxyGateway {
    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
        headers: &[(&str, &str)],
    ) -> Result<ResponseEnvelope, GatewayError> {
        // Fail fast before waiting on the limiter
        self.client()?;
        self.search_limiter.until_ready().await;
        self.execute(&ProxyExtractRequest::post(url, body, headers)).await
    }

    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<ResponseEnvelope, GatewayError> {
        self.client()?;
        self.detail_limiter.until_ready().await;
        self.execute(&ProxyExtractRequest::get(url, headers)).await
    }
}

/// Scoped proxy session; releases the gateway session exactly once when dropped
pub struct SessionGuard {
    gateway: Arc<ProxyGateway>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.gateway.release();
    }
}
