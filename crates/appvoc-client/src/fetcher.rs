use std::time::Duration;

use appvoc_core::error::AppError;
use appvoc_core::identity::{Header, HeaderSource, ProxyPool};
use appvoc_core::models::RawResponse;
use appvoc_core::throttle::{RequestTimer, Throttle};
use appvoc_core::traits::Fetcher;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

/// Serial HTTP fetcher with identity rotation and throttling.
///
/// Any transport failure is retried until the attempts run out.
///
/// Every attempt gets a fresh client carrying the chosen header and a proxy
/// drawn from the pool, so a retry never reuses a burned identity. The
/// throttle brackets each attempt, failed ones included.
#[derive(Clone)]
pub struct SessionFetcher<T: Throttle, H: HeaderSource> {
    throttle: T,
    headers: H,
    proxies: ProxyPool,
    timeout: Duration,
    retries: u32,
}

impl<T: Throttle, H: HeaderSource> SessionFetcher<T, H> {
    pub fn new(throttle: T, headers: H, proxies: ProxyPool) -> Self {
        Self {
            throttle,
            headers,
            proxies,
            timeout: Duration::from_secs(30),
            retries: 3,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attempts per request. Zero is treated as one.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn throttle(&self) -> &T {
        &self.throttle
    }
}

impl<T: Throttle, H: HeaderSource> Fetcher for SessionFetcher<T, H> {
    async fn get(
        &self,
        url: &str,
        header: Option<&Header>,
        params: &[(String, String)],
    ) -> Result<RawResponse, AppError> {
        let url = build_url(url, params)?;
        let attempts = self.retries.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let header = header.cloned().unwrap_or_else(|| self.headers.next_header());
            let client = build_client(&header, self.proxies.pick(), self.timeout)?;

            let timer = RequestTimer::start();
            let result = send(&client, &url, self.timeout).await;
            let latency = timer.stop();
            self.throttle.delay(latency).await;

            match result {
                Ok(response) => return Ok(response.with_latency(latency)),
                Err(e) => {
                    tracing::warn!(
                        %url,
                        attempt,
                        attempts,
                        transient = e.is_retryable(),
                        error = %e,
                        "Request failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::HttpError(format!("no attempt made for {url}"))))
    }
}

// ---------------------------------------------------------------------------
// Shared request plumbing
// ---------------------------------------------------------------------------

/// Append query parameters to `url`.
pub(crate) fn build_url(url: &str, params: &[(String, String)]) -> Result<Url, AppError> {
    let parsed = if params.is_empty() {
        Url::parse(url)
    } else {
        Url::parse_with_params(url, params)
    };
    parsed.map_err(|e| AppError::HttpError(format!("Invalid URL '{url}': {e}")))
}

/// A single-use client carrying `header` and routed through `proxy`.
pub(crate) fn build_client(
    header: &Header,
    proxy: Option<&str>,
    timeout: Duration,
) -> Result<Client, AppError> {
    let mut headers = HeaderMap::with_capacity(header.len());
    for (name, value) in header.iter() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AppError::ConfigError(format!("Invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| AppError::ConfigError(format!("Invalid header value for '{name}': {e}")))?;
        headers.insert(name, value);
    }

    let mut builder = Client::builder().default_headers(headers).timeout(timeout);
    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| AppError::ConfigError(format!("Invalid proxy: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| AppError::HttpError(e.to_string()))
}

/// Issue one GET. Any HTTP status is a response; only transport failures
/// are errors.
pub(crate) async fn send(
    client: &Client,
    url: &Url,
    timeout: Duration,
) -> Result<RawResponse, AppError> {
    let response = client.get(url.clone()).send().await.map_err(|e| {
        if e.is_timeout() {
            AppError::Timeout(timeout.as_secs())
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {e}"))
        } else {
            AppError::HttpError(e.to_string())
        }
    })?;

    let status = response.status().as_u16();
    let content_length = response.content_length();
    let body = response.text().await.map_err(|e| {
        if e.is_timeout() {
            AppError::Timeout(timeout.as_secs())
        } else {
            AppError::NetworkError(format!("Failed to read response body: {e}"))
        }
    })?;

    let mut raw = RawResponse::new(url.as_str(), status, body);
    if let Some(len) = content_length {
        raw.size = len;
    }
    Ok(raw)
}
